//! N-body stepper.
//!
//! Combines the mesh long-range solve with a swappable short-range
//! backend in a kick-drift-kick leapfrog. A velocity drag term damps the
//! energy injected by the evolving-mass coupling so long sessions stay
//! visually stable instead of evaporating.

use tracing::warn;

use machian_engine::params::NBodyRequest;
use machian_engine::rotation::GalaxyProfile;

use crate::backend::{Accel, CpuBackend, ForceBackend};
use crate::mesh::Mesh;
use crate::particles::ParticleSystem;

/// Tuning for the particle-particle / particle-mesh split.
///
/// Lengths are box coordinates (kpc); `beta` is the evolving-mass
/// exponent shared with the session's galaxy profile.
#[derive(Debug, Clone, Copy)]
pub struct P3mParams {
    pub grid_size: usize,
    pub box_size: f32,
    pub disk_radius: f32,
    pub cutoff: f32,
    pub softening: f32,
    pub force_scale: f32,
    pub drag_coeff: f32,
    pub dt: f32,
    pub beta: f32,
}

impl Default for P3mParams {
    fn default() -> Self {
        Self {
            grid_size: 64,
            box_size: 120.0,
            disk_radius: 50.0,
            cutoff: 4.0,
            softening: 0.5,
            force_scale: 25.0,
            drag_coeff: 0.05,
            dt: 0.01,
            beta: 0.0,
        }
    }
}

impl P3mParams {
    /// Gravitational source boost from the evolving-mass model.
    pub fn coupling(&self) -> f32 {
        1.0 + self.beta
    }
}

/// One streamed position snapshot, tagged with the step that produced it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub tick: u64,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
}

/// Owns one session's particle state and advances it tick by tick.
///
/// If the force backend fails mid-run the engine swaps to the CPU
/// implementation permanently; a session never dies to a device error.
pub struct NBodyEngine {
    particles: ParticleSystem,
    mesh: Mesh,
    profile: GalaxyProfile,
    params: P3mParams,
    backend: Box<dyn ForceBackend>,
    accel: Accel,
    tick: u64,
}

impl NBodyEngine {
    pub fn new(req: &NBodyRequest, backend: Box<dyn ForceBackend>, seed: u64) -> Self {
        let profile = GalaxyProfile::new(req.m0_solar(), req.scale_length, req.beta);
        let params = P3mParams {
            beta: req.beta as f32,
            ..P3mParams::default()
        };
        let particles = ParticleSystem::disk(
            req.n_particles,
            &profile,
            params.box_size,
            params.disk_radius,
            seed,
        );
        let mesh = Mesh::new(params.grid_size, params.box_size);

        let mut engine = Self {
            particles,
            mesh,
            profile,
            params,
            backend,
            accel: Accel::zeros(req.n_particles),
            tick: 0,
        };
        engine.accel = engine.forces();
        engine
    }

    /// Mesh + short-range force evaluation, with permanent CPU fallback
    /// when the backend errors.
    fn forces(&mut self) -> Accel {
        let mut accel = self
            .mesh
            .long_range(&self.particles, f64::from(self.params.coupling()));
        let short = match self
            .backend
            .particle_forces(&self.particles, &self.params, &self.profile)
        {
            Ok(a) => a,
            Err(err) => {
                warn!(
                    backend = self.backend.name(),
                    error = %err,
                    "force backend failed, switching to CPU"
                );
                self.backend = Box::new(CpuBackend);
                CpuBackend::compute(&self.particles, &self.params, &self.profile)
            }
        };
        accel.add(&short);
        accel
    }

    /// Advance one kick-drift-kick step, then apply drag.
    pub fn step(&mut self) {
        let dt = self.params.dt;
        let half = dt / 2.0;
        let box_size = self.params.box_size;
        let n = self.particles.len();

        for i in 0..n {
            self.particles.vx[i] += self.accel.ax[i] * half;
            self.particles.vy[i] += self.accel.ay[i] * half;
            self.particles.x[i] = (self.particles.x[i] + self.particles.vx[i] * dt)
                .rem_euclid(box_size);
            self.particles.y[i] = (self.particles.y[i] + self.particles.vy[i] * dt)
                .rem_euclid(box_size);
        }

        let accel = self.forces();
        let damping = 1.0 - self.params.drag_coeff * dt;
        for i in 0..n {
            self.particles.vx[i] = (self.particles.vx[i] + accel.ax[i] * half) * damping;
            self.particles.vy[i] = (self.particles.vy[i] + accel.ay[i] * half) * damping;
        }

        self.accel = accel;
        self.tick += 1;
    }

    pub fn frame(&self) -> Frame {
        Frame {
            tick: self.tick,
            x: self.particles.x.clone(),
            y: self.particles.y.clone(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }
}
