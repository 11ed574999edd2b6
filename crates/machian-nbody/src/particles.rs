//! Particle state.
//!
//! Structure-of-arrays layout: the force kernels (CPU and GPU alike) want
//! contiguous coordinate arrays, and frames serialize straight out of the
//! position vectors. One `ParticleSystem` is owned by exactly one engine;
//! nothing here is shared.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use machian_engine::rotation::{GalaxyProfile, MIN_RADIUS_KPC};

/// Mutable per-particle state in box coordinates (kpc).
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub vx: Vec<f32>,
    pub vy: Vec<f32>,
    seed: u64,
}

impl ParticleSystem {
    /// Seeded disk distribution centered in the box.
    ///
    /// Radii are uniform between the inner floor and the disk edge; each
    /// particle starts on a circular orbit at the profile's local speed,
    /// tangential and counter-clockwise.
    pub fn disk(
        n: usize,
        profile: &GalaxyProfile,
        box_size: f32,
        disk_radius: f32,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let center = box_size / 2.0;
        let r_max = disk_radius.min(center * 0.9);

        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut vx = Vec::with_capacity(n);
        let mut vy = Vec::with_capacity(n);

        for _ in 0..n {
            let r: f32 = rng.gen_range(MIN_RADIUS_KPC as f32..r_max);
            let theta: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            let v = profile.circular_velocity(r as f64) as f32;

            x.push(center + r * theta.cos());
            y.push(center + r * theta.sin());
            vx.push(-v * theta.sin());
            vy.push(v * theta.cos());
        }

        Self { x, y, vx, vy, seed }
    }

    /// Perturbed-lattice (Zel'dovich-style) initial conditions.
    ///
    /// Particles sit on a square lattice displaced by a uniform jitter,
    /// with velocities proportional to the displacement. Used for
    /// cosmological clustering runs rather than disk sessions; the
    /// particle count is rounded down to a square.
    pub fn perturbed_lattice(n: usize, box_size: f32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n_side = (n as f64).sqrt().floor() as usize;
        let dx = box_size / n_side as f32;
        let count = n_side * n_side;

        let mut x = Vec::with_capacity(count);
        let mut y = Vec::with_capacity(count);
        let mut vx = Vec::with_capacity(count);
        let mut vy = Vec::with_capacity(count);

        for i in 0..n_side {
            for j in 0..n_side {
                let jx: f32 = rng.gen_range(-0.25..0.25) * dx;
                let jy: f32 = rng.gen_range(-0.25..0.25) * dx;
                x.push((i as f32 * dx + jx).rem_euclid(box_size));
                y.push((j as f32 * dx + jy).rem_euclid(box_size));
                vx.push(jx * 10.0);
                vy.push(jy * 10.0);
            }
        }

        Self { x, y, vx, vy, seed }
    }

    /// Assemble a system from explicit arrays. Used by tests and by
    /// callers that generate their own initial conditions.
    pub fn from_parts(x: Vec<f32>, y: Vec<f32>, vx: Vec<f32>, vy: Vec<f32>, seed: u64) -> Self {
        debug_assert!(x.len() == y.len() && x.len() == vx.len() && x.len() == vy.len());
        Self { x, y, vx, vy, seed }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Total momentum (unit particle mass), accumulated in f64.
    pub fn momentum(&self) -> (f64, f64) {
        let px = self.vx.iter().map(|&v| v as f64).sum();
        let py = self.vy.iter().map(|&v| v as f64).sum();
        (px, py)
    }

    /// Kinetic energy at unit particle mass, accumulated in f64.
    pub fn kinetic_energy(&self) -> f64 {
        self.vx
            .iter()
            .zip(&self.vy)
            .map(|(&vx, &vy)| 0.5 * (vx * vx + vy * vy) as f64)
            .sum()
    }

    /// Sum of |v| over particles, the momentum scale used by drift checks.
    pub fn momentum_scale(&self) -> f64 {
        self.vx
            .iter()
            .zip(&self.vy)
            .map(|(&vx, &vy)| ((vx * vx + vy * vy) as f64).sqrt())
            .sum()
    }
}
