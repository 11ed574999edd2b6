//! Force backends and the shared device capability.
//!
//! The short-range and galaxy-profile kernels run on either the GPU or an
//! equivalent CPU implementation behind [`ForceBackend`]. A [`Device`] is
//! probed once at server start and handed to each session; it is the only
//! resource sessions share, and kernel launches on it are serialized.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use machian_engine::rotation::{GalaxyProfile, MIN_RADIUS_KPC};

use crate::engine::P3mParams;
use crate::gpu::{GpuBackend, GpuDevice, GpuError};
use crate::particles::ParticleSystem;
use crate::short_range;

/// Per-particle accelerations, matching the particle arrays by index.
#[derive(Debug, Clone)]
pub struct Accel {
    pub ax: Vec<f32>,
    pub ay: Vec<f32>,
}

impl Accel {
    pub fn zeros(n: usize) -> Self {
        Self {
            ax: vec![0.0; n],
            ay: vec![0.0; n],
        }
    }

    pub fn add(&mut self, other: &Accel) {
        for (a, b) in self.ax.iter_mut().zip(&other.ax) {
            *a += b;
        }
        for (a, b) in self.ay.iter_mut().zip(&other.ay) {
            *a += b;
        }
    }
}

/// Short-range + central-forcing kernel, swappable per session.
///
/// Both implementations must agree within numerical tolerance for
/// identical inputs; the GPU one is a throughput optimization, never a
/// semantic change.
pub trait ForceBackend: Send {
    fn name(&self) -> &'static str;

    /// Pairwise correction plus galaxy-profile central forcing for the
    /// whole system.
    fn particle_forces(
        &mut self,
        sys: &ParticleSystem,
        params: &P3mParams,
        profile: &GalaxyProfile,
    ) -> Result<Accel, GpuError>;
}

/// Reference CPU implementation (rayon-parallel).
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Infallible compute path, also used as the fallback target when a
    /// GPU backend errors mid-session.
    pub fn compute(sys: &ParticleSystem, params: &P3mParams, profile: &GalaxyProfile) -> Accel {
        let mut accel = short_range::accumulate(sys, params);
        let central = central_forces(sys, params, profile);
        accel.add(&central);
        accel
    }
}

impl ForceBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn particle_forces(
        &mut self,
        sys: &ParticleSystem,
        params: &P3mParams,
        profile: &GalaxyProfile,
    ) -> Result<Accel, GpuError> {
        Ok(Self::compute(sys, params, profile))
    }
}

/// Inward acceleration from the galaxy profile: `a = v_c(r)^2 / r` toward
/// the box center.
pub fn central_forces(sys: &ParticleSystem, params: &P3mParams, profile: &GalaxyProfile) -> Accel {
    let center = params.box_size as f64 / 2.0;
    let forces: Vec<(f32, f32)> = (0..sys.len())
        .into_par_iter()
        .map(|i| {
            let rx = sys.x[i] as f64 - center;
            let ry = sys.y[i] as f64 - center;
            let r = (rx * rx + ry * ry).sqrt().max(MIN_RADIUS_KPC);
            let v = profile.circular_velocity(r);
            let a_mag = v * v / r;
            ((-a_mag * rx / r) as f32, (-a_mag * ry / r) as f32)
        })
        .collect();

    let mut accel = Accel::zeros(sys.len());
    for (i, (ax, ay)) in forces.into_iter().enumerate() {
        accel.ax[i] = ax;
        accel.ay[i] = ay;
    }
    accel
}

/// Process-wide compute capability, probed once at startup.
///
/// Holds the GPU context when one exists; sessions get fresh backends
/// from it but share the underlying device, whose launches are
/// serialized internally.
#[derive(Clone, Default)]
pub struct Device {
    gpu: Option<Arc<GpuDevice>>,
}

impl Device {
    /// Probe for a usable GPU adapter; fall back to CPU-only quietly.
    pub fn probe() -> Self {
        match GpuDevice::new() {
            Ok(gpu) => {
                info!(adapter = %gpu.adapter_name(), "GPU device available");
                Self {
                    gpu: Some(Arc::new(gpu)),
                }
            }
            Err(err) => {
                info!(reason = %err, "no GPU device, running CPU-only");
                Self { gpu: None }
            }
        }
    }

    pub fn cpu_only() -> Self {
        Self { gpu: None }
    }

    pub fn gpu_available(&self) -> bool {
        self.gpu.is_some()
    }

    /// A fresh force backend for one session.
    pub fn force_backend(&self) -> Box<dyn ForceBackend> {
        match &self.gpu {
            Some(gpu) => Box::new(GpuBackend::new(Arc::clone(gpu))),
            None => Box::new(CpuBackend),
        }
    }

    /// Vectorized rotation-curve evaluation. Returns the velocities and
    /// whether the GPU produced them; device failures degrade to the CPU
    /// path with a logged warning, never to an error.
    pub fn velocity_profile(&self, profile: &GalaxyProfile, radii: &[f64]) -> (Vec<f64>, bool) {
        if let Some(gpu) = &self.gpu {
            match gpu.velocity_profile(profile, radii) {
                Ok(velocities) => return (velocities, true),
                Err(err) => {
                    warn!(error = %err, "GPU profile kernel failed, using CPU");
                }
            }
        }
        let velocities = radii
            .par_iter()
            .map(|&r| profile.circular_velocity(r))
            .collect();
        (velocities, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_force_points_inward() {
        let profile = GalaxyProfile::new(1e11, 15.0, 5.0);
        let params = P3mParams::default();
        let sys = ParticleSystem::from_parts(
            vec![80.0, 40.0],
            vec![60.0, 60.0],
            vec![0.0; 2],
            vec![0.0; 2],
            0,
        );
        let accel = central_forces(&sys, &params, &profile);
        assert!(accel.ax[0] < 0.0, "right of center, pulled left");
        assert!(accel.ax[1] > 0.0, "left of center, pulled right");
        assert!(accel.ay[0].abs() < 1e-6);
    }

    #[test]
    fn cpu_backend_never_fails() {
        let profile = GalaxyProfile::new(1e11, 15.0, 5.0);
        let params = P3mParams::default();
        let sys = ParticleSystem::disk(500, &profile, params.box_size, 50.0, 3);
        let mut backend = CpuBackend;
        let accel = backend.particle_forces(&sys, &params, &profile).unwrap();
        assert_eq!(accel.ax.len(), 500);
        assert!(accel.ax.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn cpu_only_device_reports_no_gpu() {
        let device = Device::cpu_only();
        assert!(!device.gpu_available());
        let profile = GalaxyProfile::new(1e11, 15.0, 1.0);
        let (velocities, gpu_used) = device.velocity_profile(&profile, &[1.0, 10.0, 30.0]);
        assert!(!gpu_used);
        assert_eq!(velocities.len(), 3);
        assert!(velocities.iter().all(|v| v.is_finite()));
    }
}
