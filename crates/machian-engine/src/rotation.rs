//! Galaxy rotation curves from the baryonic mass-gradient model.
//!
//! An exponential disk supplies the enclosed mass; the inertia of orbiting
//! material is decoupled from its gravitational charge by a power law in
//! radius controlled by `beta`. At `beta = 0` the curve declines as a
//! Keplerian; at [`FLAT_BETA`] the outer curve goes flat without any halo
//! term.

use rayon::prelude::*;

use crate::constants::G_KPC;
use crate::params::RotationRequest;

/// Inertia exponent at which the outer rotation curve flattens.
pub const FLAT_BETA: f64 = 1.0;

/// Inner sampling floor, kpc. The inertia term divides by `r`; sampling
/// never touches zero.
pub const MIN_RADIUS_KPC: f64 = 0.1;

/// Shared disk + inertia model. Also drives the N-body central forcing
/// and initial orbital velocities.
#[derive(Debug, Clone, Copy)]
pub struct GalaxyProfile {
    /// Central mass, solar masses.
    pub m0: f64,
    /// Disk scale length, kpc.
    pub scale_length: f64,
    /// Inertia exponent.
    pub beta: f64,
}

impl GalaxyProfile {
    pub fn new(m0_solar: f64, scale_length: f64, beta: f64) -> Self {
        Self {
            m0: m0_solar,
            scale_length,
            beta,
        }
    }

    /// Enclosed mass of an exponential disk at radius `r` (kpc), in
    /// solar masses: `M(r) = m0 (1 - (1 + r/R) e^{-r/R})`.
    pub fn enclosed_mass(&self, r: f64) -> f64 {
        let x = r / self.scale_length;
        self.m0 * (1.0 - (1.0 + x) * (-x).exp())
    }

    /// Relative inertia of material at radius `r`: `(1 + r/R)^{-beta}`.
    ///
    /// At `beta = 0` this is unity and the orbit balance is purely
    /// Keplerian.
    pub fn inertia_factor(&self, r: f64) -> f64 {
        let x = r / self.scale_length;
        (1.0 + x).powf(-self.beta)
    }

    /// Circular orbital speed at radius `r` (kpc), km/s.
    ///
    /// Newtonian balance with the inertia factor dividing through:
    /// `v^2 = G M(r) / r / f(r)`.
    pub fn circular_velocity(&self, r: f64) -> f64 {
        let r = r.max(MIN_RADIUS_KPC);
        let v_newton_sq = G_KPC * self.enclosed_mass(r) / r;
        (v_newton_sq / self.inertia_factor(r)).sqrt()
    }
}

/// One rotation-curve point: radius in kpc, speed in km/s.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RotationPoint {
    pub r: f64,
    pub v: f64,
}

/// A solved rotation curve. `gpu_used` records which backend produced
/// the velocities.
#[derive(Debug, Clone)]
pub struct RotationCurve {
    pub points: Vec<RotationPoint>,
    pub gpu_used: bool,
}

/// Radii sampled for a request: `samples` points from the inner floor to
/// `max_r`, strictly increasing.
pub fn sample_radii(req: &RotationRequest) -> Vec<f64> {
    let n = req.samples;
    (0..n)
        .map(|i| MIN_RADIUS_KPC + (req.max_r - MIN_RADIUS_KPC) * i as f64 / (n - 1) as f64)
        .collect()
}

/// CPU solve. Parallel over radii; each point is independent.
pub fn solve(req: &RotationRequest) -> RotationCurve {
    let profile = GalaxyProfile::new(req.m0_solar(), req.scale_length, req.beta);
    let points = sample_radii(req)
        .par_iter()
        .map(|&r| RotationPoint {
            r,
            v: profile.circular_velocity(r),
        })
        .collect();
    RotationCurve {
        points,
        gpu_used: false,
    }
}

/// Assemble a curve from externally computed velocities (GPU path).
pub fn curve_from_velocities(radii: &[f64], velocities: &[f64], gpu_used: bool) -> RotationCurve {
    let points = radii
        .iter()
        .zip(velocities)
        .map(|(&r, &v)| RotationPoint { r, v })
        .collect();
    RotationCurve { points, gpu_used }
}
