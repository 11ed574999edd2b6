//! Radial infall toward a Schwarzschild horizon.
//!
//! Integrates the rain-frame geodesic `dr/dtau = -c sqrt(rs/r)` together
//! with the coordinate-time relation `dt/dtau = 1/(1 - rs/r)`. Proper time
//! stays finite through the horizon region while coordinate time diverges
//! as `r -> rs`, so the stepper refines geometrically near the horizon and
//! terminates at an explicit cutoff offset above it. The offset is a
//! request parameter, not a hidden constant.

use crate::constants::{C_M_S, G_SI, M_SUN_KG, PLANCK_LENGTH_M};
use crate::params::InfallRequest;

/// Fractional distance above the horizon at which the integrator switches
/// from coarse to geometric stepping.
pub const NEAR_HORIZON_BAND: f64 = 0.5;

/// Fraction of the remaining gap consumed per step inside the band.
pub const REFINE_FRACTION: f64 = 0.08;

/// A non-rotating point mass.
#[derive(Debug, Clone, Copy)]
pub struct BlackHole {
    pub mass_solar: f64,
    rs_m: f64,
}

impl BlackHole {
    pub fn new(mass_solar: f64) -> Self {
        let mass_kg = mass_solar * M_SUN_KG;
        let rs_m = 2.0 * G_SI * mass_kg / (C_M_S * C_M_S);
        Self { mass_solar, rs_m }
    }

    /// Schwarzschild radius in meters.
    pub fn schwarzschild_radius_m(&self) -> f64 {
        self.rs_m
    }

    /// Schwarzschild radius in kilometers.
    pub fn schwarzschild_radius_km(&self) -> f64 {
        self.rs_m / 1000.0
    }

    /// Stationary-observer time dilation `sqrt(1 - rs/r)`; zero at and
    /// inside the horizon.
    pub fn time_dilation_factor(&self, r_m: f64) -> f64 {
        let ratio = self.rs_m / r_m;
        if ratio >= 1.0 {
            0.0
        } else {
            (1.0 - ratio).sqrt()
        }
    }

    /// Horizon entropy in bits: `A / (4 l_p^2) / ln 2`.
    pub fn entropy_bits(&self) -> f64 {
        let area = 4.0 * std::f64::consts::PI * self.rs_m * self.rs_m;
        area / (4.0 * PLANCK_LENGTH_M * PLANCK_LENGTH_M) / std::f64::consts::LN_2
    }
}

/// Integrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfallState {
    Falling,
    NearHorizon,
    Terminated,
}

/// Completed infall trajectory: four parallel sequences plus the derived
/// encoding curve and two scalars.
#[derive(Debug, Clone)]
pub struct InfallTrajectory {
    /// Distant-observer time, seconds. Monotonic; grows without bound as
    /// the cutoff offset shrinks.
    pub coordinate_time: Vec<f64>,
    /// Infalling-observer time, seconds. Monotonic and bounded.
    pub proper_time: Vec<f64>,
    /// Radius in Schwarzschild radii. Strictly decreasing, never at or
    /// below 1.
    pub radius: Vec<f64>,
    /// `dr/dtau`, m/s (negative inward).
    pub velocity: Vec<f64>,
    /// Holographic boundary encoding fraction, monotone in [0, 1].
    pub encoding: Vec<f64>,
    pub schwarzschild_radius_km: f64,
    pub entropy_bits: f64,
    /// True when numeric overflow forced early termination.
    pub truncated: bool,
}

/// Stepper for a single infall. Owns all integration state; one request,
/// one pass.
pub struct GeodesicIntegrator {
    bh: BlackHole,
    r: f64,
    t: f64,
    tau: f64,
    r_stop: f64,
    dr_coarse: f64,
    state: InfallState,
    max_steps: usize,
}

impl GeodesicIntegrator {
    pub fn new(req: &InfallRequest) -> Self {
        let bh = BlackHole::new(req.mass_solar);
        let rs = bh.schwarzschild_radius_m();
        let r0 = req.start_dist * rs;
        let r_stop = rs * (1.0 + req.horizon_offset);
        Self {
            bh,
            r: r0,
            t: 0.0,
            tau: 0.0,
            r_stop,
            dr_coarse: (r0 - r_stop) / req.steps as f64,
            state: InfallState::Falling,
            // Coarse phase plus the geometric tail.
            max_steps: req.steps * 10 + 1024,
        }
    }

    pub fn state(&self) -> InfallState {
        self.state
    }

    /// Run the infall to the cutoff radius.
    pub fn run(mut self) -> InfallTrajectory {
        let rs = self.bh.schwarzschild_radius_m();
        let mut coordinate_time = Vec::new();
        let mut proper_time = Vec::new();
        let mut radius = Vec::new();
        let mut velocity = Vec::new();
        let mut truncated = false;

        // Below this the cutoff is reached for all practical purposes.
        let gap_floor = rs * 1e-9;

        for _ in 0..self.max_steps {
            radius.push(self.r / rs);
            coordinate_time.push(self.t);
            proper_time.push(self.tau);
            velocity.push(-C_M_S * (rs / self.r).sqrt());

            let gap = self.r - self.r_stop;
            if gap <= gap_floor {
                self.state = InfallState::Terminated;
                break;
            }

            if self.state == InfallState::Falling && self.r < rs * (1.0 + NEAR_HORIZON_BAND) {
                self.state = InfallState::NearHorizon;
            }

            let dr = match self.state {
                InfallState::NearHorizon => (REFINE_FRACTION * gap).min(self.dr_coarse),
                _ => self.dr_coarse.min(gap),
            };

            // Midpoint evaluation keeps both ODEs second-order accurate.
            let rm = self.r - 0.5 * dr;
            let d_tau = dr / (C_M_S * (rs / rm).sqrt());
            let d_t = d_tau / (1.0 - rs / rm);

            if !d_t.is_finite() || self.t + d_t > 1e60 {
                // Overflow near the cutoff: keep what we have.
                tracing::debug!(r_rs = self.r / rs, "coordinate time overflow, truncating");
                truncated = true;
                self.state = InfallState::Terminated;
                break;
            }

            self.r -= dr;
            self.tau += d_tau;
            self.t += d_t;
        }
        self.state = InfallState::Terminated;

        let encoding = radius
            .iter()
            .map(|&r_rs| (2.0 - r_rs).clamp(0.0, 1.0))
            .collect();

        InfallTrajectory {
            coordinate_time,
            proper_time,
            radius,
            velocity,
            encoding,
            schwarzschild_radius_km: self.bh.schwarzschild_radius_km(),
            entropy_bits: self.bh.entropy_bits(),
            truncated,
        }
    }
}

/// Integrate one validated infall request.
pub fn simulate_infall(req: &InfallRequest) -> InfallTrajectory {
    GeodesicIntegrator::new(req).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infall(start_dist: f64, offset: f64) -> InfallTrajectory {
        let req = InfallRequest::new(10.0, start_dist, 1000, Some(offset)).unwrap();
        simulate_infall(&req)
    }

    #[test]
    fn schwarzschild_radius_matches_ten_solar_masses() {
        let bh = BlackHole::new(10.0);
        let rs_km = bh.schwarzschild_radius_km();
        assert!((rs_km - 29.5).abs() < 0.2, "rs = {rs_km} km");
    }

    #[test]
    fn radius_decreases_and_never_reaches_horizon() {
        let traj = infall(10.0, 1e-3);
        assert!(traj.radius.windows(2).all(|w| w[1] < w[0]));
        assert!(traj.radius.iter().all(|&r| r > 1.0));
        let last = *traj.radius.last().unwrap();
        assert!(last < 1.0 + 2e-3, "stopped at {last} rs");
    }

    #[test]
    fn times_are_monotonic_and_proper_time_bounded() {
        let traj = infall(10.0, 1e-3);
        assert!(traj.coordinate_time.windows(2).all(|w| w[1] >= w[0]));
        assert!(traj.proper_time.windows(2).all(|w| w[1] >= w[0]));
        assert!(traj.proper_time.iter().all(|t| t.is_finite()));
        assert!(traj.coordinate_time.iter().all(|t| t.is_finite()));
    }

    #[test]
    fn smaller_cutoff_offset_grows_coordinate_time_unboundedly() {
        let coarse = infall(10.0, 1e-2);
        let fine = infall(10.0, 1e-4);
        let t_coarse = *coarse.coordinate_time.last().unwrap();
        let t_fine = *fine.coordinate_time.last().unwrap();
        assert!(t_fine > t_coarse, "t({t_fine}) should exceed t({t_coarse})");

        // Proper time barely moves between the two cutoffs.
        let tau_coarse = *coarse.proper_time.last().unwrap();
        let tau_fine = *fine.proper_time.last().unwrap();
        assert!((tau_fine - tau_coarse) / tau_coarse < 0.01);
    }

    #[test]
    fn encoding_is_monotone_and_bounded() {
        let traj = infall(10.0, 1e-3);
        assert!(traj.encoding.windows(2).all(|w| w[1] >= w[0]));
        assert!(traj.encoding.iter().all(|&e| (0.0..=1.0).contains(&e)));
        // Fully encoded by the time the fall reaches the cutoff.
        assert!(*traj.encoding.last().unwrap() > 0.99);
    }

    #[test]
    fn entropy_scales_with_horizon_area() {
        let small = BlackHole::new(10.0).entropy_bits();
        let large = BlackHole::new(20.0).entropy_bits();
        assert!(small > 1e78);
        assert!((large / small - 4.0).abs() < 1e-9); // area ~ M^2
    }

    #[test]
    fn integrator_reports_phase_transitions() {
        let req = InfallRequest::new(10.0, 10.0, 1000, None).unwrap();
        let stepper = GeodesicIntegrator::new(&req);
        assert_eq!(stepper.state(), InfallState::Falling);
        let traj = stepper.run();
        assert!(!traj.truncated);
    }
}
