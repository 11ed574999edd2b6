//! Lookback-time curves for the evolving-mass cosmology.
//!
//! Two models are integrated over the same redshift range: the
//! evolving-mass history, where the local clock rate scales with the mass
//! function `m(z) = m0 / (1 + z)` and the lookback integral carries no
//! `(1 + z)` denominator, and the standard expansion history used as an
//! overlay reference.
//!
//! Near `z = -1` the mass function diverges (the modeled future
//! singularity). Samples past [`SINGULAR_Z`] carry `None` for the
//! evolving-mass age and the mass factor instead of a non-finite number.

use crate::constants::{C_MPC_GYR, H0_INV_GYR, OMEGA_L, OMEGA_M};
use crate::params::LookbackRequest;

/// Redshift at which the mass function is treated as divergent.
///
/// The mass factor there is 100x its present value; past this boundary
/// samples are emitted as `None`. Tunable policy, not physics.
pub const SINGULAR_Z: f64 = -0.99;

/// Mass factor magnitude corresponding to [`SINGULAR_Z`].
pub const MASS_FACTOR_LIMIT: f64 = 100.0;

/// Dimensionless expansion rate `E(z) = H(z)/H0` for the reference model.
pub fn hubble_e(z: f64) -> f64 {
    (OMEGA_M * (1.0 + z).powi(3) + OMEGA_L).sqrt()
}

/// Relative mass `m(z)/m0 = 1/(1+z)`.
///
/// Returns `None` once the factor exceeds [`MASS_FACTOR_LIMIT`] or the
/// denominator changes sign, i.e. at and beyond the future singularity.
pub fn mass_evolution_factor(z: f64) -> Option<f64> {
    let denom = 1.0 + z;
    if denom <= 1.0 / MASS_FACTOR_LIMIT {
        return None;
    }
    Some(1.0 / denom)
}

fn machian_integrand(z: f64) -> f64 {
    1.0 / hubble_e(z)
}

fn lcdm_integrand(z: f64) -> f64 {
    1.0 / ((1.0 + z) * hubble_e(z))
}

/// Composite Simpson rule over `[a, b]`.
///
/// Panel count scales with the span so short inter-sample segments stay
/// cheap while a cold start from z = 0 keeps its accuracy.
fn integrate(f: fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let span = (b - a).abs();
    if span == 0.0 {
        return 0.0;
    }
    let panels = ((span * 64.0).ceil() as usize).clamp(8, 4096);
    let n = panels * 2;
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let w = if i % 2 == 0 { 2.0 } else { 4.0 };
        sum += w * f(a + h * i as f64);
    }
    sum * h / 3.0
}

/// Evolving-mass lookback time in Gyr. `None` past the singular boundary.
///
/// Negative redshifts give negative values: time until emission rather
/// than time since.
pub fn lookback_time_machian(z: f64) -> Option<f64> {
    mass_evolution_factor(z)?;
    Some(integrate(machian_integrand, 0.0, z) * H0_INV_GYR)
}

/// Standard-model lookback time in Gyr. Finite for any `z > -1`.
pub fn lookback_time_lcdm(z: f64) -> f64 {
    integrate(lcdm_integrand, 0.0, z) * H0_INV_GYR
}

/// Gyr remaining until the future singularity at `z = -1`.
pub fn time_to_singularity() -> f64 {
    (integrate(machian_integrand, 0.0, -0.999) * H0_INV_GYR).abs()
}

/// Comoving distance in Mpc under the evolving-mass model, `c * t(z)`.
pub fn comoving_distance(z: f64) -> Option<f64> {
    Some(C_MPC_GYR * lookback_time_machian(z)?)
}

/// One point on a lookback curve. Serializes the singular region as
/// `null`, never as a non-finite number.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LookbackSample {
    pub z: f64,
    /// Evolving-mass lookback time, Gyr. `None` past the singular boundary.
    pub machian_gyr: Option<f64>,
    /// Reference-model lookback time, Gyr.
    pub lcdm_gyr: f64,
    /// `m(z)/m0`. `None` past the singular boundary.
    pub mass_factor: Option<f64>,
}

/// Lazy, finite sample sequence in strictly increasing `z`.
///
/// Both integrals accumulate incrementally between consecutive samples,
/// so a full curve costs one pass over the range regardless of resolution.
/// Restart by building a new iterator from the same request; no state
/// survives the sequence.
#[derive(Debug, Clone)]
pub struct LookbackSamples {
    req: LookbackRequest,
    idx: usize,
    /// (z, accumulated integral) of the previously emitted sample.
    machian_acc: Option<(f64, f64)>,
    lcdm_acc: Option<(f64, f64)>,
}

impl LookbackSamples {
    fn sample_z(&self, idx: usize) -> f64 {
        let span = self.req.max_z - self.req.min_z;
        self.req.min_z + span * idx as f64 / (self.req.steps - 1) as f64
    }
}

impl Iterator for LookbackSamples {
    type Item = LookbackSample;

    fn next(&mut self) -> Option<LookbackSample> {
        if self.idx >= self.req.steps {
            return None;
        }
        let z = self.sample_z(self.idx);
        self.idx += 1;

        let machian_integral = match self.machian_acc {
            Some((prev_z, acc)) => acc + integrate(machian_integrand, prev_z, z),
            None => integrate(machian_integrand, 0.0, z),
        };
        self.machian_acc = Some((z, machian_integral));

        let lcdm_integral = match self.lcdm_acc {
            Some((prev_z, acc)) => acc + integrate(lcdm_integrand, prev_z, z),
            None => integrate(lcdm_integrand, 0.0, z),
        };
        self.lcdm_acc = Some((z, lcdm_integral));

        let mass_factor = mass_evolution_factor(z);
        Some(LookbackSample {
            z,
            machian_gyr: mass_factor.map(|_| machian_integral * H0_INV_GYR),
            lcdm_gyr: lcdm_integral * H0_INV_GYR,
            mass_factor,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.req.steps - self.idx;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LookbackSamples {}

/// Build the sample sequence for a validated request.
pub fn lookback_curve(req: LookbackRequest) -> LookbackSamples {
    LookbackSamples {
        req,
        idx: 0,
        machian_acc: None,
        lcdm_acc: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(min_z: f64, max_z: f64, steps: usize) -> Vec<LookbackSample> {
        lookback_curve(LookbackRequest::new(min_z, max_z, steps).unwrap()).collect()
    }

    #[test]
    fn lcdm_age_strictly_increasing() {
        for samples in [curve(0.0, 15.0, 100), curve(-0.999, 2.0, 80)] {
            for pair in samples.windows(2) {
                assert!(
                    pair[1].lcdm_gyr > pair[0].lcdm_gyr,
                    "lcdm not increasing at z={}",
                    pair[1].z
                );
            }
        }
    }

    #[test]
    fn singular_region_emits_null_not_nan() {
        let samples = curve(-0.999, 0.0, 200);
        let mut saw_null = false;
        for s in &samples {
            if s.z <= SINGULAR_Z {
                assert!(s.machian_gyr.is_none(), "expected null at z={}", s.z);
                assert!(s.mass_factor.is_none());
                saw_null = true;
            } else {
                let age = s.machian_gyr.expect("finite sample expected");
                assert!(age.is_finite());
                assert!(s.mass_factor.unwrap().is_finite());
            }
            assert!(s.lcdm_gyr.is_finite());
        }
        assert!(saw_null, "range should cross the singular boundary");
    }

    #[test]
    fn past_ages_are_positive_and_machian_exceeds_lcdm() {
        // Without the (1+z) denominator the evolving-mass age grows
        // faster than the reference age at every positive redshift.
        for s in curve(0.5, 15.0, 50) {
            let machian = s.machian_gyr.unwrap();
            assert!(machian > 0.0);
            assert!(s.lcdm_gyr > 0.0);
            assert!(machian > s.lcdm_gyr, "at z={}", s.z);
        }
    }

    #[test]
    fn incremental_accumulation_matches_direct_integral() {
        let samples = curve(0.0, 10.0, 40);
        let last = samples.last().unwrap();
        let direct = lookback_time_machian(10.0).unwrap();
        assert!((last.machian_gyr.unwrap() - direct).abs() < 1e-6);
        let direct = lookback_time_lcdm(10.0);
        assert!((last.lcdm_gyr - direct).abs() < 1e-6);
    }

    #[test]
    fn iterator_is_restartable_and_finite() {
        let req = LookbackRequest::new(0.0, 5.0, 30).unwrap();
        let a: Vec<_> = lookback_curve(req).collect();
        let b: Vec<_> = lookback_curve(req).collect();
        assert_eq!(a.len(), 30);
        assert_eq!(a, b);
    }

    #[test]
    fn mass_factor_diverges_at_boundary() {
        assert!(mass_evolution_factor(-0.995).is_none());
        assert!(mass_evolution_factor(-1.2).is_none()); // sign change
        let f = mass_evolution_factor(0.0).unwrap();
        assert!((f - 1.0).abs() < 1e-12);
        assert!((mass_evolution_factor(1.0).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn time_to_singularity_is_finite_future_interval() {
        let t = time_to_singularity();
        assert!(t > 0.0 && t.is_finite());
        // Roughly an e-fold of the Hubble time at these densities.
        assert!(t < 2.0 * H0_INV_GYR);
    }
}
