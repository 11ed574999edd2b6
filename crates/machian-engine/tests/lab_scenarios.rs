//! End-to-end checks of the lesson scenarios as the UI requests them:
//! default parameters, full curves, and the relations between models that
//! the lesson text relies on.

use machian_engine::constants::{C_MPC_GYR, H0_INV_GYR};
use machian_engine::cosmology::{self, LookbackSample};
use machian_engine::geodesic::{self, BlackHole};
use machian_engine::rotation::{self, FLAT_BETA};
use machian_engine::{InfallRequest, LookbackRequest, RotationRequest};

#[test]
fn default_lookback_curve_tells_the_older_universe_story() {
    // UI defaults: z in [0, 15], 100 samples.
    let req = LookbackRequest::new(0.0, 15.0, 100).unwrap();
    let samples: Vec<LookbackSample> = cosmology::lookback_curve(req).collect();
    assert_eq!(samples.len(), 100);

    // At z = 0 both clocks read zero.
    assert!(samples[0].machian_gyr.unwrap().abs() < 1e-9);
    assert!(samples[0].lcdm_gyr.abs() < 1e-9);

    // The evolving-mass age exceeds the reference age everywhere past
    // z = 0, and the gap widens monotonically with redshift.
    let mut prev_gap = 0.0;
    for s in &samples[1..] {
        let gap = s.machian_gyr.unwrap() - s.lcdm_gyr;
        assert!(gap > prev_gap, "gap shrank at z = {}", s.z);
        prev_gap = gap;
    }

    // Both ages stay within a few Hubble times over the default range.
    let last = samples.last().unwrap();
    assert!(last.machian_gyr.unwrap() < 5.0 * H0_INV_GYR);
}

#[test]
fn future_evolution_ends_at_the_singular_boundary() {
    let req = LookbackRequest::new(-0.999, 0.0, 300).unwrap();
    let samples: Vec<LookbackSample> = cosmology::lookback_curve(req).collect();

    // The curve crosses from null into finite territory exactly once.
    let transitions = samples
        .windows(2)
        .filter(|w| w[0].machian_gyr.is_none() != w[1].machian_gyr.is_none())
        .count();
    assert_eq!(transitions, 1);

    // Time to the singularity bounds every finite future age.
    let horizon = cosmology::time_to_singularity();
    for s in samples.iter().filter(|s| s.z < 0.0) {
        if let Some(age) = s.machian_gyr {
            assert!(age < 0.0, "future ages are negative at z = {}", s.z);
            assert!(age.abs() <= horizon + 1e-9);
        }
    }
}

#[test]
fn comoving_distance_tracks_the_lookback_time() {
    let d = cosmology::comoving_distance(2.0).unwrap();
    let t = cosmology::lookback_time_machian(2.0).unwrap();
    assert!((d - C_MPC_GYR * t).abs() < 1e-9);
    assert!(cosmology::comoving_distance(-0.999).is_none());
}

#[test]
fn rotation_curve_flattens_without_a_halo() {
    // Default galaxy at the documented flattening exponent, sampled far
    // enough out that the disk no longer contributes new mass.
    let req = RotationRequest::new(10.0, 15.0, FLAT_BETA, 300.0).unwrap();
    let flat = rotation::solve(&req);

    let outer = &flat.points[flat.points.len() / 2..];
    let v0 = outer[0].v;
    for p in outer {
        assert!((p.v - v0).abs() / v0 < 0.06, "slope at r = {}", p.r);
    }

    // Same galaxy with no inertia decoupling declines instead.
    let req = RotationRequest::new(10.0, 15.0, 0.0, 300.0).unwrap();
    let keplerian = rotation::solve(&req);
    let mid = keplerian.points[keplerian.points.len() / 2].v;
    let end = keplerian.points.last().unwrap().v;
    assert!(end < mid);
}

#[test]
fn infall_matches_the_lesson_numbers_for_ten_solar_masses() {
    let req = InfallRequest::new(10.0, 10.0, 1000, None).unwrap();
    let traj = geodesic::simulate_infall(&req);

    assert!((traj.schwarzschild_radius_km - 29.5).abs() < 0.2);
    assert!(traj.entropy_bits > 1e78);
    assert!(!traj.truncated);

    // The distant observer's clock runs ahead of the faller's, and the
    // whole fall takes milliseconds for a stellar-mass hole.
    let t_coord = *traj.coordinate_time.last().unwrap();
    let tau = *traj.proper_time.last().unwrap();
    assert!(t_coord > tau);
    assert!(tau < 1e-2);

    // Dilation factor agrees with the trajectory endpoints.
    let bh = BlackHole::new(10.0);
    let r_last = traj.radius.last().unwrap() * bh.schwarzschild_radius_m();
    assert!(bh.time_dilation_factor(r_last) < 0.1);
    assert_eq!(bh.time_dilation_factor(bh.schwarzschild_radius_m()), 0.0);
}
