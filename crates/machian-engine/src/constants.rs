//! Physical constants shared across the engines.
//!
//! Cosmology works in km/s/Mpc and Gyr, galactic dynamics in kpc and km/s,
//! the geodesic integrator in SI. Each engine documents its units at the
//! point of use.

/// Hubble constant, km/s/Mpc.
pub const H0: f64 = 70.0;

/// Matter density parameter.
pub const OMEGA_M: f64 = 0.3;

/// Dark-energy density parameter.
pub const OMEGA_L: f64 = 0.7;

/// Hubble time 1/H0 in Gyr (977.8 Gyr·km/s/Mpc conversion).
pub const H0_INV_GYR: f64 = 977.8 / H0;

/// Speed of light, km/s.
pub const C_KM_S: f64 = 299_792.458;

/// Speed of light, Mpc/Gyr.
pub const C_MPC_GYR: f64 = 306.601;

/// Speed of light, m/s.
pub const C_M_S: f64 = 2.997_924_58e8;

/// Newton's constant, m^3 kg^-1 s^-2.
pub const G_SI: f64 = 6.674_30e-11;

/// Newton's constant in galactic units, kpc km^2 s^-2 Msun^-1.
pub const G_KPC: f64 = 4.300_91e-6;

/// Solar mass, kg.
pub const M_SUN_KG: f64 = 1.989e30;

/// Planck length, m.
pub const PLANCK_LENGTH_M: f64 = 1.616_255e-35;
