//! Validated request parameters.
//!
//! Raw request fields are bounds-checked once, here, before any engine
//! runs. A constructed request is immutable and carries only values the
//! engines can trust; every rejection names the offending field.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Particle counts a streaming session may request.
pub const ALLOWED_PARTICLE_COUNTS: [usize; 4] = [500, 1000, 2000, 5000];

/// Default horizon cutoff offset, in Schwarzschild radii above the horizon.
pub const DEFAULT_HORIZON_OFFSET: f64 = 1e-3;

fn require_finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::invalid(field, "must be a finite number"))
    }
}

/// Redshift range and resolution for a lookback-time curve.
#[derive(Debug, Clone, Copy)]
pub struct LookbackRequest {
    pub min_z: f64,
    pub max_z: f64,
    pub steps: usize,
}

impl LookbackRequest {
    pub fn new(min_z: f64, max_z: f64, steps: usize) -> Result<Self> {
        require_finite("min_z", min_z)?;
        require_finite("max_z", max_z)?;
        if min_z >= max_z {
            return Err(Error::invalid(
                "min_z",
                format!("min_z ({min_z}) must be below max_z ({max_z})"),
            ));
        }
        // z = -1 is the modeled future singularity; nothing exists past it.
        if min_z <= -1.0 {
            return Err(Error::invalid("min_z", "must be above -1"));
        }
        if !(2..=10_000).contains(&steps) {
            return Err(Error::invalid("steps", "must be between 2 and 10000"));
        }
        Ok(Self { min_z, max_z, steps })
    }
}

/// Galaxy rotation-curve parameters. `m0` is in units of 1e10 solar
/// masses, `scale_length` and `max_r` in kpc.
#[derive(Debug, Clone, Copy)]
pub struct RotationRequest {
    pub m0: f64,
    pub scale_length: f64,
    pub beta: f64,
    pub max_r: f64,
    pub samples: usize,
}

impl RotationRequest {
    pub const DEFAULT_SAMPLES: usize = 200;

    pub fn new(m0: f64, scale_length: f64, beta: f64, max_r: f64) -> Result<Self> {
        require_finite("m0", m0)?;
        require_finite("scale_length", scale_length)?;
        require_finite("beta", beta)?;
        require_finite("max_r", max_r)?;
        if m0 <= 0.0 {
            return Err(Error::invalid("m0", "mass must be positive"));
        }
        if scale_length <= 0.0 {
            return Err(Error::invalid("scale_length", "must be positive"));
        }
        if !(0.0..=10.0).contains(&beta) {
            return Err(Error::invalid("beta", "must be in [0, 10]"));
        }
        if !(1.0..=500.0).contains(&max_r) {
            return Err(Error::invalid("max_r", "must be in [1, 500] kpc"));
        }
        Ok(Self {
            m0,
            scale_length,
            beta,
            max_r,
            samples: Self::DEFAULT_SAMPLES,
        })
    }

    /// Central mass in solar masses.
    pub fn m0_solar(&self) -> f64 {
        self.m0 * 1e10
    }
}

/// Radial-infall parameters. `start_dist` and `horizon_offset` are in
/// Schwarzschild radii.
#[derive(Debug, Clone, Copy)]
pub struct InfallRequest {
    pub mass_solar: f64,
    pub start_dist: f64,
    pub steps: usize,
    pub horizon_offset: f64,
}

impl InfallRequest {
    pub fn new(
        mass_solar: f64,
        start_dist: f64,
        steps: usize,
        horizon_offset: Option<f64>,
    ) -> Result<Self> {
        require_finite("mass", mass_solar)?;
        require_finite("start_dist", start_dist)?;
        if mass_solar <= 0.0 {
            return Err(Error::invalid("mass", "mass must be positive"));
        }
        if start_dist <= 1.0 {
            return Err(Error::invalid(
                "start_dist",
                "must start outside the horizon (> 1 Schwarzschild radius)",
            ));
        }
        if !(10..=100_000).contains(&steps) {
            return Err(Error::invalid("steps", "must be between 10 and 100000"));
        }
        let horizon_offset = horizon_offset.unwrap_or(DEFAULT_HORIZON_OFFSET);
        require_finite("horizon_offset", horizon_offset)?;
        if horizon_offset <= 0.0 || horizon_offset >= start_dist - 1.0 {
            return Err(Error::invalid(
                "horizon_offset",
                "must be positive and below start_dist - 1",
            ));
        }
        Ok(Self {
            mass_solar,
            start_dist,
            steps,
            horizon_offset,
        })
    }
}

/// Streaming session configuration, received as the first WebSocket
/// message. `m0` in units of 1e10 solar masses, `scale_length` in kpc.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NBodyConfig {
    #[serde(default = "NBodyConfig::default_particles", alias = "particle_count")]
    pub n_particles: usize,
    #[serde(default = "NBodyConfig::default_m0")]
    pub m0: f64,
    #[serde(default = "NBodyConfig::default_scale_length")]
    pub scale_length: f64,
    #[serde(default = "NBodyConfig::default_beta")]
    pub beta: f64,
}

impl NBodyConfig {
    fn default_particles() -> usize {
        1000
    }
    fn default_m0() -> f64 {
        10.0
    }
    fn default_scale_length() -> f64 {
        15.0
    }
    fn default_beta() -> f64 {
        5.0
    }
}

/// Validated N-body session parameters.
#[derive(Debug, Clone, Copy)]
pub struct NBodyRequest {
    pub n_particles: usize,
    pub m0: f64,
    pub scale_length: f64,
    pub beta: f64,
}

impl NBodyRequest {
    pub fn new(config: NBodyConfig) -> Result<Self> {
        if !ALLOWED_PARTICLE_COUNTS.contains(&config.n_particles) {
            return Err(Error::invalid(
                "n_particles",
                format!(
                    "must be one of {:?}, got {}",
                    ALLOWED_PARTICLE_COUNTS, config.n_particles
                ),
            ));
        }
        require_finite("m0", config.m0)?;
        require_finite("scale_length", config.scale_length)?;
        require_finite("beta", config.beta)?;
        if config.m0 <= 0.0 {
            return Err(Error::invalid("m0", "mass must be positive"));
        }
        if config.scale_length <= 0.0 {
            return Err(Error::invalid("scale_length", "must be positive"));
        }
        if !(0.0..=10.0).contains(&config.beta) {
            return Err(Error::invalid("beta", "must be in [0, 10]"));
        }
        Ok(Self {
            n_particles: config.n_particles,
            m0: config.m0,
            scale_length: config.scale_length,
            beta: config.beta,
        })
    }

    /// Central mass in solar masses.
    pub fn m0_solar(&self) -> f64 {
        self.m0 * 1e10
    }
}
