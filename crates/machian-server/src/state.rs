use std::time::Duration;

use machian_nbody::Device;

/// Shared across handlers. The device is the only live resource; the rest
/// is configuration fixed at startup.
#[derive(Clone)]
pub struct AppState {
    pub device: Device,
    /// Streaming session tick interval.
    pub tick: Duration,
}

/// Health payload for `GET /`.
#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub gpu_available: bool,
}
