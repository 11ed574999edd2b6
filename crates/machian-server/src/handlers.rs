//! Request/response endpoints.
//!
//! Each handler validates its query into an engine request, runs the
//! stateless engine, and serializes the result. Validation failures map
//! to HTTP 422 with a JSON body naming the offending field; nothing else
//! here can fail.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use machian_engine::cosmology::{self, LookbackSample};
use machian_engine::rotation::{self, RotationPoint};
use machian_engine::{
    Error, GalaxyProfile, InfallRequest, LookbackRequest, RotationRequest, geodesic,
};

use crate::state::{AppState, HealthResponse};

/// Engine error with an HTTP mapping.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidParameter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        gpu_available: state.device.gpu_available(),
    })
}

#[derive(Debug, Deserialize)]
pub struct LookbackQuery {
    #[serde(default)]
    pub min_z: f64,
    #[serde(default = "LookbackQuery::default_max_z")]
    pub max_z: f64,
    #[serde(default = "LookbackQuery::default_steps")]
    pub steps: usize,
}

impl LookbackQuery {
    fn default_max_z() -> f64 {
        15.0
    }
    fn default_steps() -> usize {
        100
    }
}

pub async fn lookback(
    Query(query): Query<LookbackQuery>,
) -> Result<Json<Vec<LookbackSample>>, ApiError> {
    let req = LookbackRequest::new(query.min_z, query.max_z, query.steps)?;
    let samples: Vec<LookbackSample> = cosmology::lookback_curve(req).collect();
    info!(
        min_z = req.min_z,
        max_z = req.max_z,
        steps = req.steps,
        t_singularity_gyr = cosmology::time_to_singularity(),
        "lookback curve served"
    );
    Ok(Json(samples))
}

#[derive(Debug, Deserialize)]
pub struct RotationQuery {
    #[serde(default = "RotationQuery::default_m0")]
    pub m0: f64,
    #[serde(default = "RotationQuery::default_scale_length")]
    pub scale_length: f64,
    #[serde(default = "RotationQuery::default_beta")]
    pub beta: f64,
    #[serde(default = "RotationQuery::default_max_r")]
    pub max_r: f64,
}

impl RotationQuery {
    fn default_m0() -> f64 {
        10.0
    }
    fn default_scale_length() -> f64 {
        15.0
    }
    fn default_beta() -> f64 {
        5.0
    }
    fn default_max_r() -> f64 {
        50.0
    }
}

#[derive(Serialize)]
pub struct RotationResponse {
    pub points: Vec<RotationPoint>,
    pub gpu: bool,
}

pub async fn rotation(
    State(state): State<AppState>,
    Query(query): Query<RotationQuery>,
) -> Result<Json<RotationResponse>, ApiError> {
    let req = RotationRequest::new(query.m0, query.scale_length, query.beta, query.max_r)?;
    let radii = rotation::sample_radii(&req);
    let profile = GalaxyProfile::new(req.m0_solar(), req.scale_length, req.beta);
    let (velocities, gpu_used) = state.device.velocity_profile(&profile, &radii);
    let curve = rotation::curve_from_velocities(&radii, &velocities, gpu_used);
    Ok(Json(RotationResponse {
        points: curve.points,
        gpu: curve.gpu_used,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InfallQuery {
    #[serde(default = "InfallQuery::default_mass")]
    pub mass: f64,
    #[serde(default = "InfallQuery::default_start_dist")]
    pub start_dist: f64,
    #[serde(default = "InfallQuery::default_steps")]
    pub steps: usize,
    pub horizon_offset: Option<f64>,
}

impl InfallQuery {
    fn default_mass() -> f64 {
        10.0
    }
    fn default_start_dist() -> f64 {
        10.0
    }
    fn default_steps() -> usize {
        1000
    }
}

#[derive(Serialize)]
pub struct InfallResponse {
    pub t_coordinate: Vec<f64>,
    pub tau_proper: Vec<f64>,
    pub radius: Vec<f64>,
    pub velocity: Vec<f64>,
    pub encoding: Vec<f64>,
    pub rs_km: f64,
    pub entropy_bits: f64,
}

pub async fn infall(Query(query): Query<InfallQuery>) -> Result<Json<InfallResponse>, ApiError> {
    let req = InfallRequest::new(query.mass, query.start_dist, query.steps, query.horizon_offset)?;
    let traj = geodesic::simulate_infall(&req);
    if traj.truncated {
        info!(mass = req.mass_solar, "infall truncated by coordinate-time overflow");
    }
    Ok(Json(InfallResponse {
        t_coordinate: traj.coordinate_time,
        tau_proper: traj.proper_time,
        radius: traj.radius,
        velocity: traj.velocity,
        encoding: traj.encoding,
        rs_km: traj.schwarzschild_radius_km,
        entropy_bits: traj.entropy_bits,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_match_the_lab_ui() {
        let q: LookbackQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.min_z, 0.0);
        assert_eq!(q.max_z, 15.0);
        assert_eq!(q.steps, 100);

        let q: RotationQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.m0, 10.0);
        assert_eq!(q.scale_length, 15.0);
        assert_eq!(q.beta, 5.0);
        assert_eq!(q.max_r, 50.0);

        let q: InfallQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.mass, 10.0);
        assert_eq!(q.start_dist, 10.0);
        assert_eq!(q.steps, 1000);
        assert!(q.horizon_offset.is_none());
    }

    #[test]
    fn invalid_parameter_maps_to_422_naming_the_field() {
        let err = LookbackRequest::new(5.0, 2.0, 100).unwrap_err();
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn device_failure_maps_to_500() {
        let err = Error::DeviceFailure("adapter lost".into());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lookback_samples_serialize_singular_region_as_null() {
        let req = LookbackRequest::new(-0.999, 0.0, 50).unwrap();
        let samples: Vec<LookbackSample> = cosmology::lookback_curve(req).collect();
        let json = serde_json::to_value(&samples).unwrap();
        let first = &json[0];
        assert!(first["machian_gyr"].is_null());
        assert!(first["mass_factor"].is_null());
        assert!(first["lcdm_gyr"].is_f64());
    }
}
