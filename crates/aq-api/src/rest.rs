use crate::orchestrator::{AirQualityOrchestrator, AirQualityResponse};
use aq_core::types::{category_for, SourceCode};
use aq_ingest::HealthTracker;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Builds the router with every documented endpoint wired in. Shared between
/// the server binary and in-process tests so both exercise the same routes.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/air-quality", get(get_air_quality))
        .route("/api/v1/health-advice", get(get_health_advice))
        .route("/api/v1/sources", get(list_sources))
        .route("/api/v1/health", get(health))
        .with_state(state)
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<AirQualityOrchestrator>,
    pub health: Arc<HealthTracker>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AirQualityQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub forecast: bool,
    pub radius: Option<f64>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub lat: f64,
    pub lon: f64,
    pub city: String,
    pub region: String,
    pub country: String,
}

#[derive(Debug, Serialize)]
pub struct AirQualityApiResponse {
    pub location: LocationResponse,
    pub current: CurrentResponse,
    pub forecast: Vec<aq_fusion::AggregatedHour>,
    pub health_advice: String,
    pub source_details: Vec<aq_fusion::SourceDetail>,
}

#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub aqi: Option<i32>,
    pub category: String,
    pub pollutants: aq_core::types::Pollutants,
    pub sources: Vec<SourceCode>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl From<AirQualityResponse> for AirQualityApiResponse {
    fn from(r: AirQualityResponse) -> Self {
        Self {
            location: LocationResponse {
                lat: r.lat,
                lon: r.lon,
                city: r.location.city,
                region: r.location.region,
                country: r.location.country_code,
            },
            current: CurrentResponse {
                aqi: r.aqi,
                category: r.category,
                pollutants: r.pollutants,
                sources: r.sources,
                last_updated: r.last_updated,
            },
            forecast: r.forecast.unwrap_or_default(),
            health_advice: r.health_advice,
            source_details: r.source_details,
        }
    }
}

pub async fn get_air_quality(
    State(state): State<ApiState>,
    Query(params): Query<AirQualityQuery>,
) -> Result<Json<AirQualityApiResponse>, ApiError> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(ApiError::BadRequest("lat/lon out of range".to_string()));
    }
    let radius = params.radius.unwrap_or(25.0);

    let result = state
        .orchestrator
        .get_air_quality(params.lat, params.lon, radius, params.forecast, params.use_cache)
        .await;

    Ok(Json(AirQualityApiResponse::from(result)))
}

#[derive(Debug, Deserialize)]
pub struct HealthAdviceQuery {
    pub aqi: i32,
    #[serde(default = "default_scale")]
    pub scale: String,
}

fn default_scale() -> String {
    "EPA".to_string()
}

#[derive(Debug, Serialize)]
pub struct HealthAdviceResponse {
    pub category: String,
    pub health_message: String,
    pub sensitive_groups: String,
    pub color_hex: String,
}

pub async fn get_health_advice(Query(params): Query<HealthAdviceQuery>) -> Result<Json<HealthAdviceResponse>, ApiError> {
    let category = category_for(params.aqi, &params.scale)
        .ok_or_else(|| ApiError::BadRequest(format!("no category defined for aqi={} on scale={}", params.aqi, params.scale)))?;

    Ok(Json(HealthAdviceResponse {
        category: category.category.to_string(),
        health_message: category.health_message.to_string(),
        sensitive_groups: category.sensitive_groups.to_string(),
        color_hex: category.color_hex.to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub display_name: &'static str,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub success_rate: f64,
}

pub async fn list_sources(State(state): State<ApiState>) -> Json<Vec<SourceStatus>> {
    let snapshot = state.health.snapshot();
    let statuses = snapshot
        .iter()
        .map(|h| SourceStatus {
            display_name: SourceCode::from_str_opt(&h.source).map(|c| c.display_name()).unwrap_or("unknown"),
            source: h.source.clone(),
            is_active: h.is_active,
            consecutive_failures: h.consecutive_failures,
            total_requests: h.total_requests,
            total_failures: h.total_failures,
            success_rate: h.success_rate(),
        })
        .collect();
    Json(statuses)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response(),
        }
    }
}
