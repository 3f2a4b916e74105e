use aq_api::rest::{build_router, ApiState};
use aq_api::AirQualityOrchestrator;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use aq_db::SqliteStore;
use aq_fusion::{ForecastAggregator, FusionEngine};
use aq_ingest::{AdapterError, AirQualityAdapter, HealthTracker};
use aq_location::{LocationResolver, ResolvedLocation};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

struct StubAdapter {
    source: SourceCode,
    aqi: i32,
}

#[async_trait]
impl AirQualityAdapter for StubAdapter {
    fn source_code(&self) -> SourceCode {
        self.source
    }

    async fn fetch_current(&self, lat: f64, lon: f64, _radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        Ok(vec![Measurement {
            source: self.source,
            coordinates: Coordinates::new(lat, lon).unwrap(),
            timestamp: Utc::now(),
            aqi: Some(self.aqi),
            pollutants: Pollutants::new(),
            quality_level: QualityLevel::Verified,
            distance_km: Some(0.0),
            confidence_score: Some(100.0),
            station_id: None,
            station_name: None,
        }])
    }

    fn is_configured(&self) -> bool {
        true
    }
}

struct StubResolver;

#[async_trait]
impl LocationResolver for StubResolver {
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> ResolvedLocation {
        ResolvedLocation {
            lat,
            lon,
            city: "Portland".to_string(),
            region: "Oregon".to_string(),
            country_code: "US".to_string(),
            postal_code: "97201".to_string(),
            formatted_address: "Portland, OR, US".to_string(),
        }
    }
}

async fn test_state() -> ApiState {
    let store = Arc::new(SqliteStore::new(":memory:").await.unwrap());
    store.run_migrations().await.unwrap();

    let mut adapters: HashMap<SourceCode, Arc<dyn AirQualityAdapter>> = HashMap::new();
    adapters.insert(SourceCode::EpaAirNow, Arc::new(StubAdapter { source: SourceCode::EpaAirNow, aqi: 42 }));

    let health = Arc::new(HealthTracker::new());
    let fusion_engine = Arc::new(FusionEngine::new(store.clone(), 600, 3, 30, 25.0));
    let forecast_aggregator = Arc::new(ForecastAggregator::new(store.clone(), 600));

    let orchestrator = Arc::new(AirQualityOrchestrator::new(
        Arc::new(StubResolver),
        fusion_engine,
        forecast_aggregator,
        adapters,
        health.clone(),
        store,
    ));

    ApiState { orchestrator, health, started_at: Utc::now() }
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = build_router(test_state().await);

    let response =
        app.oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn air_quality_endpoint_blends_the_single_configured_source() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/air-quality?lat=45.5&lon=-122.6").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["current"]["aqi"], 42);
    assert_eq!(json["current"]["category"], "Good");
    assert_eq!(json["location"]["city"], "Portland");
}

#[tokio::test]
async fn air_quality_endpoint_rejects_out_of_range_coordinates() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/air-quality?lat=200&lon=0").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_advice_endpoint_resolves_epa_category() {
    let app = build_router(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/health-advice?aqi=75&scale=EPA").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["category"], "Moderate");
}

#[tokio::test]
async fn sources_endpoint_lists_every_tracked_provider() {
    let app = build_router(test_state().await);

    let response =
        app.oneshot(Request::builder().uri("/api/v1/sources").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 6);
}
