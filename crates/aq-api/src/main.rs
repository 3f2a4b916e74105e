use aq_api::rest::{self, ApiState};
use aq_api::AirQualityOrchestrator;
use aq_core::config::Config;
use aq_core::types::SourceCode;
use aq_db::SqliteStore;
use aq_fusion::{FusionEngine, ForecastAggregator};
use aq_ingest::sources::{AirNowAdapter, AirVisualAdapter, OpenAqAdapter, OpenWeatherMapAdapter, PurpleAirAdapter, WaqiAdapter};
use aq_ingest::{AirQualityAdapter, HealthTracker};
use aq_location::NominatimResolver;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::info;

fn build_adapters(config: &Config) -> HashMap<SourceCode, Arc<dyn AirQualityAdapter>> {
    let mut adapters: HashMap<SourceCode, Arc<dyn AirQualityAdapter>> = HashMap::new();
    adapters.insert(SourceCode::EpaAirNow, Arc::new(AirNowAdapter::new(&config.sources.epa_airnow)));
    adapters.insert(
        SourceCode::PurpleAir,
        Arc::new(PurpleAirAdapter::new(&config.sources.purpleair, config.fusion.purpleair_epa_correction)),
    );
    adapters.insert(SourceCode::OpenWeatherMap, Arc::new(OpenWeatherMapAdapter::new(&config.sources.openweathermap)));
    adapters.insert(SourceCode::Waqi, Arc::new(WaqiAdapter::new(&config.sources.waqi)));
    adapters.insert(SourceCode::AirVisual, Arc::new(AirVisualAdapter::new(&config.sources.airvisual)));
    adapters.insert(SourceCode::OpenAq, Arc::new(OpenAqAdapter::new(&config.sources.openaq)));
    adapters
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load("config.yaml")?;
    aq_observability::init_observability(config.observability.json_logs);

    info!("starting air-quality-fusion API v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(SqliteStore::new(&config.database.path).await?);
    store.run_migrations().await?;

    let adapters = build_adapters(&config);
    let health = Arc::new(HealthTracker::new());

    let location_resolver = Arc::new(NominatimResolver::new(
        &config.location.geocoder_base_url,
        config.location.cache_ttl_secs as i64,
    ));

    let fusion_engine = Arc::new(FusionEngine::new(
        store.clone(),
        config.fusion.response_cache_ttl_secs as i64,
        config.fusion.max_data_age_hours,
        config.fusion.preferred_data_age_minutes,
        config.api.default_search_radius_km,
    ));

    let forecast_aggregator = Arc::new(ForecastAggregator::new(store.clone(), config.fusion.response_cache_ttl_secs as i64));

    let orchestrator = Arc::new(AirQualityOrchestrator::new(
        location_resolver,
        fusion_engine,
        forecast_aggregator,
        adapters,
        health.clone(),
        store.clone(),
    ));

    let state = ApiState { orchestrator, health, started_at: chrono::Utc::now() };

    let app = rest::build_router(state).layer(CompressionLayer::new()).layer(CorsLayer::permissive());

    let addr = SocketAddr::new(config.api.bind_addr.parse()?, config.api.port);
    info!(%addr, "listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
