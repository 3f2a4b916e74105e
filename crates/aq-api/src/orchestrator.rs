use aq_core::types::{Measurement, SourceCode};
use aq_db::SqliteStore;
use aq_fusion::{BlendResult, ForecastAggregator, FusionEngine};
use aq_ingest::{AirQualityAdapter, HealthTracker};
use aq_location::{region_for, LocationResolver, ResolvedLocation};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const CURRENT_FETCH_CONCURRENCY: usize = 4;
const FORECAST_FETCH_CONCURRENCY: usize = 2;

/// Adapters that additionally support a forecast query. Kept as a fixed
/// list rather than a trait capability flag since exactly two of the six
/// providers expose one.
const FORECAST_SOURCES: [SourceCode; 2] = [SourceCode::EpaAirNow, SourceCode::OpenWeatherMap];

#[derive(Debug, Clone, Serialize)]
pub struct AirQualityResponse {
    pub lat: f64,
    pub lon: f64,
    pub aqi: Option<i32>,
    pub category: String,
    pub pollutants: aq_core::types::Pollutants,
    pub sources: Vec<SourceCode>,
    pub source_details: Vec<aq_fusion::SourceDetail>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub health_advice: String,
    pub location: LocationSummary,
    pub forecast: Option<Vec<aq_fusion::AggregatedHour>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationSummary {
    pub city: String,
    pub region: String,
    pub country_code: String,
    pub formatted_address: String,
}

impl From<ResolvedLocation> for LocationSummary {
    fn from(loc: ResolvedLocation) -> Self {
        Self { city: loc.city, region: loc.region, country_code: loc.country_code, formatted_address: loc.formatted_address }
    }
}

/// Coordinates location resolution, parallel fan-out across provider
/// adapters, weighted fusion, and optional forecast aggregation into one
/// response. This is the entry point the REST layer calls into.
pub struct AirQualityOrchestrator {
    location_resolver: Arc<dyn LocationResolver>,
    fusion_engine: Arc<FusionEngine>,
    forecast_aggregator: Arc<ForecastAggregator>,
    adapters: HashMap<SourceCode, Arc<dyn AirQualityAdapter>>,
    health: Arc<HealthTracker>,
    store: Arc<SqliteStore>,
}

impl AirQualityOrchestrator {
    pub fn new(
        location_resolver: Arc<dyn LocationResolver>,
        fusion_engine: Arc<FusionEngine>,
        forecast_aggregator: Arc<ForecastAggregator>,
        adapters: HashMap<SourceCode, Arc<dyn AirQualityAdapter>>,
        health: Arc<HealthTracker>,
        store: Arc<SqliteStore>,
    ) -> Self {
        Self { location_resolver, fusion_engine, forecast_aggregator, adapters, health, store }
    }

    #[instrument(skip(self))]
    pub async fn get_air_quality(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        include_forecast: bool,
        use_cache: bool,
    ) -> AirQualityResponse {
        let location = self.location_resolver.reverse_geocode(lat, lon).await;
        let region = region_for(&location.country_code);

        let active_sources = self.active_sources_in_priority_order(&region.source_priority);

        let (measurements, attempted, failed) = self.fetch_all_current(lat, lon, radius_km, &active_sources).await;

        let weights = self.store.get_source_weights(&region.country_code).await.unwrap_or_else(|e| {
            warn!(error = %e, region = %region.country_code, "failed to load source weights, falling back to defaults");
            Vec::new()
        });
        let blend: BlendResult =
            self.fusion_engine.blend(lat, lon, measurements, attempted, failed, &weights, use_cache).await;

        let forecast = if include_forecast {
            Some(self.fetch_and_aggregate_forecast(lat, lon, use_cache).await)
        } else {
            None
        };

        AirQualityResponse {
            lat: blend.lat,
            lon: blend.lon,
            aqi: blend.aqi,
            category: blend.category,
            pollutants: blend.pollutants,
            sources: blend.sources,
            source_details: blend.source_details,
            last_updated: blend.last_updated,
            health_advice: blend.health_advice,
            location: location.into(),
            forecast,
            error: blend.error,
        }
    }

    fn active_sources_in_priority_order(&self, priority: &[SourceCode]) -> Vec<SourceCode> {
        let mut ordered: Vec<SourceCode> = Vec::new();
        for source in priority {
            if self.is_usable(*source) {
                ordered.push(*source);
            }
        }
        for source in SourceCode::all() {
            if !priority.contains(&source) && self.is_usable(source) {
                ordered.push(source);
            }
        }
        ordered
    }

    fn is_usable(&self, source: SourceCode) -> bool {
        let Some(adapter) = self.adapters.get(&source) else { return false };
        adapter.is_configured() && self.health.is_available(source)
    }

    async fn fetch_all_current(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        sources: &[SourceCode],
    ) -> (Vec<Measurement>, Vec<SourceCode>, Vec<SourceCode>) {
        let attempted = sources.to_vec();

        let results: Vec<(SourceCode, Result<Vec<Measurement>, aq_ingest::AdapterError>)> = stream::iter(sources.iter().copied())
            .map(|source| {
                let adapter = self.adapters.get(&source).cloned();
                async move {
                    match adapter {
                        Some(adapter) => (source, adapter.fetch_current(lat, lon, radius_km).await),
                        None => (source, Ok(Vec::new())),
                    }
                }
            })
            .buffer_unordered(CURRENT_FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut measurements = Vec::new();
        let mut failed = Vec::new();

        for (source, result) in results {
            match result {
                Ok(data) => {
                    info!(source = %source, count = data.len(), "fetched current measurements");
                    self.health.record_success(source);
                    measurements.extend(data);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "adapter fetch failed");
                    self.health.record_failure(source, e.to_string());
                    failed.push(source);
                }
            }
        }

        (measurements, attempted, failed)
    }

    async fn fetch_and_aggregate_forecast(&self, lat: f64, lon: f64, use_cache: bool) -> Vec<aq_fusion::AggregatedHour> {
        let sources: Vec<SourceCode> =
            FORECAST_SOURCES.iter().copied().filter(|s| self.adapters.contains_key(s)).collect();

        let points: Vec<aq_ingest::ForecastPoint> = stream::iter(sources)
            .map(|source| {
                let adapter = self.adapters.get(&source).cloned();
                async move {
                    match adapter {
                        Some(adapter) => adapter.fetch_forecast(lat, lon).await.unwrap_or_default(),
                        None => Vec::new(),
                    }
                }
            })
            .buffer_unordered(FORECAST_FETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        self.forecast_aggregator.aggregate(lat, lon, points, use_cache).await
    }
}
