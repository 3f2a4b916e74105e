pub mod client;
pub mod health;
pub mod sources;

pub use client::{AdapterError, AuthStrategy, HttpAdapterClient, RawResponseLog};
pub use health::HealthTracker;

use aq_core::types::{Measurement, SourceCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single hourly forecast point as reported by a provider, before
/// cross-source aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub aqi: Option<i32>,
    pub pollutants: aq_core::types::Pollutants,
    pub source: SourceCode,
}

/// Common contract every provider adapter implements.
///
/// `fetch_forecast` defaults to an empty result since only a couple of
/// providers expose forecast data at all.
#[async_trait]
pub trait AirQualityAdapter: Send + Sync {
    fn source_code(&self) -> SourceCode;

    async fn fetch_current(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Measurement>, AdapterError>;

    async fn fetch_forecast(&self, _lat: f64, _lon: f64) -> Result<Vec<ForecastPoint>, AdapterError> {
        Ok(Vec::new())
    }

    /// Whether the adapter has what it needs to run at all (e.g. an API key).
    fn is_configured(&self) -> bool;
}
