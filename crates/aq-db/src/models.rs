use aq_core::types::{Pollutants, SourceCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fused air quality result, cached by rounded coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendedData {
    pub lat: f64,
    pub lon: f64,
    pub current_aqi: Option<i32>,
    pub category: String,
    pub pollutants: Pollutants,
    pub sources: Vec<SourceCode>,
    pub source_count: i32,
    pub last_updated: DateTime<Utc>,
    pub cached_until: DateTime<Utc>,
    pub hit_count: i64,
}

/// Per-region, per-source weighting configuration used by the fusion engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceWeight {
    pub source_code: SourceCode,
    pub region_code: String,
    pub trust_weight: f64,
    pub priority_rank: i32,
    pub distance_weight_factor: f64,
    pub time_decay_factor: f64,
    pub is_active: bool,
    pub is_primary: bool,
}

/// A record of one fusion run, kept for debugging and tuning weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionLogEntry {
    pub query_lat: f64,
    pub query_lon: f64,
    pub result_aqi: Option<i32>,
    pub sources_used: Vec<SourceCode>,
    pub sources_attempted: Vec<SourceCode>,
    pub sources_failed: Vec<SourceCode>,
    pub fusion_method: String,
    pub weight_details: serde_json::Value,
    pub execution_time_ms: Option<i64>,
    pub cache_hit: bool,
    pub has_error: bool,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// A region's preferred adapter ordering and reporting scale, seeded once
/// and otherwise read-only from the fusion engine's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region_code: String,
    pub aqi_scale: String,
    pub source_priority: Vec<SourceCode>,
}

/// Persisted copy of one upstream request/response pair, for audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponseLogRecord {
    pub source: String,
    pub endpoint: String,
    pub params: serde_json::Value,
    pub response_data: serde_json::Value,
    pub status_code: i32,
    pub response_time_ms: Option<i64>,
    pub is_error: bool,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// An hourly-bucketed forecast point, aggregated from multiple sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedForecastPoint {
    pub lat: f64,
    pub lon: f64,
    pub hour_bucket: DateTime<Utc>,
    pub aqi: Option<i32>,
    pub pollutants: Pollutants,
    pub sources: Vec<SourceCode>,
    pub cached_until: DateTime<Utc>,
}
