use aq_core::types::{category_for, Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use aq_db::{BlendedData, FusionLogEntry, SourceWeight, SqliteStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

/// One source's contribution to a blended result, with the weight it was
/// given and enough of its own data to audit the blend after the fact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceDetail {
    pub source: SourceCode,
    pub weight: f64,
    pub aqi: Option<i32>,
    pub distance_km: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub quality_level: QualityLevel,
    pub station_name: Option<String>,
}

/// Outcome of one fusion run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlendResult {
    pub lat: f64,
    pub lon: f64,
    pub aqi: Option<i32>,
    pub category: String,
    pub pollutants: Pollutants,
    pub sources: Vec<SourceCode>,
    pub source_details: Vec<SourceDetail>,
    pub last_updated: DateTime<Utc>,
    pub health_advice: String,
    pub cache_hit: bool,
    pub error: Option<String>,
}

/// Blends normalized measurements from multiple providers into one
/// result, weighting each by trust, freshness, distance, quality tier,
/// and reported confidence.
pub struct FusionEngine {
    store: Arc<SqliteStore>,
    cache_ttl_secs: i64,
    max_data_age_hours: i64,
    preferred_data_age_minutes: i64,
    default_search_radius_km: f64,
}

const DEFAULT_TRUST_WEIGHT: f64 = 0.5;

impl FusionEngine {
    pub fn new(
        store: Arc<SqliteStore>,
        cache_ttl_secs: i64,
        max_data_age_hours: i64,
        preferred_data_age_minutes: i64,
        default_search_radius_km: f64,
    ) -> Self {
        Self { store, cache_ttl_secs, max_data_age_hours, preferred_data_age_minutes, default_search_radius_km }
    }

    #[instrument(skip(self, measurements, weights))]
    pub async fn blend(
        &self,
        lat: f64,
        lon: f64,
        measurements: Vec<Measurement>,
        sources_attempted: Vec<SourceCode>,
        sources_failed: Vec<SourceCode>,
        weights: &[SourceWeight],
        use_cache: bool,
    ) -> BlendResult {
        let started = Utc::now();
        let coords = match Coordinates::new(lat, lon) {
            Ok(c) => c,
            Err(e) => return self.default_response(lat, lon, Some(e.to_string())),
        };
        let (lat_key, lon_key) = coords.cache_key();

        if use_cache {
            if let Ok(Some(cached)) = self.store.get_cached_blend(lat_key, lon_key).await {
                if cached.cached_until > Utc::now() {
                    let _ = self.store.increment_cache_hit(lat_key, lon_key).await;
                    self.log_fusion(lat, lon, cached.current_aqi, &cached.sources, &[], &[], started, true, None).await;
                    return self.result_from_cache(cached);
                }
            }
        }

        let fresh: Vec<Measurement> =
            measurements.into_iter().filter(|m| self.is_fresh(m.timestamp)).collect();

        if fresh.is_empty() {
            warn!(lat, lon, "no fresh air quality data for this location");
            self.log_fusion(lat, lon, None, &[], &sources_attempted, &sources_failed, started, false, None).await;
            return self.default_response(lat, lon, None);
        }

        let weight_by_source: HashMap<SourceCode, &SourceWeight> =
            weights.iter().filter(|w| w.is_active).map(|w| (w.source_code, w)).collect();

        let weighted: Vec<(Measurement, f64)> = fresh
            .into_iter()
            .map(|m| {
                let w = self.calculate_weight(&m, weight_by_source.get(&m.source).copied());
                (m, w)
            })
            .collect();

        let aqi = self.blend_aqi(&weighted);
        let pollutants = self.blend_pollutants(&weighted);
        let category = aqi
            .and_then(|a| category_for(a, "EPA"))
            .map(|c| c.category.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let health_advice = aqi.and_then(|a| category_for(a, "EPA")).map(|c| c.health_message.to_string()).unwrap_or_default();

        let mut sources: Vec<SourceCode> = weighted.iter().map(|(m, _)| m.source).collect();
        sources.sort_by_key(|s| s.as_str());
        sources.dedup();

        let last_updated = weighted.iter().map(|(m, _)| m.timestamp).max().unwrap_or(started);
        let source_details = self.source_details(&weighted);

        let blend = BlendedData {
            lat,
            lon,
            current_aqi: aqi,
            category: category.clone(),
            pollutants: pollutants.clone(),
            sources: sources.clone(),
            source_count: sources.len() as i32,
            last_updated,
            cached_until: Utc::now() + chrono::Duration::seconds(self.cache_ttl_secs),
            hit_count: 0,
        };
        if let Err(e) = self.store.save_blended_cache(lat_key, lon_key, &blend).await {
            warn!(error = %e, "failed to persist blended cache entry");
        }

        self.log_fusion(lat, lon, aqi, &sources, &sources_attempted, &sources_failed, started, false, None).await;

        BlendResult {
            lat,
            lon,
            aqi,
            category,
            pollutants,
            sources,
            source_details,
            last_updated,
            health_advice,
            cache_hit: false,
            error: None,
        }
    }

    fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        Utc::now() - timestamp < chrono::Duration::hours(self.max_data_age_hours)
    }

    /// Exponential decay: full weight inside `preferred_data_age_minutes`,
    /// decaying afterward with a half-life proportional to that window.
    fn time_decay_weight(&self, timestamp: DateTime<Utc>) -> f64 {
        let age_minutes = (Utc::now() - timestamp).num_seconds() as f64 / 60.0;
        if age_minutes <= self.preferred_data_age_minutes as f64 {
            return 1.0;
        }
        let decay_constant = self.preferred_data_age_minutes as f64 * 2.0;
        (-age_minutes / decay_constant).exp().max(0.1)
    }

    fn calculate_weight(&self, measurement: &Measurement, config: Option<&SourceWeight>) -> f64 {
        let (trust_weight, distance_factor, time_factor) = match config {
            Some(c) => (c.trust_weight, c.distance_weight_factor, c.time_decay_factor),
            None => (DEFAULT_TRUST_WEIGHT, 1.0, 1.0),
        };

        let time_weight = self.time_decay_weight(measurement.timestamp) * time_factor;

        let distance_weight = match measurement.distance_km {
            Some(d) if d > 0.0 => {
                (1.0 - (d / self.default_search_radius_km)).max(0.1) * distance_factor
            }
            _ => 1.0,
        };

        let quality_weight = measurement.quality_level.weight();
        let confidence_weight = measurement.confidence_score.map(|c| c / 100.0).unwrap_or(1.0);

        trust_weight * time_weight * distance_weight * quality_weight * confidence_weight
    }

    fn blend_aqi(&self, weighted: &[(Measurement, f64)]) -> Option<i32> {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (m, w) in weighted {
            if let Some(aqi) = m.aqi {
                weighted_sum += aqi as f64 * w;
                total_weight += w;
            }
        }
        if total_weight == 0.0 {
            return None;
        }
        Some((weighted_sum / total_weight).round() as i32)
    }

    fn blend_pollutants(&self, weighted: &[(Measurement, f64)]) -> Pollutants {
        let mut sums: HashMap<String, (f64, f64)> = HashMap::new();
        for (m, w) in weighted {
            for (pollutant, value) in &m.pollutants {
                let entry = sums.entry(pollutant.clone()).or_insert((0.0, 0.0));
                entry.0 += value * w;
                entry.1 += w;
            }
        }
        sums.into_iter()
            .filter(|(_, (_, total_weight))| *total_weight > 0.0)
            .map(|(pollutant, (sum, total_weight))| (pollutant, ((sum / total_weight) * 100.0).round() / 100.0))
            .collect()
    }

    fn source_details(&self, weighted: &[(Measurement, f64)]) -> Vec<SourceDetail> {
        let mut details: Vec<SourceDetail> = weighted
            .iter()
            .map(|(m, w)| SourceDetail {
                source: m.source,
                weight: (w * 1000.0).round() / 1000.0,
                aqi: m.aqi,
                distance_km: m.distance_km,
                timestamp: m.timestamp,
                quality_level: m.quality_level,
                station_name: m.station_name.clone(),
            })
            .collect();
        details.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        details
    }

    fn result_from_cache(&self, cached: BlendedData) -> BlendResult {
        let health_advice =
            cached.current_aqi.and_then(|a| category_for(a, "EPA")).map(|c| c.health_message.to_string()).unwrap_or_default();
        BlendResult {
            lat: cached.lat,
            lon: cached.lon,
            aqi: cached.current_aqi,
            category: cached.category,
            pollutants: cached.pollutants,
            sources: cached.sources,
            source_details: Vec::new(),
            last_updated: cached.last_updated,
            health_advice,
            cache_hit: true,
            error: None,
        }
    }

    fn default_response(&self, lat: f64, lon: f64, error: Option<String>) -> BlendResult {
        BlendResult {
            lat,
            lon,
            aqi: None,
            category: "Unavailable".to_string(),
            pollutants: Pollutants::new(),
            sources: Vec::new(),
            source_details: Vec::new(),
            last_updated: Utc::now(),
            health_advice: String::new(),
            cache_hit: false,
            error: Some(error.unwrap_or_else(|| "No fresh air quality data available for this location".to_string())),
        }
    }

    async fn log_fusion(
        &self,
        lat: f64,
        lon: f64,
        result_aqi: Option<i32>,
        sources_used: &[SourceCode],
        sources_attempted: &[SourceCode],
        sources_failed: &[SourceCode],
        started: DateTime<Utc>,
        cache_hit: bool,
        error_message: Option<String>,
    ) {
        let entry = FusionLogEntry {
            query_lat: lat,
            query_lon: lon,
            result_aqi,
            sources_used: sources_used.to_vec(),
            sources_attempted: sources_attempted.to_vec(),
            sources_failed: sources_failed.to_vec(),
            fusion_method: "weighted_average".to_string(),
            weight_details: serde_json::Value::Null,
            execution_time_ms: Some((Utc::now() - started).num_milliseconds()),
            cache_hit,
            has_error: error_message.is_some(),
            error_message: error_message.unwrap_or_default(),
            created_at: started,
        };
        if let Err(e) = self.store.save_fusion_log(&entry).await {
            warn!(error = %e, "failed to persist fusion log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> FusionEngine {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        FusionEngine::new(Arc::new(store), 600, 3, 30, 25.0)
    }

    fn measurement(source: SourceCode, aqi: i32, age_minutes: i64, distance_km: Option<f64>) -> Measurement {
        Measurement {
            source,
            coordinates: Coordinates::new(45.5, -122.6).unwrap(),
            timestamp: Utc::now() - chrono::Duration::minutes(age_minutes),
            aqi: Some(aqi),
            pollutants: Pollutants::new(),
            quality_level: QualityLevel::Verified,
            distance_km,
            confidence_score: Some(100.0),
            station_id: None,
            station_name: None,
        }
    }

    #[tokio::test]
    async fn blends_weighted_average_of_two_sources() {
        let engine = engine().await;
        let measurements = vec![
            measurement(SourceCode::EpaAirNow, 40, 5, Some(0.0)),
            measurement(SourceCode::PurpleAir, 60, 5, Some(0.0)),
        ];
        let weights = vec![
            SourceWeight {
                source_code: SourceCode::EpaAirNow,
                region_code: "US".to_string(),
                trust_weight: 1.0,
                priority_rank: 1,
                distance_weight_factor: 1.0,
                time_decay_factor: 1.0,
                is_active: true,
                is_primary: true,
            },
            SourceWeight {
                source_code: SourceCode::PurpleAir,
                region_code: "US".to_string(),
                trust_weight: 1.0,
                priority_rank: 2,
                distance_weight_factor: 1.0,
                time_decay_factor: 1.0,
                is_active: true,
                is_primary: false,
            },
        ];
        let result = engine.blend(45.5, -122.6, measurements, vec![], vec![], &weights, false).await;
        assert!(result.aqi.is_some());
        // Equal weights: expect the midpoint.
        assert_eq!(result.aqi.unwrap(), 50);
    }

    #[tokio::test]
    async fn stale_data_produces_unavailable_response() {
        let engine = engine().await;
        let measurements = vec![measurement(SourceCode::EpaAirNow, 40, 600, Some(0.0))];
        let result = engine.blend(45.5, -122.6, measurements, vec![], vec![], &[], false).await;
        assert!(result.aqi.is_none());
        assert_eq!(result.category, "Unavailable");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn time_decay_weight_is_full_within_preferred_window() {
        let engine = engine().await;
        assert_eq!(engine.time_decay_weight(Utc::now()), 1.0);
    }
}
