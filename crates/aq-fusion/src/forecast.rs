use aq_core::types::{category_for, Coordinates, Pollutants, SourceCode};
use aq_db::{AggregatedForecastPoint, SqliteStore};
use aq_ingest::ForecastPoint;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, warn};

/// One hour's aggregated forecast across every source that reported it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatedHour {
    pub timestamp: DateTime<Utc>,
    pub aqi: i32,
    pub category: String,
    pub pollutants: Pollutants,
    pub sources: Vec<SourceCode>,
}

/// Groups raw forecast points from multiple adapters into hourly buckets
/// and averages each bucket, since adapters don't share a forecast cadence.
pub struct ForecastAggregator {
    store: Arc<SqliteStore>,
    cache_ttl_secs: i64,
}

impl ForecastAggregator {
    pub fn new(store: Arc<SqliteStore>, cache_ttl_secs: i64) -> Self {
        Self { store, cache_ttl_secs }
    }

    #[instrument(skip(self, points))]
    pub async fn aggregate(&self, lat: f64, lon: f64, points: Vec<ForecastPoint>, use_cache: bool) -> Vec<AggregatedHour> {
        if points.is_empty() {
            return Vec::new();
        }

        let Ok(coords) = Coordinates::new(lat, lon) else { return Vec::new() };
        let (lat_key, lon_key) = coords.cache_key();

        if use_cache {
            if let Ok(cached) = self.store.get_cached_forecast(lat_key, lon_key).await {
                let fresh: Vec<AggregatedForecastPoint> =
                    cached.into_iter().filter(|p| p.cached_until > Utc::now() && p.hour_bucket >= Self::truncate_to_hour(Utc::now())).collect();
                if !fresh.is_empty() {
                    return fresh.into_iter().filter_map(Self::hour_from_cached).collect();
                }
            }
        }

        let future_points: Vec<ForecastPoint> = points.into_iter().filter(|p| p.timestamp >= Utc::now()).collect();
        let grouped = self.group_by_hour(future_points);

        let mut aggregated: Vec<AggregatedHour> = grouped
            .into_iter()
            .filter_map(|(hour, group)| self.aggregate_hour(hour, group))
            .collect();
        aggregated.sort_by_key(|h| h.timestamp);

        for hour in &aggregated {
            let point = AggregatedForecastPoint {
                lat,
                lon,
                hour_bucket: hour.timestamp,
                aqi: Some(hour.aqi),
                pollutants: hour.pollutants.clone(),
                sources: hour.sources.clone(),
                cached_until: Utc::now() + Duration::seconds(self.cache_ttl_secs),
            };
            if let Err(e) = self.store.save_forecast_point(lat_key, lon_key, &point).await {
                warn!(error = %e, "failed to persist forecast point");
            }
        }

        aggregated
    }

    fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), ts.hour(), 0, 0).single().unwrap_or(ts)
    }

    fn group_by_hour(&self, points: Vec<ForecastPoint>) -> BTreeMap<DateTime<Utc>, Vec<ForecastPoint>> {
        let mut grouped: BTreeMap<DateTime<Utc>, Vec<ForecastPoint>> = BTreeMap::new();
        for point in points {
            let hour = Self::truncate_to_hour(point.timestamp);
            grouped.entry(hour).or_default().push(point);
        }
        grouped
    }

    fn aggregate_hour(&self, hour: DateTime<Utc>, forecasts: Vec<ForecastPoint>) -> Option<AggregatedHour> {
        let aqi_values: Vec<i32> = forecasts.iter().filter_map(|f| f.aqi).collect();
        if aqi_values.is_empty() {
            return None;
        }
        let avg_aqi = (aqi_values.iter().sum::<i32>() as f64 / aqi_values.len() as f64).round() as i32;

        let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
        for forecast in &forecasts {
            for (pollutant, value) in &forecast.pollutants {
                let entry = sums.entry(pollutant.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        let pollutants: Pollutants =
            sums.into_iter().map(|(k, (sum, count))| (k, ((sum / count as f64) * 100.0).round() / 100.0)).collect();

        let mut sources: Vec<SourceCode> = forecasts.iter().map(|f| f.source).collect();
        sources.sort_by_key(|s| s.as_str());
        sources.dedup();

        let category = category_for(avg_aqi, "EPA").map(|c| c.category.to_string()).unwrap_or_else(|| "Unknown".to_string());

        Some(AggregatedHour { timestamp: hour, aqi: avg_aqi, category, pollutants, sources })
    }

    fn hour_from_cached(point: AggregatedForecastPoint) -> Option<AggregatedHour> {
        let aqi = point.aqi?;
        let category = category_for(aqi, "EPA").map(|c| c.category.to_string()).unwrap_or_else(|| "Unknown".to_string());
        Some(AggregatedHour { timestamp: point.hour_bucket, aqi, category, pollutants: point.pollutants, sources: point.sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(source: SourceCode, hours_ahead: i64, aqi: i32) -> ForecastPoint {
        ForecastPoint {
            timestamp: Utc::now() + Duration::hours(hours_ahead) + Duration::minutes(5),
            aqi: Some(aqi),
            pollutants: Pollutants::new(),
            source,
        }
    }

    #[tokio::test]
    async fn averages_multiple_sources_in_the_same_hour_bucket() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        let aggregator = ForecastAggregator::new(Arc::new(store), 600);

        let points = vec![point(SourceCode::EpaAirNow, 1, 40), point(SourceCode::OpenWeatherMap, 1, 60)];
        let result = aggregator.aggregate(45.5, -122.6, points, false).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].aqi, 50);
        assert_eq!(result[0].sources.len(), 2);
    }

    #[tokio::test]
    async fn empty_input_returns_empty_output() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        let aggregator = ForecastAggregator::new(Arc::new(store), 600);
        let result = aggregator.aggregate(45.5, -122.6, vec![], false).await;
        assert!(result.is_empty());
    }
}
