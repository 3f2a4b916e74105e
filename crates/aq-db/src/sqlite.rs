use aq_core::health::AdapterHealth;
use aq_core::types::{Pollutants, SourceCode};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::models::{
    AggregatedForecastPoint, BlendedData, FusionLogEntry, RawResponseLogRecord, RegionConfig, SourceWeight,
};

/// SQLite-backed persistence for the fusion cache, source weight tables,
/// adapter health, and audit logs. A single file is enough at this scale;
/// there is no warm/cold tiering here.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

fn sources_to_json(sources: &[SourceCode]) -> String {
    serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string())
}

fn sources_from_json(raw: &str) -> Vec<SourceCode> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn pollutants_to_json(pollutants: &Pollutants) -> String {
    serde_json::to_string(pollutants).unwrap_or_else(|_| "{}".to_string())
}

fn pollutants_from_json(raw: &str) -> Pollutants {
    serde_json::from_str(raw).unwrap_or_default()
}

impl SqliteStore {
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&format!("sqlite:{database_path}?mode=rwc"))
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        info!(path = %database_path, "sqlite store initialized");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("sqlite migrations completed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_cached_blend(&self, lat_key: i64, lon_key: i64) -> anyhow::Result<Option<BlendedData>> {
        let row = sqlx::query(
            r#"
            SELECT lat_key, lon_key, current_aqi, category, pollutants, sources,
                   source_count, last_updated, cached_until, hit_count
            FROM blended_cache
            WHERE lat_key = ? AND lon_key = ?
            "#,
        )
        .bind(lat_key)
        .bind(lon_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let lat_key: i64 = row.get("lat_key");
        let lon_key: i64 = row.get("lon_key");
        let pollutants_raw: String = row.get("pollutants");
        let sources_raw: String = row.get("sources");
        let last_updated: String = row.get("last_updated");
        let cached_until: String = row.get("cached_until");

        Ok(Some(BlendedData {
            lat: lat_key as f64 / 1000.0,
            lon: lon_key as f64 / 1000.0,
            current_aqi: row.get("current_aqi"),
            category: row.get("category"),
            pollutants: pollutants_from_json(&pollutants_raw),
            sources: sources_from_json(&sources_raw),
            source_count: row.get("source_count"),
            last_updated: DateTime::parse_from_rfc3339(&last_updated)?.with_timezone(&Utc),
            cached_until: DateTime::parse_from_rfc3339(&cached_until)?.with_timezone(&Utc),
            hit_count: row.get("hit_count"),
        }))
    }

    #[instrument(skip(self, blend))]
    pub async fn save_blended_cache(&self, lat_key: i64, lon_key: i64, blend: &BlendedData) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blended_cache (
                lat_key, lon_key, current_aqi, category, pollutants, sources,
                source_count, last_updated, cached_until, hit_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(lat_key, lon_key) DO UPDATE SET
                current_aqi = excluded.current_aqi,
                category = excluded.category,
                pollutants = excluded.pollutants,
                sources = excluded.sources,
                source_count = excluded.source_count,
                last_updated = excluded.last_updated,
                cached_until = excluded.cached_until
            "#,
        )
        .bind(lat_key)
        .bind(lon_key)
        .bind(blend.current_aqi)
        .bind(&blend.category)
        .bind(pollutants_to_json(&blend.pollutants))
        .bind(sources_to_json(&blend.sources))
        .bind(blend.source_count)
        .bind(blend.last_updated.to_rfc3339())
        .bind(blend.cached_until.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn increment_cache_hit(&self, lat_key: i64, lon_key: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE blended_cache SET hit_count = hit_count + 1 WHERE lat_key = ? AND lon_key = ?")
            .bind(lat_key)
            .bind(lon_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_source_weights(&self, region_code: &str) -> anyhow::Result<Vec<SourceWeight>> {
        let rows = sqlx::query(
            r#"
            SELECT source_code, region_code, trust_weight, priority_rank,
                   distance_weight_factor, time_decay_factor, is_active, is_primary
            FROM source_weights
            WHERE region_code = ?
            ORDER BY priority_rank ASC
            "#,
        )
        .bind(region_code)
        .fetch_all(&self.pool)
        .await?;

        let mut weights = Vec::with_capacity(rows.len());
        for row in rows {
            let source_code_raw: String = row.get("source_code");
            let Some(source_code) = SourceCode::from_str_opt(&source_code_raw) else {
                warn!(source = %source_code_raw, "unknown source code in source_weights row, skipping");
                continue;
            };
            weights.push(SourceWeight {
                source_code,
                region_code: row.get("region_code"),
                trust_weight: row.get("trust_weight"),
                priority_rank: row.get("priority_rank"),
                distance_weight_factor: row.get("distance_weight_factor"),
                time_decay_factor: row.get("time_decay_factor"),
                is_active: row.get::<i64, _>("is_active") != 0,
                is_primary: row.get::<i64, _>("is_primary") != 0,
            });
        }
        Ok(weights)
    }

    pub async fn upsert_source_weight(&self, weight: &SourceWeight) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_weights (
                source_code, region_code, trust_weight, priority_rank,
                distance_weight_factor, time_decay_factor, is_active, is_primary
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_code, region_code) DO UPDATE SET
                trust_weight = excluded.trust_weight,
                priority_rank = excluded.priority_rank,
                distance_weight_factor = excluded.distance_weight_factor,
                time_decay_factor = excluded.time_decay_factor,
                is_active = excluded.is_active,
                is_primary = excluded.is_primary
            "#,
        )
        .bind(weight.source_code.as_str())
        .bind(&weight.region_code)
        .bind(weight.trust_weight)
        .bind(weight.priority_rank)
        .bind(weight.distance_weight_factor)
        .bind(weight.time_decay_factor)
        .bind(weight.is_active as i64)
        .bind(weight.is_primary as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, entry))]
    pub async fn save_fusion_log(&self, entry: &FusionLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fusion_log (
                query_lat, query_lon, result_aqi, sources_used, sources_attempted,
                sources_failed, fusion_method, weight_details, execution_time_ms,
                cache_hit, has_error, error_message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.query_lat)
        .bind(entry.query_lon)
        .bind(entry.result_aqi)
        .bind(sources_to_json(&entry.sources_used))
        .bind(sources_to_json(&entry.sources_attempted))
        .bind(sources_to_json(&entry.sources_failed))
        .bind(&entry.fusion_method)
        .bind(entry.weight_details.to_string())
        .bind(entry.execution_time_ms)
        .bind(entry.cache_hit as i64)
        .bind(entry.has_error as i64)
        .bind(&entry.error_message)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_adapter_health(&self, source: SourceCode) -> anyhow::Result<Option<AdapterHealth>> {
        let row = sqlx::query(
            r#"
            SELECT source, is_active, last_success_at, last_failure_at,
                   consecutive_failures, total_requests, total_failures, status_message
            FROM adapter_status
            WHERE source = ?
            "#,
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let last_success_at: Option<String> = row.get("last_success_at");
        let last_failure_at: Option<String> = row.get("last_failure_at");

        Ok(Some(AdapterHealth {
            source: row.get("source"),
            is_active: row.get::<i64, _>("is_active") != 0,
            last_success_at: last_success_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            last_failure_at: last_failure_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            consecutive_failures: row.get::<i64, _>("consecutive_failures") as u32,
            total_requests: row.get::<i64, _>("total_requests") as u64,
            total_failures: row.get::<i64, _>("total_failures") as u64,
            status_message: row.get("status_message"),
        }))
    }

    pub async fn upsert_adapter_health(&self, health: &AdapterHealth) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO adapter_status (
                source, is_active, last_success_at, last_failure_at,
                consecutive_failures, total_requests, total_failures, status_message, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                is_active = excluded.is_active,
                last_success_at = excluded.last_success_at,
                last_failure_at = excluded.last_failure_at,
                consecutive_failures = excluded.consecutive_failures,
                total_requests = excluded.total_requests,
                total_failures = excluded.total_failures,
                status_message = excluded.status_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&health.source)
        .bind(health.is_active as i64)
        .bind(health.last_success_at.map(|d| d.to_rfc3339()))
        .bind(health.last_failure_at.map(|d| d.to_rfc3339()))
        .bind(health.consecutive_failures as i64)
        .bind(health.total_requests as i64)
        .bind(health.total_failures as i64)
        .bind(&health.status_message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_raw_response_log(&self, log: &RawResponseLogRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_response_log (
                source, endpoint, params, response_data, status_code,
                response_time_ms, is_error, error_message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.source)
        .bind(&log.endpoint)
        .bind(log.params.to_string())
        .bind(log.response_data.to_string())
        .bind(log.status_code)
        .bind(log.response_time_ms)
        .bind(log.is_error as i64)
        .bind(&log.error_message)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_region_config(&self, region_code: &str) -> anyhow::Result<Option<RegionConfig>> {
        let row = sqlx::query("SELECT region_code, aqi_scale, source_priority FROM region_config WHERE region_code = ?")
            .bind(region_code)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let priority_raw: String = row.get("source_priority");

        Ok(Some(RegionConfig {
            region_code: row.get("region_code"),
            aqi_scale: row.get("aqi_scale"),
            source_priority: sources_from_json(&priority_raw),
        }))
    }

    pub async fn upsert_region_config(&self, config: &RegionConfig) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO region_config (region_code, aqi_scale, source_priority)
            VALUES (?, ?, ?)
            ON CONFLICT(region_code) DO UPDATE SET
                aqi_scale = excluded.aqi_scale,
                source_priority = excluded.source_priority
            "#,
        )
        .bind(&config.region_code)
        .bind(&config.aqi_scale)
        .bind(sources_to_json(&config.source_priority))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_cached_forecast(
        &self,
        lat_key: i64,
        lon_key: i64,
    ) -> anyhow::Result<Vec<AggregatedForecastPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT lat_key, lon_key, hour_bucket, aqi, pollutants, sources, cached_until
            FROM aggregated_forecast
            WHERE lat_key = ? AND lon_key = ?
            ORDER BY hour_bucket ASC
            "#,
        )
        .bind(lat_key)
        .bind(lon_key)
        .fetch_all(&self.pool)
        .await?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let lat_key: i64 = row.get("lat_key");
            let lon_key: i64 = row.get("lon_key");
            let hour_bucket: String = row.get("hour_bucket");
            let pollutants_raw: String = row.get("pollutants");
            let sources_raw: String = row.get("sources");
            let cached_until: String = row.get("cached_until");

            points.push(AggregatedForecastPoint {
                lat: lat_key as f64 / 1000.0,
                lon: lon_key as f64 / 1000.0,
                hour_bucket: DateTime::parse_from_rfc3339(&hour_bucket)?.with_timezone(&Utc),
                aqi: row.get("aqi"),
                pollutants: pollutants_from_json(&pollutants_raw),
                sources: sources_from_json(&sources_raw),
                cached_until: DateTime::parse_from_rfc3339(&cached_until)?.with_timezone(&Utc),
            });
        }
        Ok(points)
    }

    pub async fn save_forecast_point(&self, lat_key: i64, lon_key: i64, point: &AggregatedForecastPoint) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aggregated_forecast (lat_key, lon_key, hour_bucket, aqi, pollutants, sources, cached_until)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(lat_key, lon_key, hour_bucket) DO UPDATE SET
                aqi = excluded.aqi,
                pollutants = excluded.pollutants,
                sources = excluded.sources,
                cached_until = excluded.cached_until
            "#,
        )
        .bind(lat_key)
        .bind(lon_key)
        .bind(point.hour_bucket.to_rfc3339())
        .bind(point.aqi)
        .bind(pollutants_to_json(&point.pollutants))
        .bind(sources_to_json(&point.sources))
        .bind(point.cached_until.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::types::SourceCode;

    #[tokio::test]
    async fn round_trips_blended_cache_entry() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();

        let blend = BlendedData {
            lat: 45.523,
            lon: -122.676,
            current_aqi: Some(42),
            category: "Good".to_string(),
            pollutants: Pollutants::new(),
            sources: vec![SourceCode::EpaAirNow, SourceCode::PurpleAir],
            source_count: 2,
            last_updated: Utc::now(),
            cached_until: Utc::now() + chrono::Duration::minutes(10),
            hit_count: 0,
        };

        store.save_blended_cache(45523, -122676, &blend).await.unwrap();
        let fetched = store.get_cached_blend(45523, -122676).await.unwrap().unwrap();
        assert_eq!(fetched.current_aqi, Some(42));
        assert_eq!(fetched.sources.len(), 2);
    }

    #[tokio::test]
    async fn upserts_adapter_health_and_reads_it_back() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();

        let mut health = AdapterHealth::new("WAQI");
        health.record_failure(Utc::now(), "timeout");
        store.upsert_adapter_health(&health).await.unwrap();

        let fetched = store.get_adapter_health(SourceCode::Waqi).await.unwrap().unwrap();
        assert_eq!(fetched.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn source_weights_filter_by_region_and_sort_by_priority() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();

        store
            .upsert_source_weight(&SourceWeight {
                source_code: SourceCode::PurpleAir,
                region_code: "US".to_string(),
                trust_weight: 0.85,
                priority_rank: 2,
                distance_weight_factor: 1.0,
                time_decay_factor: 1.0,
                is_active: true,
                is_primary: false,
            })
            .await
            .unwrap();
        store
            .upsert_source_weight(&SourceWeight {
                source_code: SourceCode::EpaAirNow,
                region_code: "US".to_string(),
                trust_weight: 1.0,
                priority_rank: 1,
                distance_weight_factor: 1.0,
                time_decay_factor: 1.0,
                is_active: true,
                is_primary: true,
            })
            .await
            .unwrap();

        let weights = store.get_source_weights("US").await.unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].source_code, SourceCode::EpaAirNow);
    }
}
