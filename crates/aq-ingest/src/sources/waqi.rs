use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::AirQualityAdapter;
use aq_core::config::SourceSettings;
use aq_core::distance::haversine_km;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::instrument;

const BASE_URL: &str = "https://api.waqi.info";

/// World Air Quality Index: aggregates many national networks behind one
/// API. Reports a single nearest-station reading per query, with `"-"` as
/// the sentinel for "no AQI available".
pub struct WaqiAdapter {
    client: HttpAdapterClient,
}

impl WaqiAdapter {
    pub fn new(settings: &SourceSettings) -> Self {
        Self { client: HttpAdapterClient::new("WAQI", BASE_URL, AuthStrategy::QueryParam("token"), settings) }
    }
}

const POLLUTANT_KEYS: [&str; 6] = ["pm25", "pm10", "o3", "no2", "so2", "co"];

fn bounding_box(lat: f64, lon: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let degree_offset = radius_km / 111.0;
    (lat - degree_offset, lon - degree_offset, lat + degree_offset, lon + degree_offset)
}

fn normalize_map_stations(body: Value, query_lat: f64, query_lon: f64) -> Vec<Measurement> {
    let Some(stations) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut measurements: Vec<(f64, Measurement)> = stations
        .iter()
        .filter_map(|station| {
            let lat = station.get("lat").and_then(Value::as_f64)?;
            let lon = station.get("lon").and_then(Value::as_f64)?;
            let aqi = match station.get("aqi") {
                Some(Value::String(s)) if s == "-" => return None,
                Some(v) => v.as_i64().map(|n| n as i32).or_else(|| v.as_str().and_then(|s| s.parse().ok()))?,
                None => return None,
            };
            let distance = haversine_km(query_lat, query_lon, lat, lon);
            let station_name = station.get("station").and_then(|s| s.get("name")).and_then(Value::as_str).map(str::to_string);
            let station_id = station.get("uid").map(|v| v.to_string());
            let coordinates = Coordinates::new(lat, lon).ok()?;

            Some((
                distance,
                Measurement {
                    source: SourceCode::Waqi,
                    coordinates,
                    timestamp: Utc::now(),
                    aqi: Some(aqi),
                    pollutants: Pollutants::new(),
                    quality_level: QualityLevel::Verified,
                    distance_km: Some((distance * 100.0).round() / 100.0),
                    confidence_score: Some(80.0),
                    station_id,
                    station_name,
                },
            ))
        })
        .collect();

    measurements.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    measurements.into_iter().map(|(_, m)| m).collect()
}

fn normalize(body: Value, query_lat: f64, query_lon: f64) -> Option<Measurement> {
    if body.get("status").and_then(Value::as_str) != Some("ok") {
        return None;
    }
    let data = body.get("data")?;

    let station_name = data.get("city").and_then(|c| c.get("name")).and_then(Value::as_str).map(str::to_string);
    let geo = data.get("city").and_then(|c| c.get("geo")).and_then(Value::as_array);

    let (lat, lon, distance_km) = match geo {
        Some(coords) if coords.len() == 2 => {
            let lat = coords[0].as_f64().unwrap_or(query_lat);
            let lon = coords[1].as_f64().unwrap_or(query_lon);
            let distance = haversine_km(query_lat, query_lon, lat, lon);
            (lat, lon, Some((distance * 100.0).round() / 100.0))
        }
        _ => (query_lat, query_lon, Some(0.0)),
    };

    let aqi = match data.get("aqi") {
        Some(Value::String(s)) if s == "-" => None,
        Some(v) => v.as_i64().map(|n| n as i32).or_else(|| v.as_str().and_then(|s| s.parse().ok())),
        None => None,
    };

    let timestamp: DateTime<Utc> = data
        .get("time")
        .and_then(|t| t.get("iso"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut pollutants = Pollutants::new();
    if let Some(iaqi) = data.get("iaqi") {
        for key in POLLUTANT_KEYS {
            if let Some(v) = iaqi.get(key).and_then(|p| p.get("v")).and_then(Value::as_f64) {
                pollutants.insert(key.to_string(), v);
            }
        }
    }

    let coordinates = Coordinates::new(lat, lon).ok()?;
    let station_id = data.get("idx").map(|v| v.to_string());

    Some(Measurement {
        source: SourceCode::Waqi,
        coordinates,
        timestamp,
        aqi,
        pollutants,
        quality_level: QualityLevel::Verified,
        distance_km,
        confidence_score: Some(85.0),
        station_id,
        station_name,
    })
}

#[async_trait]
impl AirQualityAdapter for WaqiAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::Waqi
    }

    #[instrument(skip(self), fields(source = "WAQI"))]
    async fn fetch_current(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        let endpoint = format!("feed/geo:{lat};{lon}/");
        let (body, _log) = self.client.get_json(&endpoint, Vec::new()).await?;
        let mut measurements: Vec<Measurement> = normalize(body, lat, lon).into_iter().collect();

        let (min_lat, min_lon, max_lat, max_lon) = bounding_box(lat, lon, radius_km);
        let bounds_endpoint = format!("map/bounds/?latlng={min_lat},{min_lon},{max_lat},{max_lon}");
        if let Ok((bounds_body, _log)) = self.client.get_json(&bounds_endpoint, Vec::new()).await {
            measurements.extend(normalize_map_stations(bounds_body, lat, lon));
        }

        Ok(measurements)
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dash_aqi_sentinel_becomes_none() {
        let body = json!({
            "status": "ok",
            "data": {
                "aqi": "-",
                "city": {"name": "Test", "geo": [45.0, -122.0]},
                "time": {"iso": "2026-07-01T12:00:00+00:00"},
                "iaqi": {},
            }
        });
        let measurement = normalize(body, 45.0, -122.0).unwrap();
        assert_eq!(measurement.aqi, None);
    }

    #[test]
    fn numeric_aqi_parses() {
        let body = json!({
            "status": "ok",
            "data": {
                "aqi": 42,
                "city": {"name": "Test", "geo": [45.0, -122.0]},
                "time": {"iso": "2026-07-01T12:00:00+00:00"},
                "iaqi": {"pm25": {"v": 10.5}},
            }
        });
        let measurement = normalize(body, 45.0, -122.0).unwrap();
        assert_eq!(measurement.aqi, Some(42));
        assert_eq!(measurement.pollutants.get("pm25"), Some(&10.5));
    }

    #[test]
    fn non_ok_status_yields_nothing() {
        let body = json!({"status": "error"});
        assert!(normalize(body, 0.0, 0.0).is_none());
    }

    #[test]
    fn map_bounds_stations_sorted_by_distance_and_dash_is_dropped() {
        let body = json!({
            "status": "ok",
            "data": [
                {"lat": 45.2, "lon": -122.3, "aqi": "30", "uid": 1, "station": {"name": "Far"}},
                {"lat": 45.01, "lon": -122.01, "aqi": "20", "uid": 2, "station": {"name": "Near"}},
                {"lat": 45.1, "lon": -122.1, "aqi": "-", "uid": 3, "station": {"name": "NoData"}},
            ]
        });
        let measurements = normalize_map_stations(body, 45.0, -122.0);
        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].station_name, Some("Near".to_string()));
        assert_eq!(measurements[1].station_name, Some("Far".to_string()));
    }

    #[test]
    fn bounding_box_uses_111km_per_degree() {
        let (min_lat, min_lon, max_lat, max_lon) = bounding_box(45.0, -122.0, 22.2);
        assert!((min_lat - 44.8).abs() < 0.01);
        assert!((max_lat - 45.2).abs() < 0.01);
        assert!((min_lon - (-122.2)).abs() < 0.01);
        assert!((max_lon - (-121.8)).abs() < 0.01);
    }
}
