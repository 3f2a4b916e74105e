use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::AirQualityAdapter;
use aq_core::config::SourceSettings;
use aq_core::distance::haversine_km;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::instrument;

const BASE_URL: &str = "https://api.openaq.org/v3";

/// OpenAQ: an aggregator of government and research-grade monitors
/// contributed by national agencies worldwide. Unlike the single-reading
/// providers, a single `locations` query can return several nearby
/// stations, each reporting its own subset of pollutants.
pub struct OpenAqAdapter {
    client: HttpAdapterClient,
}

impl OpenAqAdapter {
    pub fn new(settings: &SourceSettings) -> Self {
        Self { client: HttpAdapterClient::new("OPENAQ", BASE_URL, AuthStrategy::Header("X-API-Key"), settings) }
    }
}

fn pollutant_key(parameter: &str) -> Option<&'static str> {
    match parameter.to_lowercase().as_str() {
        "pm25" | "pm2.5" => Some("pm25"),
        "pm10" => Some("pm10"),
        "o3" => Some("o3"),
        "no2" => Some("no2"),
        "so2" => Some("so2"),
        "co" => Some("co"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    results: Vec<LocationResult>,
}

#[derive(Debug, Deserialize)]
struct LocationResult {
    id: i64,
    name: Option<String>,
    coordinates: Option<LocationCoordinates>,
    sensors: Vec<SensorResult>,
}

#[derive(Debug, Deserialize)]
struct LocationCoordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct SensorResult {
    parameter: SensorParameter,
    latest: Option<SensorLatest>,
}

#[derive(Debug, Deserialize)]
struct SensorParameter {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SensorLatest {
    value: f64,
    datetime: Option<SensorDatetime>,
}

#[derive(Debug, Deserialize)]
struct SensorDatetime {
    utc: String,
}

/// OpenAQ reports raw pollutant concentrations rather than a precomputed
/// AQI, so a station's PM2.5 reading doubles as the headline value when
/// nothing else is available; the fusion stage applies its own AQI math.
fn normalize(response: LocationsResponse, query_lat: f64, query_lon: f64) -> Vec<Measurement> {
    response
        .results
        .into_iter()
        .filter_map(|loc| {
            let coords = loc.coordinates?;
            let coordinates = Coordinates::new(coords.latitude, coords.longitude).ok()?;
            let distance_km = (haversine_km(query_lat, query_lon, coords.latitude, coords.longitude) * 100.0).round() / 100.0;

            let mut pollutants: Pollutants = BTreeMap::new();
            let mut latest_timestamp: Option<DateTime<Utc>> = None;

            for sensor in &loc.sensors {
                let Some(key) = pollutant_key(&sensor.parameter.name) else { continue };
                let Some(latest) = &sensor.latest else { continue };
                pollutants.insert(key.to_string(), latest.value);

                if let Some(dt) = latest.datetime.as_ref().and_then(|d| DateTime::parse_from_rfc3339(&d.utc).ok()) {
                    let dt = dt.with_timezone(&Utc);
                    latest_timestamp = Some(latest_timestamp.map_or(dt, |prev| prev.max(dt)));
                }
            }

            if pollutants.is_empty() {
                return None;
            }

            Some(Measurement {
                source: SourceCode::OpenAq,
                coordinates,
                timestamp: latest_timestamp.unwrap_or_else(Utc::now),
                aqi: None,
                pollutants,
                quality_level: QualityLevel::Verified,
                distance_km: Some(distance_km),
                confidence_score: Some(90.0),
                station_id: Some(loc.id.to_string()),
                station_name: loc.name,
            })
        })
        .collect()
}

#[async_trait]
impl AirQualityAdapter for OpenAqAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::OpenAq
    }

    #[instrument(skip(self), fields(source = "OPENAQ"))]
    async fn fetch_current(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        let radius_m = (radius_km * 1000.0).round() as i64;
        let params = vec![
            ("coordinates".to_string(), format!("{lat},{lon}")),
            ("radius".to_string(), radius_m.to_string()),
            ("limit".to_string(), "25".to_string()),
        ];

        let (body, _log) = self.client.get_json("locations", params).await?;
        let response: LocationsResponse = serde_json::from_value(body).map_err(|e| AdapterError::Parse(e.to_string()))?;
        Ok(normalize(response, lat, lon))
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pollutant_name_aliases_normalize() {
        assert_eq!(pollutant_key("pm2.5"), Some("pm25"));
        assert_eq!(pollutant_key("PM25"), Some("pm25"));
        assert_eq!(pollutant_key("relativehumidity"), None);
    }

    #[test]
    fn station_without_recognized_pollutants_is_dropped() {
        let response = LocationsResponse {
            results: vec![LocationResult {
                id: 1,
                name: Some("Test".to_string()),
                coordinates: Some(LocationCoordinates { latitude: 45.5, longitude: -122.6 }),
                sensors: vec![SensorResult {
                    parameter: SensorParameter { name: "relativehumidity".to_string() },
                    latest: Some(SensorLatest { value: 55.0, datetime: None }),
                }],
            }],
        };
        assert!(normalize(response, 45.5, -122.6).is_empty());
    }

    #[test]
    fn station_with_pollutants_keeps_max_latest_timestamp() {
        let response = LocationsResponse {
            results: vec![LocationResult {
                id: 2,
                name: Some("Test".to_string()),
                coordinates: Some(LocationCoordinates { latitude: 45.5, longitude: -122.6 }),
                sensors: vec![
                    SensorResult {
                        parameter: SensorParameter { name: "pm25".to_string() },
                        latest: Some(SensorLatest {
                            value: 8.0,
                            datetime: Some(SensorDatetime { utc: "2026-07-01T10:00:00Z".to_string() }),
                        }),
                    },
                    SensorResult {
                        parameter: SensorParameter { name: "o3".to_string() },
                        latest: Some(SensorLatest {
                            value: 30.0,
                            datetime: Some(SensorDatetime { utc: "2026-07-01T12:00:00Z".to_string() }),
                        }),
                    },
                ],
            }],
        };
        let measurements = normalize(response, 45.5, -122.6);
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].pollutants.len(), 2);
        assert_eq!(measurements[0].timestamp.to_rfc3339(), "2026-07-01T12:00:00+00:00");
    }
}
