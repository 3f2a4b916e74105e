use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::AirQualityAdapter;
use aq_core::config::SourceSettings;
use aq_core::distance::haversine_km;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

const BASE_URL: &str = "https://api.airvisual.com/v2";

/// IQAir AirVisual: nearest-city lookup backed by a mix of government and
/// proprietary sensors. Pollutant codes are reported on AirVisual's own
/// `mainus` mnemonic set and remapped to the shared pollutant keys here.
pub struct AirVisualAdapter {
    client: HttpAdapterClient,
}

impl AirVisualAdapter {
    pub fn new(settings: &SourceSettings) -> Self {
        Self { client: HttpAdapterClient::new("AIRVISUAL", BASE_URL, AuthStrategy::QueryParam("key"), settings) }
    }
}

fn pollutant_key(code: &str) -> Option<&'static str> {
    match code {
        "p2" => Some("pm25"),
        "p1" => Some("pm10"),
        "o3" => Some("o3"),
        "n2" => Some("no2"),
        "s2" => Some("so2"),
        "co" => Some("co"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct AirVisualResponse {
    status: String,
    data: Option<AirVisualData>,
}

#[derive(Debug, Deserialize)]
struct AirVisualData {
    city: Option<String>,
    location: Option<AirVisualLocation>,
    current: Option<AirVisualCurrent>,
}

#[derive(Debug, Deserialize)]
struct AirVisualLocation {
    // GeoJSON order: [longitude, latitude].
    coordinates: Option<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct AirVisualCurrent {
    pollution: Option<AirVisualPollution>,
}

#[derive(Debug, Deserialize)]
struct AirVisualPollution {
    ts: Option<String>,
    aqius: Option<i32>,
    mainus: Option<String>,
}

fn normalize(response: AirVisualResponse, query_lat: f64, query_lon: f64) -> Option<Measurement> {
    if response.status != "success" {
        return None;
    }
    let data = response.data?;
    let pollution = data.current.as_ref()?.pollution.as_ref()?;

    let (lat, lon) = data
        .location
        .as_ref()
        .and_then(|l| l.coordinates)
        .map(|[lon, lat]| (lat, lon))
        .unwrap_or((query_lat, query_lon));

    let timestamp: DateTime<Utc> = pollution
        .ts
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    // The free tier reports only US AQI and a main-pollutant code, no raw
    // concentration. We reuse the AQI value itself as the concentration
    // placeholder for that one pollutant, same as the source this was ported from.
    let mut pollutants = Pollutants::new();
    if let (Some(code), Some(aqi)) = (pollution.mainus.as_deref(), pollution.aqius) {
        if let Some(key) = pollutant_key(&code.to_lowercase()) {
            pollutants.insert(key.to_string(), aqi as f64);
        }
    }

    let coordinates = Coordinates::new(lat, lon).ok()?;
    let distance_km = Some(haversine_km(query_lat, query_lon, lat, lon));

    Some(Measurement {
        source: SourceCode::AirVisual,
        coordinates,
        timestamp,
        aqi: pollution.aqius,
        pollutants,
        quality_level: QualityLevel::Model,
        distance_km,
        confidence_score: Some(75.0),
        station_id: None,
        station_name: data.city,
    })
}

#[async_trait]
impl AirQualityAdapter for AirVisualAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::AirVisual
    }

    #[instrument(skip(self), fields(source = "AIRVISUAL"))]
    async fn fetch_current(&self, lat: f64, lon: f64, _radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        let params = vec![("lat".to_string(), lat.to_string()), ("lon".to_string(), lon.to_string())];
        let (body, _log) = self.client.get_json("nearest_city", params).await?;
        let response: AirVisualResponse = serde_json::from_value(body).map_err(|e| AdapterError::Parse(e.to_string()))?;
        Ok(normalize(response, lat, lon).into_iter().collect())
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pollutant_codes_map_to_shared_keys() {
        assert_eq!(pollutant_key("p2"), Some("pm25"));
        assert_eq!(pollutant_key("p1"), Some("pm10"));
        assert_eq!(pollutant_key("unknown"), None);
    }

    #[test]
    fn geojson_coordinates_are_lon_lat_order() {
        let response = AirVisualResponse {
            status: "success".to_string(),
            data: Some(AirVisualData {
                city: Some("Portland".to_string()),
                location: Some(AirVisualLocation { coordinates: Some([-122.6, 45.5]) }),
                current: Some(AirVisualCurrent {
                    pollution: Some(AirVisualPollution {
                        ts: Some("2026-07-01T12:00:00.000Z".to_string()),
                        aqius: Some(40),
                        mainus: Some("P2".to_string()),
                    }),
                }),
            }),
        };
        let measurement = normalize(response, 45.5, -122.6).unwrap();
        assert_eq!(measurement.coordinates.lat, 45.5);
        assert_eq!(measurement.coordinates.lon, -122.6);
        assert_eq!(measurement.aqi, Some(40));
        assert_eq!(measurement.distance_km, Some(0.0));
    }

    #[test]
    fn aqius_is_reused_as_concentration_placeholder() {
        let response = AirVisualResponse {
            status: "success".to_string(),
            data: Some(AirVisualData {
                city: Some("Portland".to_string()),
                location: Some(AirVisualLocation { coordinates: Some([-122.6, 45.5]) }),
                current: Some(AirVisualCurrent {
                    pollution: Some(AirVisualPollution {
                        ts: Some("2026-07-01T12:00:00.000Z".to_string()),
                        aqius: Some(40),
                        mainus: Some("p2".to_string()),
                    }),
                }),
            }),
        };
        let measurement = normalize(response, 45.5, -122.6).unwrap();
        assert_eq!(measurement.pollutants.get("pm25"), Some(&40.0));
    }

    #[test]
    fn non_success_status_yields_nothing() {
        let response = AirVisualResponse { status: "call_limit_reached".to_string(), data: None };
        assert!(normalize(response, 0.0, 0.0).is_none());
    }
}
