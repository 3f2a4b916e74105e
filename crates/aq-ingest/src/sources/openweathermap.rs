use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::{AirQualityAdapter, ForecastPoint};
use aq_core::config::SourceSettings;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::instrument;

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// OpenWeatherMap Air Pollution API: global model-based coverage with a
/// 4-day hourly forecast. Reports AQI on its own 1-5 scale, which has to be
/// mapped onto the EPA 0-500 scale before it can be blended with anyone else.
pub struct OpenWeatherMapAdapter {
    client: HttpAdapterClient,
}

impl OpenWeatherMapAdapter {
    pub fn new(settings: &SourceSettings) -> Self {
        Self {
            client: HttpAdapterClient::new("OPENWEATHERMAP", BASE_URL, AuthStrategy::QueryParam("appid"), settings),
        }
    }
}

/// OWM's 1-5 scale mapped to an approximate midpoint of the corresponding EPA band.
fn owm_scale_to_epa(aqi_1_5: i32) -> i32 {
    match aqi_1_5 {
        1 => 25,
        2 => 75,
        3 => 125,
        4 => 175,
        5 => 250,
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    list: Vec<OwmEntry>,
}

#[derive(Debug, Deserialize)]
struct OwmEntry {
    dt: Option<i64>,
    main: Option<OwmMain>,
    components: Option<OwmComponents>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    aqi: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct OwmComponents {
    co: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
}

fn extract_pollutants(components: &OwmComponents) -> Pollutants {
    let mut pollutants = Pollutants::new();
    if let Some(v) = components.co {
        pollutants.insert("co".to_string(), v);
    }
    if let Some(v) = components.no2 {
        pollutants.insert("no2".to_string(), v);
    }
    if let Some(v) = components.o3 {
        pollutants.insert("o3".to_string(), v);
    }
    if let Some(v) = components.so2 {
        pollutants.insert("so2".to_string(), v);
    }
    if let Some(v) = components.pm2_5 {
        pollutants.insert("pm25".to_string(), v);
    }
    if let Some(v) = components.pm10 {
        pollutants.insert("pm10".to_string(), v);
    }
    pollutants
}

#[async_trait]
impl AirQualityAdapter for OpenWeatherMapAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::OpenWeatherMap
    }

    #[instrument(skip(self), fields(source = "OPENWEATHERMAP"))]
    async fn fetch_current(&self, lat: f64, lon: f64, _radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        let params = vec![("lat".to_string(), lat.to_string()), ("lon".to_string(), lon.to_string())];
        let (body, _log) = self.client.get_json("air_pollution", params).await?;
        let response: OwmResponse = serde_json::from_value(body).map_err(|e| AdapterError::Parse(e.to_string()))?;

        let coordinates = Coordinates::new(lat, lon).map_err(|_| AdapterError::UnexpectedShape)?;

        Ok(response
            .list
            .into_iter()
            .map(|entry| {
                let timestamp = entry.dt.and_then(|secs| Utc.timestamp_opt(secs, 0).single()).unwrap_or_else(Utc::now);
                let aqi = entry.main.and_then(|m| m.aqi).map(owm_scale_to_epa);
                let pollutants = entry.components.map(|c| extract_pollutants(&c)).unwrap_or_default();

                Measurement {
                    source: SourceCode::OpenWeatherMap,
                    coordinates,
                    timestamp,
                    aqi,
                    pollutants,
                    quality_level: QualityLevel::Model,
                    distance_km: Some(0.0),
                    confidence_score: Some(75.0),
                    station_id: None,
                    station_name: None,
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(source = "OPENWEATHERMAP"))]
    async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<Vec<ForecastPoint>, AdapterError> {
        let params = vec![("lat".to_string(), lat.to_string()), ("lon".to_string(), lon.to_string())];
        let (body, _log) = self.client.get_json("air_pollution/forecast", params).await?;
        let response: OwmResponse = serde_json::from_value(body).map_err(|e| AdapterError::Parse(e.to_string()))?;

        Ok(response
            .list
            .into_iter()
            .filter_map(|entry| {
                let timestamp = entry.dt.and_then(|secs| Utc.timestamp_opt(secs, 0).single())?;
                let aqi = entry.main.and_then(|m| m.aqi).map(owm_scale_to_epa);
                let pollutants = entry.components.map(|c| extract_pollutants(&c)).unwrap_or_default();
                Some(ForecastPoint { timestamp, aqi, pollutants, source: SourceCode::OpenWeatherMap })
            })
            .collect())
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owm_scale_maps_to_epa_midpoints() {
        assert_eq!(owm_scale_to_epa(1), 25);
        assert_eq!(owm_scale_to_epa(5), 250);
        assert_eq!(owm_scale_to_epa(99), 0);
    }
}
