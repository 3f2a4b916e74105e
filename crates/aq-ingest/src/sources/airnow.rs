use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::{AirQualityAdapter, ForecastPoint};
use aq_core::config::SourceSettings;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{instrument, warn};

const BASE_URL: &str = "https://www.airnowapi.org/aq";

/// EPA AirNow: official U.S. government monitoring stations. Verified quality,
/// always treated as a primary source in `US` region configs.
pub struct AirNowAdapter {
    client: HttpAdapterClient,
}

impl AirNowAdapter {
    pub fn new(settings: &SourceSettings) -> Self {
        Self {
            client: HttpAdapterClient::new("EPA_AIRNOW", BASE_URL, AuthStrategy::QueryParam("API_KEY"), settings),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(rename = "ReportingArea")]
    reporting_area: String,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "ParameterName")]
    parameter_name: String,
    #[serde(rename = "AQI")]
    aqi: Option<i32>,
    #[serde(rename = "Value")]
    value: Option<f64>,
    #[serde(rename = "DateObserved")]
    date_observed: String,
}

struct StationAccumulator {
    lat: Option<f64>,
    lon: Option<f64>,
    aqi: Option<i32>,
    pollutants: Pollutants,
    date_observed: String,
}

fn pollutant_key(parameter_name: &str) -> Option<&'static str> {
    match parameter_name.to_lowercase().as_str() {
        "pm2.5" => Some("pm25"),
        "pm10" => Some("pm10"),
        "o3" | "ozone" => Some("o3"),
        "no2" => Some("no2"),
        "co" => Some("co"),
        "so2" => Some("so2"),
        _ => None,
    }
}

fn normalize(observations: Vec<Observation>, query_lat: f64, query_lon: f64) -> Vec<Measurement> {
    let mut stations: BTreeMap<String, StationAccumulator> = BTreeMap::new();

    for obs in observations {
        let entry = stations.entry(obs.reporting_area.clone()).or_insert_with(|| StationAccumulator {
            lat: obs.latitude,
            lon: obs.longitude,
            aqi: None,
            pollutants: Pollutants::new(),
            date_observed: obs.date_observed.clone(),
        });

        if let Some(key) = pollutant_key(&obs.parameter_name) {
            if let Some(value) = obs.value {
                entry.pollutants.insert(key.to_string(), value);
            }
        }
        if let Some(aqi) = obs.aqi {
            entry.aqi = Some(entry.aqi.map_or(aqi, |current| current.max(aqi)));
        }
    }

    stations
        .into_iter()
        .filter_map(|(station_name, acc)| {
            let lat = acc.lat.unwrap_or(query_lat);
            let lon = acc.lon.unwrap_or(query_lon);
            let timestamp = NaiveDate::parse_from_str(&acc.date_observed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt))
                .unwrap_or_else(Utc::now);
            let distance_km = if acc.lat.is_some() && acc.lon.is_some() {
                Some(aq_core::distance::haversine_km(query_lat, query_lon, lat, lon))
            } else {
                None
            };

            Some(Measurement {
                source: SourceCode::EpaAirNow,
                coordinates: Coordinates::new(lat, lon).ok()?,
                timestamp,
                aqi: acc.aqi,
                pollutants: acc.pollutants,
                quality_level: QualityLevel::Verified,
                distance_km,
                confidence_score: Some(100.0),
                station_id: None,
                station_name: Some(station_name),
            })
        })
        .collect()
}

#[async_trait]
impl AirQualityAdapter for AirNowAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::EpaAirNow
    }

    #[instrument(skip(self), fields(source = "EPA_AIRNOW"))]
    async fn fetch_current(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        // AirNow's `distance` parameter is in miles.
        let distance_miles = radius_km / 1.60934;
        let params = vec![
            ("latitude".to_string(), lat.to_string()),
            ("longitude".to_string(), lon.to_string()),
            ("distance".to_string(), distance_miles.to_string()),
            ("format".to_string(), "application/json".to_string()),
        ];

        let (body, _log) = self.client.get_json("observation/latLong/current/", params).await?;
        let observations: Vec<Observation> = serde_json::from_value(body).map_err(|e| AdapterError::Parse(e.to_string()))?;
        Ok(normalize(observations, lat, lon))
    }

    #[instrument(skip(self), fields(source = "EPA_AIRNOW"))]
    async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<Vec<ForecastPoint>, AdapterError> {
        let params = vec![
            ("latitude".to_string(), lat.to_string()),
            ("longitude".to_string(), lon.to_string()),
            ("distance".to_string(), "25".to_string()),
            ("format".to_string(), "application/json".to_string()),
        ];

        let (body, _log) = match self.client.get_json("forecast/latLong/", params).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "AirNow forecast request failed");
                return Err(e);
            }
        };

        #[derive(Deserialize)]
        struct ForecastItem {
            #[serde(rename = "DateForecast")]
            date_forecast: String,
            #[serde(rename = "AQI")]
            aqi: Option<i32>,
        }

        let items: Vec<ForecastItem> = serde_json::from_value(body).unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let timestamp = NaiveDate::parse_from_str(&item.date_forecast, "%Y-%m-%d")
                    .ok()?
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| Utc.from_utc_datetime(&dt))?;
                Some(ForecastPoint {
                    timestamp,
                    aqi: item.aqi,
                    pollutants: Pollutants::new(),
                    source: SourceCode::EpaAirNow,
                })
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
    fn groups_observations_by_reporting_area_and_takes_max_aqi() {
        let observations = vec![
            Observation {
                reporting_area: "Portland".into(),
                latitude: Some(45.5),
                longitude: Some(-122.6),
                parameter_name: "PM2.5".into(),
                aqi: Some(42),
                value: Some(9.8),
                date_observed: "2026-07-01".into(),
            },
            Observation {
                reporting_area: "Portland".into(),
                latitude: Some(45.5),
                longitude: Some(-122.6),
                parameter_name: "OZONE".into(),
                aqi: Some(58),
                value: Some(0.062),
                date_observed: "2026-07-01".into(),
            },
        ];

        let measurements = normalize(observations, 45.5, -122.6);
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].aqi, Some(58));
        assert_eq!(measurements[0].pollutants.len(), 2);
        assert_eq!(measurements[0].pollutants.get("pm25"), Some(&9.8));
    }
}
