use crate::client::{AdapterError, AuthStrategy, HttpAdapterClient};
use crate::AirQualityAdapter;
use aq_core::config::SourceSettings;
use aq_core::distance::haversine_km;
use aq_core::types::{Coordinates, Measurement, Pollutants, QualityLevel, SourceCode};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::instrument;

const BASE_URL: &str = "https://api.purpleair.com/v1";
const MAX_SENSORS: usize = 10;
const MIN_CONFIDENCE: f64 = 80.0;

/// PurpleAir: dense community PM2.5 sensor network. Raw readings run hot
/// relative to reference monitors, so EPA's correction factor is applied
/// before the value is turned into an AQI.
pub struct PurpleAirAdapter {
    client: HttpAdapterClient,
    apply_epa_correction: bool,
}

impl PurpleAirAdapter {
    pub fn new(settings: &SourceSettings, apply_epa_correction: bool) -> Self {
        Self {
            client: HttpAdapterClient::new("PURPLEAIR", BASE_URL, AuthStrategy::Header("X-API-Key"), settings),
            apply_epa_correction,
        }
    }
}

/// EPA's piecewise correction for PurpleAir's raw PM2.5 channel average.
/// The branch order matters: overlapping ranges in the source formula mean
/// a strict top-to-bottom first match, not a sorted range table.
pub fn epa_correction(pm25_raw: f64) -> f64 {
    if pm25_raw < 30.0 {
        0.524 * pm25_raw - 0.0862
    } else if pm25_raw < 50.0 {
        0.786 * pm25_raw - 5.1327
    } else if pm25_raw < 210.0 {
        0.69 * pm25_raw + 2.966
    } else if pm25_raw < 260.0 {
        0.786 * pm25_raw - 5.1327
    } else {
        0.69 * pm25_raw + 2.966
    }
}

/// EPA's PM2.5 breakpoint table, linearly interpolated within each band.
pub fn pm25_to_aqi(pm25: f64) -> i32 {
    const BREAKPOINTS: [(f64, f64, i32, i32); 7] = [
        (0.0, 12.0, 0, 50),
        (12.1, 35.4, 51, 100),
        (35.5, 55.4, 101, 150),
        (55.5, 150.4, 151, 200),
        (150.5, 250.4, 201, 300),
        (250.5, 350.4, 301, 400),
        (350.5, 500.4, 401, 500),
    ];

    for (c_low, c_high, aqi_low, aqi_high) in BREAKPOINTS {
        if pm25 >= c_low && pm25 <= c_high {
            let aqi = ((aqi_high - aqi_low) as f64 / (c_high - c_low)) * (pm25 - c_low) + aqi_low as f64;
            return aqi.round() as i32;
        }
    }

    if pm25 > 500.4 {
        500
    } else {
        0
    }
}

fn normalize(body: Value, query_lat: f64, query_lon: f64, apply_epa_correction_flag: bool) -> Vec<Measurement> {
    let fields: Vec<String> = body
        .get("fields")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let rows = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

    let index_of = |name: &str| fields.iter().position(|f| f == name);

    let name_idx = index_of("name");
    let lat_idx = index_of("latitude");
    let lon_idx = index_of("longitude");
    let pm25_atm_idx = index_of("pm2.5_atm");
    let pm25_a_idx = index_of("pm2.5_atm_a");
    let pm25_b_idx = index_of("pm2.5_atm_b");
    let confidence_idx = index_of("confidence");
    let last_seen_idx = index_of("last_seen");

    let mut with_distance: Vec<(f64, Measurement)> = Vec::new();

    for row in rows {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i));

        let sensor_lat = cell(lat_idx).and_then(Value::as_f64);
        let sensor_lon = cell(lon_idx).and_then(Value::as_f64);
        let (Some(sensor_lat), Some(sensor_lon)) = (sensor_lat, sensor_lon) else {
            continue;
        };

        let pm25_a = cell(pm25_a_idx).and_then(Value::as_f64);
        let pm25_b = cell(pm25_b_idx).and_then(Value::as_f64);
        let pm25_atm = cell(pm25_atm_idx).and_then(Value::as_f64);

        let pm25_raw = match (pm25_a, pm25_b) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            _ => match pm25_atm.or(pm25_a).or(pm25_b) {
                Some(v) => v,
                None => continue,
            },
        };

        let confidence = cell(confidence_idx).and_then(Value::as_f64);
        if let Some(confidence) = confidence {
            if confidence < MIN_CONFIDENCE {
                continue;
            }
        }

        let pm25_final = if apply_epa_correction_flag { epa_correction(pm25_raw) } else { pm25_raw };
        let aqi = pm25_to_aqi(pm25_final);

        let distance = haversine_km(query_lat, query_lon, sensor_lat, sensor_lon);

        let timestamp = cell(last_seen_idx)
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        let mut pollutants = Pollutants::new();
        pollutants.insert("pm25".to_string(), (pm25_final * 100.0).round() / 100.0);

        let Ok(coordinates) = Coordinates::new(sensor_lat, sensor_lon) else {
            continue;
        };

        let measurement = Measurement {
            source: SourceCode::PurpleAir,
            coordinates,
            timestamp,
            aqi: Some(aqi),
            pollutants,
            quality_level: QualityLevel::Sensor,
            distance_km: Some((distance * 100.0).round() / 100.0),
            confidence_score: confidence,
            station_id: None,
            station_name: cell(name_idx).and_then(Value::as_str).map(str::to_string),
        };

        with_distance.push((distance, measurement));
    }

    with_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
    with_distance.into_iter().take(MAX_SENSORS).map(|(_, m)| m).collect()
}

#[async_trait]
impl AirQualityAdapter for PurpleAirAdapter {
    fn source_code(&self) -> SourceCode {
        SourceCode::PurpleAir
    }

    #[instrument(skip(self), fields(source = "PURPLEAIR"))]
    async fn fetch_current(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Measurement>, AdapterError> {
        // 1 degree of latitude/longitude is approximated as 111km, same as upstream.
        let degree_offset = radius_km / 111.0;
        let params = vec![
            (
                "fields".to_string(),
                "name,latitude,longitude,pm2.5_atm,pm2.5_atm_a,pm2.5_atm_b,confidence,last_seen".to_string(),
            ),
            ("location_type".to_string(), "0".to_string()),
            ("max_age".to_string(), "3600".to_string()),
            ("nwlat".to_string(), (lat + degree_offset).to_string()),
            ("nwlng".to_string(), (lon - degree_offset).to_string()),
            ("selat".to_string(), (lat - degree_offset).to_string()),
            ("selng".to_string(), (lon + degree_offset).to_string()),
        ];

        let (body, _log) = self.client.get_json("sensors", params).await?;
        Ok(normalize(body, lat, lon, self.apply_epa_correction))
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm25_breakpoints_cover_good_through_hazardous() {
        assert_eq!(pm25_to_aqi(0.0), 0);
        assert_eq!(pm25_to_aqi(12.0), 50);
        assert_eq!(pm25_to_aqi(500.4), 500);
        assert_eq!(pm25_to_aqi(600.0), 500);
    }

    #[test]
    fn pm25_to_aqi_is_monotonic() {
        let mut prev = pm25_to_aqi(0.0);
        let mut pm25 = 1.0;
        while pm25 <= 500.0 {
            let aqi = pm25_to_aqi(pm25);
            assert!(aqi >= prev, "aqi decreased at pm25={pm25}: {aqi} < {prev}");
            prev = aqi;
            pm25 += 5.0;
        }
    }

    #[test]
    fn epa_correction_applies_low_band_formula_below_30() {
        let corrected = epa_correction(10.0);
        assert!((corrected - (0.524 * 10.0 - 0.0862)).abs() < 1e-9);
    }
}
