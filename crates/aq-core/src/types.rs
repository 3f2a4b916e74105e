use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic point, always in WGS84 decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, crate::error::AppError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(crate::error::AppError::InvalidCoordinates(format!(
                "latitude must be between -90 and 90, got {lat}"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(crate::error::AppError::InvalidCoordinates(format!(
                "longitude must be between -180 and 180, got {lon}"
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Coordinates rounded to 3 decimal places (~100m), used as a cache key.
    pub fn cache_key(&self) -> (i64, i64) {
        ((self.lat * 1000.0).round() as i64, (self.lon * 1000.0).round() as i64)
    }
}

/// Identifies a registered upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceCode {
    EpaAirNow,
    PurpleAir,
    OpenWeatherMap,
    Waqi,
    AirVisual,
    OpenAq,
}

impl SourceCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCode::EpaAirNow => "EPA_AIRNOW",
            SourceCode::PurpleAir => "PURPLEAIR",
            SourceCode::OpenWeatherMap => "OPENWEATHERMAP",
            SourceCode::Waqi => "WAQI",
            SourceCode::AirVisual => "AIRVISUAL",
            SourceCode::OpenAq => "OPENAQ",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceCode::EpaAirNow => "EPA AirNow",
            SourceCode::PurpleAir => "PurpleAir",
            SourceCode::OpenWeatherMap => "OpenWeatherMap",
            SourceCode::Waqi => "WAQI",
            SourceCode::AirVisual => "AirVisual (IQAir)",
            SourceCode::OpenAq => "OpenAQ",
        }
    }

    pub fn all() -> [SourceCode; 6] {
        [
            SourceCode::EpaAirNow,
            SourceCode::PurpleAir,
            SourceCode::OpenWeatherMap,
            SourceCode::Waqi,
            SourceCode::AirVisual,
            SourceCode::OpenAq,
        ]
    }

    pub fn from_str_opt(s: &str) -> Option<SourceCode> {
        Self::all().into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for SourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence tier of a data source, used as one factor in fusion weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Verified,
    Model,
    Sensor,
    Estimated,
}

impl QualityLevel {
    /// Multiplicative weight contributed by quality tier alone.
    pub fn weight(&self) -> f64 {
        match self {
            QualityLevel::Verified => 1.0,
            QualityLevel::Sensor => 0.9,
            QualityLevel::Model => 0.8,
            QualityLevel::Estimated => 0.6,
        }
    }
}

/// A dict of pollutant concentrations keyed by canonical pollutant code
/// (pm25, pm10, o3, no2, so2, co).
pub type Pollutants = std::collections::BTreeMap<String, f64>;

/// A single normalized observation produced by a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub source: SourceCode,
    pub coordinates: Coordinates,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub aqi: Option<i32>,
    pub pollutants: Pollutants,
    pub quality_level: QualityLevel,
    pub distance_km: Option<f64>,
    pub confidence_score: Option<f64>,
    pub station_id: Option<String>,
    pub station_name: Option<String>,
}

/// An EPA/AQHI category band: the row of a breakpoint table a given AQI falls into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiCategory {
    pub scale: &'static str,
    pub min_value: i32,
    pub max_value: i32,
    pub category: &'static str,
    pub color_hex: &'static str,
    pub health_message: &'static str,
    pub sensitive_groups: &'static str,
}

/// EPA AQI categories, in ascending order. `min_value`/`max_value` bounds are inclusive.
pub static AQI_CATEGORIES: &[AqiCategory] = &[
    AqiCategory {
        scale: "EPA",
        min_value: 0,
        max_value: 50,
        category: "Good",
        color_hex: "#00E400",
        health_message: "Air quality is satisfactory, and air pollution poses little or no risk.",
        sensitive_groups: "",
    },
    AqiCategory {
        scale: "EPA",
        min_value: 51,
        max_value: 100,
        category: "Moderate",
        color_hex: "#FFFF00",
        health_message: "Air quality is acceptable. However, there may be a risk for some people, particularly those who are unusually sensitive to air pollution.",
        sensitive_groups: "Unusually sensitive people",
    },
    AqiCategory {
        scale: "EPA",
        min_value: 101,
        max_value: 150,
        category: "Unhealthy for Sensitive Groups",
        color_hex: "#FF7E00",
        health_message: "Members of sensitive groups may experience health effects. The general public is less likely to be affected.",
        sensitive_groups: "Children, elderly, people with lung disease, people with heart disease",
    },
    AqiCategory {
        scale: "EPA",
        min_value: 151,
        max_value: 200,
        category: "Unhealthy",
        color_hex: "#FF0000",
        health_message: "Some members of the general public may experience health effects; members of sensitive groups may experience more serious health effects.",
        sensitive_groups: "Everyone, especially sensitive groups",
    },
    AqiCategory {
        scale: "EPA",
        min_value: 201,
        max_value: 300,
        category: "Very Unhealthy",
        color_hex: "#99004C",
        health_message: "Health alert: The risk of health effects is increased for everyone.",
        sensitive_groups: "Everyone",
    },
    AqiCategory {
        scale: "EPA",
        min_value: 301,
        max_value: 500,
        category: "Hazardous",
        color_hex: "#7E0023",
        health_message: "Health warning of emergency conditions: everyone is more likely to be affected.",
        sensitive_groups: "Everyone",
    },
];

/// Canadian Air Quality Health Index categories, in ascending order.
pub static AQHI_CATEGORIES: &[AqiCategory] = &[
    AqiCategory {
        scale: "AQHI",
        min_value: 1,
        max_value: 3,
        category: "Low Risk",
        color_hex: "#00CCFF",
        health_message: "Enjoy your usual outdoor activities.",
        sensitive_groups: "",
    },
    AqiCategory {
        scale: "AQHI",
        min_value: 4,
        max_value: 6,
        category: "Moderate Risk",
        color_hex: "#FFFF00",
        health_message: "Consider reducing or rescheduling strenuous activities outdoors if you are experiencing symptoms.",
        sensitive_groups: "People with heart or breathing problems",
    },
    AqiCategory {
        scale: "AQHI",
        min_value: 7,
        max_value: 10,
        category: "High Risk",
        color_hex: "#FF7E00",
        health_message: "Reduce or reschedule strenuous activities outdoors. Children and the elderly should also take it easy.",
        sensitive_groups: "Children, elderly, people with heart or lung conditions",
    },
    AqiCategory {
        scale: "AQHI",
        min_value: 10,
        max_value: 15,
        category: "Very High Risk",
        color_hex: "#FF0000",
        health_message: "Avoid strenuous activities outdoors. Children and the elderly should also avoid outdoor physical exertion.",
        sensitive_groups: "Everyone, especially sensitive groups",
    },
];

/// Look up the category row a given AQI value falls into, for the requested scale.
pub fn category_for(aqi: i32, scale: &str) -> Option<&'static AqiCategory> {
    let table = if scale == "AQHI" { AQHI_CATEGORIES } else { AQI_CATEGORIES };
    table.iter().find(|c| aqi >= c.min_value && aqi <= c.max_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, 181.0).is_err());
        assert!(Coordinates::new(45.0, -122.0).is_ok());
    }

    #[test]
    fn cache_key_rounds_to_three_decimals() {
        let a = Coordinates::new(45.1234, -122.5678).unwrap();
        let b = Coordinates::new(45.1236, -122.5679).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn category_lookup_covers_full_epa_range() {
        assert_eq!(category_for(0, "EPA").unwrap().category, "Good");
        assert_eq!(category_for(75, "EPA").unwrap().category, "Moderate");
        assert_eq!(category_for(500, "EPA").unwrap().category, "Hazardous");
        assert!(category_for(501, "EPA").is_none());
    }

    #[test]
    fn source_code_round_trips_through_str() {
        for code in SourceCode::all() {
            assert_eq!(SourceCode::from_str_opt(code.as_str()), Some(code));
        }
    }
}
