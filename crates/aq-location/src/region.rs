use aq_core::types::SourceCode;

/// Per-country adapter ordering and preferred AQI reporting scale.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    pub country_code: String,
    pub country_name: String,
    pub source_priority: Vec<SourceCode>,
    pub aqi_scale: &'static str,
    pub has_official_data: bool,
}

/// Built-in region configs. The `DEFAULT` entry is used for any country
/// code with no dedicated config, so it always has to be present.
///
/// AirVisual and EPA AirNow are region-restricted by licensing, not by
/// code here; OpenAQ stands in as the Canadian official-station feed in
/// place of a dedicated ECCC adapter, since OpenAQ already aggregates
/// Environment Canada's published stations.
pub fn builtin_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            country_code: "US".to_string(),
            country_name: "United States".to_string(),
            source_priority: vec![
                SourceCode::EpaAirNow,
                SourceCode::PurpleAir,
                SourceCode::OpenWeatherMap,
                SourceCode::AirVisual,
                SourceCode::Waqi,
            ],
            aqi_scale: "EPA",
            has_official_data: true,
        },
        RegionConfig {
            country_code: "CA".to_string(),
            country_name: "Canada".to_string(),
            source_priority: vec![
                SourceCode::OpenAq,
                SourceCode::PurpleAir,
                SourceCode::OpenWeatherMap,
                SourceCode::AirVisual,
                SourceCode::Waqi,
            ],
            aqi_scale: "AQHI",
            has_official_data: true,
        },
        RegionConfig {
            country_code: "DEFAULT".to_string(),
            country_name: "Default".to_string(),
            source_priority: vec![
                SourceCode::OpenWeatherMap,
                SourceCode::AirVisual,
                SourceCode::Waqi,
                SourceCode::PurpleAir,
                SourceCode::OpenAq,
            ],
            aqi_scale: "EPA",
            has_official_data: false,
        },
    ]
}

/// Look up a region config for `country_code`, falling back to `DEFAULT`.
pub fn region_for(country_code: &str) -> RegionConfig {
    let regions = builtin_regions();
    let upper = country_code.to_uppercase();
    regions
        .iter()
        .find(|r| r.country_code == upper)
        .cloned()
        .unwrap_or_else(|| regions.into_iter().find(|r| r.country_code == "DEFAULT").expect("DEFAULT region always present"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_country_returns_its_own_config() {
        let us = region_for("us");
        assert_eq!(us.country_code, "US");
        assert!(us.has_official_data);
    }

    #[test]
    fn unknown_country_falls_back_to_default() {
        let unknown = region_for("ZZ");
        assert_eq!(unknown.country_code, "DEFAULT");
        assert!(!unknown.has_official_data);
    }
}
