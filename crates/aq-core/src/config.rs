use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-provider adapter settings. `api_key` is usually supplied via environment
/// variable rather than committed to the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub retry_backoff_factor: f64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub epa_airnow: SourceSettings,
    #[serde(default)]
    pub purpleair: SourceSettings,
    #[serde(default)]
    pub openweathermap: SourceSettings,
    #[serde(default)]
    pub waqi: SourceSettings,
    #[serde(default)]
    pub airvisual: SourceSettings,
    #[serde(default)]
    pub openaq: SourceSettings,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            epa_airnow: SourceSettings::default(),
            purpleair: SourceSettings::default(),
            openweathermap: SourceSettings::default(),
            waqi: SourceSettings::default(),
            airvisual: SourceSettings::default(),
            openaq: SourceSettings {
                // OpenAQ's public tier does not require a key for most endpoints.
                enabled: true,
                api_key: None,
                ..SourceSettings::default()
            },
        }
    }
}

impl SourcesConfig {
    pub fn get(&self, source: &str) -> Option<&SourceSettings> {
        match source {
            "EPA_AIRNOW" => Some(&self.epa_airnow),
            "PURPLEAIR" => Some(&self.purpleair),
            "OPENWEATHERMAP" => Some(&self.openweathermap),
            "WAQI" => Some(&self.waqi),
            "AIRVISUAL" => Some(&self.airvisual),
            "OPENAQ" => Some(&self.openaq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "air_quality.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_search_radius_km")]
    pub default_search_radius_km: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_search_radius_km() -> f64 {
    25.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            default_search_radius_km: default_search_radius_km(),
        }
    }
}

/// Knobs for the fusion engine's weighting and freshness rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_cache_ttl")]
    pub response_cache_ttl_secs: u64,
    #[serde(default = "default_max_age_hours")]
    pub max_data_age_hours: i64,
    #[serde(default = "default_preferred_age_minutes")]
    pub preferred_data_age_minutes: i64,
    #[serde(default = "default_true")]
    pub purpleair_epa_correction: bool,
    #[serde(default = "default_min_confidence")]
    pub purpleair_min_confidence: f64,
}

fn default_cache_ttl() -> u64 {
    600
}
fn default_max_age_hours() -> i64 {
    3
}
fn default_preferred_age_minutes() -> i64 {
    30
}
fn default_min_confidence() -> f64 {
    80.0
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            response_cache_ttl_secs: default_cache_ttl(),
            max_data_age_hours: default_max_age_hours(),
            preferred_data_age_minutes: default_preferred_age_minutes(),
            purpleair_epa_correction: true,
            purpleair_min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_geocoder_url")]
    pub geocoder_base_url: String,
    #[serde(default = "default_location_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}
fn default_location_cache_ttl() -> u64 {
    86_400
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            geocoder_base_url: default_geocoder_url(),
            cache_ttl_secs: default_location_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_port: default_metrics_port(),
        }
    }
}

/// Top-level application configuration, assembled from a YAML file (if present)
/// overlaid with environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of an existing config.
    /// API keys are deliberately env-only so they never land in a checked-in file.
    pub fn from_env(mut self) -> Self {
        if let Ok(path) = std::env::var("AQ_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(port) = std::env::var("AQ_API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
        if let Ok(addr) = std::env::var("AQ_API_BIND_ADDR") {
            self.api.bind_addr = addr;
        }
        if let Ok(level) = std::env::var("AQ_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(json) = std::env::var("AQ_JSON_LOGS") {
            self.observability.json_logs = json == "1" || json.eq_ignore_ascii_case("true");
        }

        self.sources.epa_airnow.api_key = std::env::var("AIRNOW_API_KEY").ok().or(self.sources.epa_airnow.api_key);
        self.sources.purpleair.api_key = std::env::var("PURPLEAIR_API_KEY").ok().or(self.sources.purpleair.api_key);
        self.sources.openweathermap.api_key =
            std::env::var("OPENWEATHERMAP_API_KEY").ok().or(self.sources.openweathermap.api_key);
        self.sources.waqi.api_key = std::env::var("WAQI_API_KEY").ok().or(self.sources.waqi.api_key);
        self.sources.airvisual.api_key =
            std::env::var("AIRVISUAL_API_KEY").ok().or(self.sources.airvisual.api_key);
        self.sources.openaq.api_key = std::env::var("OPENAQ_API_KEY").ok().or(self.sources.openaq.api_key);

        self
    }

    /// Load from `path` if it exists, else fall back to defaults, then apply
    /// environment overrides either way.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        Ok(base.from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.fusion.max_data_age_hours, 3);
        assert!(config.fusion.purpleair_epa_correction);
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("AQ_API_PORT", "9999");
        let config = Config::default().from_env();
        assert_eq!(config.api.port, 9999);
        std::env::remove_var("AQ_API_PORT");
    }

    #[test]
    fn source_lookup_resolves_known_codes() {
        let sources = SourcesConfig::default();
        assert!(sources.get("WAQI").is_some());
        assert!(sources.get("UNKNOWN").is_none());
    }
}
