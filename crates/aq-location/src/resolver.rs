use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A resolved location: whatever the geocoder could determine, with
/// `unknown` standing in for fields it couldn't fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lon: f64,
    pub city: String,
    pub region: String,
    pub country_code: String,
    pub postal_code: String,
    pub formatted_address: String,
}

impl ResolvedLocation {
    fn default_for(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            city: String::new(),
            region: String::new(),
            country_code: "unknown".to_string(),
            postal_code: String::new(),
            formatted_address: format!("{lat}, {lon}"),
        }
    }
}

#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> ResolvedLocation;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    suburb: Option<String>,
    state: Option<String>,
    province: Option<String>,
    region: Option<String>,
    country_code: Option<String>,
    postcode: Option<String>,
}

impl NominatimAddress {
    fn city(&self) -> String {
        self.city
            .clone()
            .or_else(|| self.town.clone())
            .or_else(|| self.village.clone())
            .or_else(|| self.hamlet.clone())
            .or_else(|| self.suburb.clone())
            .unwrap_or_default()
    }

    fn region(&self) -> String {
        self.state.clone().or_else(|| self.province.clone()).or_else(|| self.region.clone()).unwrap_or_default()
    }
}

struct CacheEntry {
    location: ResolvedLocation,
    cached_at: DateTime<Utc>,
}

/// Reverse-geocodes via OpenStreetMap's Nominatim, caching results in
/// memory keyed on the same 3-decimal rounding used elsewhere for cache
/// keys. Falls back to an "unknown" location rather than failing the
/// whole request when the geocoder is unreachable or returns nothing.
pub struct NominatimResolver {
    client: reqwest::Client,
    base_url: String,
    cache_ttl: chrono::Duration,
    cache: Arc<RwLock<HashMap<(i64, i64), CacheEntry>>>,
}

impl NominatimResolver {
    pub fn new(base_url: &str, cache_ttl_secs: i64) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("air-quality-fusion/1.0")
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            client,
            base_url: base_url.to_string(),
            cache_ttl: chrono::Duration::seconds(cache_ttl_secs),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cache_key(lat: f64, lon: f64) -> (i64, i64) {
        ((lat * 1000.0).round() as i64, (lon * 1000.0).round() as i64)
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<ResolvedLocation, LocationError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url.trim_end_matches('/')))
            .query(&[("lat", lat.to_string()), ("lon", lon.to_string()), ("format", "jsonv2".to_string())])
            .send()
            .await?;

        let parsed: NominatimResponse = response.json().await?;

        Ok(ResolvedLocation {
            lat,
            lon,
            city: parsed.address.city(),
            region: parsed.address.region(),
            country_code: parsed.address.country_code.map(|c| c.to_uppercase()).unwrap_or_else(|| "unknown".to_string()),
            postal_code: parsed.address.postcode.unwrap_or_default(),
            formatted_address: if parsed.display_name.is_empty() { format!("{lat}, {lon}") } else { parsed.display_name },
        })
    }
}

#[async_trait]
impl LocationResolver for NominatimResolver {
    #[instrument(skip(self))]
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> ResolvedLocation {
        let key = Self::cache_key(lat, lon);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if Utc::now() - entry.cached_at < self.cache_ttl {
                    return entry.location.clone();
                }
            }
        }

        let resolved = match self.fetch(lat, lon).await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "reverse geocoding failed, using default location");
                ResolvedLocation::default_for(lat, lon)
            }
        };

        let mut cache = self.cache.write().await;
        cache.insert(key, CacheEntry { location: resolved.clone(), cached_at: Utc::now() });
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_city_falls_back_through_place_types() {
        let addr = NominatimAddress { suburb: Some("Pearl District".to_string()), ..Default::default() };
        assert_eq!(addr.city(), "Pearl District");
    }

    #[test]
    fn address_with_no_place_fields_returns_empty_city() {
        let addr = NominatimAddress::default();
        assert_eq!(addr.city(), "");
    }

    #[test]
    fn default_location_uses_coordinates_as_formatted_address() {
        let loc = ResolvedLocation::default_for(45.5, -122.6);
        assert_eq!(loc.country_code, "unknown");
        assert_eq!(loc.formatted_address, "45.5, -122.6");
    }

    #[test]
    fn cache_key_matches_coordinates_cache_key_rounding() {
        assert_eq!(NominatimResolver::cache_key(45.1234, -122.5678), (45123, -122568));
    }
}
