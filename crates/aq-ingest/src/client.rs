use aq_core::config::SourceSettings;
use backoff::{future::retry, ExponentialBackoffBuilder};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Where a provider expects its API key to be attached.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    QueryParam(&'static str),
    Header(&'static str),
    None,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("no API key configured")]
    NotConfigured,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("unexpected response shape from upstream")]
    UnexpectedShape,
}

/// A stored record of one upstream request/response pair, for audit and debugging.
#[derive(Debug, Clone)]
pub struct RawResponseLog {
    pub source: String,
    pub endpoint: String,
    pub params: Value,
    pub response_data: Value,
    pub status_code: u16,
    pub response_time_ms: i64,
    pub is_error: bool,
    pub error_message: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// Thin HTTP client wrapper shared by every provider adapter: attaches auth,
/// retries transient failures with exponential backoff, and records a
/// [`RawResponseLog`] for every attempt regardless of outcome.
pub struct HttpAdapterClient {
    client: reqwest::Client,
    base_url: String,
    source: String,
    auth: AuthStrategy,
    api_key: Option<String>,
    max_retries: u32,
    backoff_factor: f64,
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl HttpAdapterClient {
    pub fn new(source: &str, base_url: &str, auth: AuthStrategy, settings: &SourceSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            source: source.to_string(),
            auth,
            api_key: settings.api_key.clone(),
            max_retries: settings.max_retries,
            backoff_factor: settings.retry_backoff_factor,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.auth, AuthStrategy::None) || self.api_key.is_some()
    }

    /// GET `endpoint` with `params`, retrying transient upstream failures.
    /// Returns the parsed JSON body alongside a log of the final attempt.
    pub async fn get_json(
        &self,
        endpoint: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<(Value, RawResponseLog), AdapterError> {
        if !self.is_configured() {
            return Err(AdapterError::NotConfigured);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        match &self.auth {
            AuthStrategy::QueryParam(name) => {
                if let Some(key) = &self.api_key {
                    params.push((name.to_string(), key.clone()));
                }
            }
            AuthStrategy::Header(name) => {
                if let Some(key) = &self.api_key {
                    if let Ok(value) = reqwest::header::HeaderValue::from_str(key) {
                        headers.insert(
                            reqwest::header::HeaderName::from_bytes(name.as_bytes())
                                .expect("header name is a static ASCII literal"),
                            value,
                        );
                    }
                }
            }
            AuthStrategy::None => {}
        }

        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_multiplier(self.backoff_factor)
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        let started = Utc::now();
        let attempt = retry(backoff, || {
            let url = url.clone();
            let params = params.clone();
            let headers = headers.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .query(&params)
                    .headers(headers)
                    .send()
                    .await
                    .map_err(|e| backoff::Error::transient(AdapterError::Http(e)))?;

                let status = response.status().as_u16();
                if is_retryable_status(status) {
                    warn!(source = %self.source, status, "retryable upstream status");
                    return Err(backoff::Error::transient(AdapterError::Status(status)));
                }
                if status >= 400 {
                    return Err(backoff::Error::permanent(AdapterError::Status(status)));
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| backoff::Error::permanent(AdapterError::Http(e)))?;
                Ok((status, body))
            }
        })
        .await;

        let elapsed_ms = (Utc::now() - started).num_milliseconds();
        let params_json = Value::Object(
            params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );

        metrics::histogram!("aq_adapter_latency_ms", "source" => self.source.clone()).record(elapsed_ms as f64);

        match attempt {
            Ok((status, body)) => {
                metrics::counter!("aq_adapter_fetch_total", "source" => self.source.clone(), "outcome" => "success")
                    .increment(1);
                let log = RawResponseLog {
                    source: self.source.clone(),
                    endpoint: endpoint.to_string(),
                    params: params_json,
                    response_data: body.clone(),
                    status_code: status,
                    response_time_ms: elapsed_ms,
                    is_error: false,
                    error_message: String::new(),
                    created_at: started,
                };
                Ok((body, log))
            }
            Err(err) => {
                metrics::counter!("aq_adapter_fetch_total", "source" => self.source.clone(), "outcome" => "failure")
                    .increment(1);
                let status_code = match &err {
                    AdapterError::Status(s) => *s,
                    _ => 0,
                };
                let log = RawResponseLog {
                    source: self.source.clone(),
                    endpoint: endpoint.to_string(),
                    params: params_json,
                    response_data: Value::Null,
                    status_code,
                    response_time_ms: elapsed_ms,
                    is_error: true,
                    error_message: err.to_string(),
                    created_at: started,
                };
                // best-effort: caller decides whether to persist this log
                Err(log_and_return(log, err))
            }
        }
    }
}

fn log_and_return(log: RawResponseLog, err: AdapterError) -> AdapterError {
    warn!(source = %log.source, endpoint = %log.endpoint, error = %err, "adapter request failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_expected_set() {
        for s in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(s));
        }
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn client_without_key_is_unconfigured_when_auth_required() {
        let settings = SourceSettings::default();
        let client = HttpAdapterClient::new("WAQI", "https://api.waqi.info", AuthStrategy::QueryParam("token"), &settings);
        assert!(!client.is_configured());
    }
}
