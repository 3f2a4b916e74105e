use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn init_prometheus_exporter() {
    PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder");
}

pub fn start_metrics_server(addr: SocketAddr) {
    PrometheusBuilder::new().with_http_listener(addr).install_recorder().expect("failed to start metrics server");
}

/// Counters and histograms emitted by provider adapters.
#[derive(Clone, Default)]
pub struct AdapterMetrics;

impl AdapterMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_fetch(&self, source: &str, outcome: &str) {
        metrics::counter!("aq_adapter_fetch_total", "source" => source.to_string(), "outcome" => outcome.to_string())
            .increment(1);
    }

    pub fn record_latency(&self, source: &str, latency_ms: u64) {
        metrics::histogram!("aq_adapter_latency_ms", "source" => source.to_string()).record(latency_ms as f64);
    }

    pub fn record_retry(&self, source: &str) {
        metrics::counter!("aq_adapter_retries_total", "source" => source.to_string()).increment(1);
    }

    pub fn record_auto_disable(&self, source: &str) {
        metrics::counter!("aq_adapter_auto_disabled_total", "source" => source.to_string()).increment(1);
    }
}

/// Counters and histograms emitted by the fusion engine.
#[derive(Clone, Default)]
pub struct FusionMetrics;

impl FusionMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_blend(&self, cache_hit: bool, source_count: usize) {
        metrics::counter!("aq_fusion_blends_total", "cache_hit" => cache_hit.to_string()).increment(1);
        metrics::histogram!("aq_fusion_source_count").record(source_count as f64);
    }

    pub fn record_blend_duration(&self, duration_ms: u64) {
        metrics::histogram!("aq_fusion_duration_ms").record(duration_ms as f64);
    }

    pub fn record_no_fresh_data(&self) {
        metrics::counter!("aq_fusion_no_fresh_data_total").increment(1);
    }
}
