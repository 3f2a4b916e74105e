pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global tracing subscriber and Prometheus recorder. Call once at startup.
///
/// Log format follows `json_logs`; filter defaults to `info` when `RUST_LOG` is unset.
pub fn init_observability(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    if json_logs {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
    }

    metrics::init_prometheus_exporter();
}
