//! Tracing subscriber and metrics recorder setup.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

/// Installs the global subscriber: `RUST_LOG` filter plus a text or JSON fmt layer.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

/// Installs the Prometheus recorder and describes the saga metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("saga_created_total", "Sagas created");
    metrics::describe_counter!("saga_completed_total", "Sagas that completed");
    metrics::describe_counter!("saga_failed_total", "Sagas that ended FAILED");
    metrics::describe_counter!("saga_compensations_total", "Compensation commands dispatched");
    metrics::describe_counter!(
        "saga_duplicate_events_total",
        "Status events ignored by the reducer"
    );
    metrics::describe_counter!("saga_timeouts_total", "Sagas forced out by their timeout");
    metrics::describe_counter!("saga_resends_total", "In-flight commands re-sent by recovery");
    metrics::describe_counter!(
        "saga_outcome_resends_total",
        "Terminal outcome events re-sent by recovery"
    );
    metrics::describe_counter!("saga_purged_total", "Terminal sagas deleted");
    metrics::describe_histogram!(
        "saga_duration_seconds",
        metrics::Unit::Seconds,
        "Time from creation to terminal state"
    );

    Ok(handle)
}
