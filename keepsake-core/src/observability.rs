/*!
Logging and metrics setup.

- Structured logging through `tracing-subscriber`, JSON or human-readable
- Prometheus counters for requests and slot failures (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{KeepsakeError, Result};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
}

/// Install the global tracing subscriber
///
/// The `RUST_LOG` environment variable is honoured; `keepsake=info` is always added as
/// a baseline directive.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    init_tracing_with_level(format, "info")
}

/// Install the global tracing subscriber with an explicit level for the keepsake crates
pub fn init_tracing_with_level(format: LogFormat, level: &str) -> Result<()> {
    let directive: Directive = format!("keepsake={level}")
        .parse()
        .map_err(|e| KeepsakeError::validation(format!("invalid log level '{level}': {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let result = match format {
        LogFormat::Json => set_global_default(
            TracingRegistry::default().with(filter).with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(false),
            ),
        ),
        LogFormat::Pretty => set_global_default(
            TracingRegistry::default()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false)),
        ),
    };
    result.map_err(|e| {
        KeepsakeError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("keepsake tracing initialized");
    Ok(())
}

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Prometheus metrics for engine requests
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct EngineMetrics {
    pub slot_operations_total: CounterVec,
    pub slot_failures_total: CounterVec,
    pub payload_bytes: Histogram,
    registry: Registry,
}

#[cfg(feature = "metrics")]
impl EngineMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();
        let metric_error =
            |e: prometheus::Error| KeepsakeError::validation(format!("Failed to create metric: {e}"));

        let slot_operations_total = CounterVec::new(
            Opts::new(
                "keepsake_slot_operations_total",
                "Slot operations started, by operation",
            ),
            &["operation"],
        )
        .map_err(metric_error)?;
        let slot_failures_total = CounterVec::new(
            Opts::new(
                "keepsake_slot_failures_total",
                "Slot operations that failed, by operation",
            ),
            &["operation"],
        )
        .map_err(metric_error)?;
        let payload_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "keepsake_payload_bytes",
                "Size of slot payloads written or read",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 10).map_err(metric_error)?),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(slot_operations_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(slot_failures_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(payload_bytes.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            slot_operations_total,
            slot_failures_total,
            payload_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> &'static EngineMetrics {
        METRICS.get_or_init(|| Self::new().expect("metric definitions are static and valid"))
    }

    pub fn record_operation(&self, operation: &str) {
        self.slot_operations_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_failure(&self, operation: &str) {
        self.slot_failures_total.with_label_values(&[operation]).inc();
    }

    pub fn record_payload(&self, bytes: usize) {
        self.payload_bytes.observe(bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| KeepsakeError::validation(format!("Failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| KeepsakeError::validation(format!("Metrics are not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let err = init_tracing_with_level(LogFormat::Pretty, "not a level!").unwrap_err();
        assert!(matches!(err, KeepsakeError::Validation(_)));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_gathering() {
        let metrics = EngineMetrics::global();
        metrics.record_operation("save");
        metrics.record_failure("load");
        metrics.record_payload(1024);

        let text = metrics.gather().unwrap();
        assert!(text.contains("keepsake_slot_operations_total"));
        assert!(text.contains("keepsake_slot_failures_total"));
    }
}
