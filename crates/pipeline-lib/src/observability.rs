//! Observability for pipeline builds
//!
//! Provides:
//! - Prometheus metrics (build latency, build outcomes, stage and metric counts)
//! - Structured logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for build latency (in seconds)
const BUILD_LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

static GLOBAL_METRICS: OnceLock<CompilerMetricsInner> = OnceLock::new();

struct CompilerMetricsInner {
    build_latency_seconds: Histogram,
    builds: IntCounter,
    build_failures: IntCounter,
    stages_generated: IntGauge,
    metrics_merged: IntGauge,
    custom_metric_failures: IntCounter,
    cardinality_warnings: IntGauge,
}

impl CompilerMetricsInner {
    fn new() -> Self {
        Self {
            build_latency_seconds: register_histogram!(
                "flowpipe_build_latency_seconds",
                "Time spent compiling one pipeline",
                BUILD_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register build_latency_seconds"),

            builds: register_int_counter!(
                "flowpipe_builds_total",
                "Total number of pipeline builds attempted"
            )
            .expect("Failed to register builds_total"),

            build_failures: register_int_counter!(
                "flowpipe_build_failures_total",
                "Total number of pipeline builds that aborted"
            )
            .expect("Failed to register build_failures_total"),

            stages_generated: register_int_gauge!(
                "flowpipe_stages_generated",
                "Number of stages in the last compiled pipeline"
            )
            .expect("Failed to register stages_generated"),

            metrics_merged: register_int_gauge!(
                "flowpipe_metrics_merged",
                "Number of metric definitions handed to the encoder in the last build"
            )
            .expect("Failed to register metrics_merged"),

            custom_metric_failures: register_int_counter!(
                "flowpipe_custom_metric_failures_total",
                "Total number of custom metric definitions skipped on conversion errors"
            )
            .expect("Failed to register custom_metric_failures_total"),

            cardinality_warnings: register_int_gauge!(
                "flowpipe_cardinality_warnings",
                "Metric resources carrying a cardinality warning after the last pass"
            )
            .expect("Failed to register cardinality_warnings"),
        }
    }
}

/// Compiler metrics for Prometheus exposition
///
/// A lightweight handle to the process-wide metrics; clones share them.
#[derive(Clone)]
pub struct CompilerMetrics {
    _private: (),
}

impl Default for CompilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CompilerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CompilerMetricsInner {
        GLOBAL_METRICS.get_or_init(CompilerMetricsInner::new)
    }

    pub fn observe_build_latency(&self, duration_secs: f64) {
        self.inner().build_latency_seconds.observe(duration_secs);
    }

    pub fn inc_builds(&self) {
        self.inner().builds.inc();
    }

    pub fn inc_build_failures(&self) {
        self.inner().build_failures.inc();
    }

    pub fn set_stages_generated(&self, count: usize) {
        self.inner().stages_generated.set(count as i64);
    }

    pub fn set_metrics_merged(&self, count: usize) {
        self.inner().metrics_merged.set(count as i64);
    }

    pub fn add_custom_metric_failures(&self, count: usize) {
        self.inner().custom_metric_failures.inc_by(count as u64);
    }

    pub fn set_cardinality_warnings(&self, count: usize) {
        self.inner().cardinality_warnings.set(count as i64);
    }

    pub fn builds(&self) -> u64 {
        self.inner().builds.get()
    }

    pub fn build_failures(&self) -> u64 {
        self.inner().build_failures.get()
    }

    pub fn custom_metric_failures(&self) -> u64 {
        self.inner().custom_metric_failures.get()
    }
}

/// Text exposition of everything in the default registry
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Structured logger for build events
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_build_started(&self, topology: &str, custom_metrics: usize, slices: usize) {
        debug!(
            event = "build_started",
            namespace = %self.namespace,
            topology = %topology,
            custom_metrics = custom_metrics,
            slices = slices,
            "Compiling pipeline"
        );
    }

    pub fn log_build_completed(
        &self,
        topology: &str,
        stages: usize,
        metrics: usize,
        dynamic_params: usize,
        digest: &str,
        duration_secs: f64,
    ) {
        info!(
            event = "build_completed",
            namespace = %self.namespace,
            topology = %topology,
            stages = stages,
            metrics = metrics,
            dynamic_params = dynamic_params,
            digest = %digest,
            duration_secs = duration_secs,
            "Pipeline compiled"
        );
    }

    pub fn log_build_failed(&self, topology: &str, error: &str, internal: bool) {
        warn!(
            event = "build_failed",
            namespace = %self.namespace,
            topology = %topology,
            internal = internal,
            error = %error,
            "Pipeline build aborted"
        );
    }

    pub fn log_custom_metric_failure(&self, resource: &str, error: &str) {
        warn!(
            event = "custom_metric_skipped",
            namespace = %self.namespace,
            resource = %resource,
            error = %error,
            "Custom metric skipped"
        );
    }

    pub fn log_cardinality_warning(&self, resource: &str, level: &str, details: &str) {
        info!(
            event = "cardinality_warning",
            namespace = %self.namespace,
            resource = %resource,
            level = %level,
            details = %details,
            "Metric labels may cause high cardinality"
        );
    }

    pub fn log_subnet_warning(&self, slice: &str, message: &str) {
        info!(
            event = "subnet_overlap",
            namespace = %self.namespace,
            slice = %slice,
            message = %message,
            "Slice subnet labels overlap"
        );
    }

    pub fn log_status_published(&self, metrics: usize, slices: usize) {
        info!(
            event = "status_published",
            namespace = %self.namespace,
            metrics = metrics,
            slices = slices,
            "Pass status published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CompilerMetrics::new();
        metrics.observe_build_latency(0.001);
        metrics.set_stages_generated(5);
        metrics.set_metrics_merged(8);
        metrics.set_cardinality_warnings(0);
    }

    #[test]
    fn test_metrics_clone_shares_state() {
        let a = CompilerMetrics::new();
        let b = a.clone();
        let before = b.builds();
        a.inc_builds();
        assert!(b.builds() > before);
    }

    #[test]
    fn test_gather_contains_registered_metrics() {
        let metrics = CompilerMetrics::new();
        metrics.inc_build_failures();
        let text = gather_text().unwrap();
        assert!(text.contains("flowpipe_build_failures_total"));
        assert!(text.contains("flowpipe_build_latency_seconds"));
    }

    #[test]
    fn test_structured_logger() {
        let logger = StructuredLogger::new("netobserv");
        logger.log_build_started("direct", 1, 2);
        logger.log_build_completed("direct", 3, 9, 1, "abc", 0.0002);
        logger.log_build_failed("transformer", "kafka ingest 'kafka' is missing required field 'address'", false);
        logger.log_custom_metric_failure("ns/m", "bad bucket");
    }
}
