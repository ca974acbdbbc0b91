//! Prometheus metrics for the adapter
//!
//! - Operation counts by result and their durations
//! - Per-object reconcile outcomes
//! - Progress events requeued after a failed stream send

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Adapter metrics registry
///
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct AdapterMetrics {
    registry: Registry,
    /// Operations by name and result (success, error, timeout, invalid)
    pub operations_total: IntCounterVec,
    /// Operation duration in seconds
    pub operation_duration_seconds: HistogramVec,
    /// Objects by reconcile outcome (created, updated, deleted, skipped)
    pub objects_total: IntCounterVec,
    pub events_requeued_total: IntCounter,
}

impl AdapterMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "nsm_adapter_operations_total",
                "Total number of operations processed",
            ),
            &["operation", "result"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nsm_adapter_operation_duration_seconds",
                "Duration of operations in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        let objects_total = IntCounterVec::new(
            Opts::new(
                "nsm_adapter_objects_total",
                "Total number of manifest objects reconciled",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(objects_total.clone()))?;

        let events_requeued_total = IntCounter::new(
            "nsm_adapter_events_requeued_total",
            "Progress events re-enqueued after a failed stream send",
        )?;
        registry.register(Box::new(events_requeued_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration_seconds,
            objects_total,
            events_requeued_total,
        })
    }

    /// Record a finished operation
    pub fn record_operation(&self, operation: &str, result: &str, duration_secs: f64) {
        self.operations_total
            .with_label_values(&[operation, result])
            .inc();
        self.operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record a request rejected before any work started
    pub fn record_invalid_operation(&self, operation: &str) {
        self.operations_total
            .with_label_values(&[operation, "invalid"])
            .inc();
    }

    pub fn record_object(&self, outcome: &str) {
        self.objects_total.with_label_values(&[outcome]).inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not valid UTF-8: {}", e)))
    }
}

pub type SharedMetrics = Arc<AdapterMetrics>;

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(AdapterMetrics::new()?))
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
