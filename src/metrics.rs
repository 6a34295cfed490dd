//! Provider Metrics
//!
//! Prometheus counters and histograms for lifecycle operations, kept in a
//! dedicated registry so several providers can live in one process.

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Outcome label for a finished operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The remote object no longer exists
    Gone,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Gone => "gone",
            Outcome::Error => "error",
        }
    }
}

/// Metrics for provider lifecycle operations
pub struct ProviderMetrics {
    registry: Registry,
    operations: IntCounterVec,
    durations: HistogramVec,
}

impl ProviderMetrics {
    /// Create and register the provider metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "volume_type_provider_operations_total",
                "Lifecycle operations by kind, operation and outcome",
            ),
            &["kind", "operation", "outcome"],
        )
        .map_err(metrics_error)?;

        let durations = HistogramVec::new(
            HistogramOpts::new(
                "volume_type_provider_operation_duration_seconds",
                "Duration of lifecycle operations",
            ),
            &["kind", "operation"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(durations.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            operations,
            durations,
        })
    }

    /// Record one finished operation
    pub fn observe(&self, kind: &str, operation: &str, outcome: Outcome, elapsed: Duration) {
        self.operations
            .with_label_values(&[kind, operation, outcome.as_str()])
            .inc();
        self.durations
            .with_label_values(&[kind, operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Number of operations recorded for a label set
    pub fn count(&self, kind: &str, operation: &str, outcome: Outcome) -> u64 {
        self.operations
            .with_label_values(&[kind, operation, outcome.as_str()])
            .get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}
