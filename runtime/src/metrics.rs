//! Prometheus metrics for transaction processing and entity hosting.
//!
//! This module provides metric collection for:
//! - Transaction outcomes and latency
//! - Retry attempts per operation (load, persist, emit)
//! - Entity activation and deactivation
//!
//! # Example
//!
//! ```rust,no_run
//! use account_entity_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use account_entity_core::outcome::TransactionStatus;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus exporter and its HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built. A recorder that is already
    /// installed (e.g. by another test) is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        // In tests a recorder may already be installed; metrics still flow to it.
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if let Err(_e) = exporter.await {
                // ExporterError (metrics-exporter-prometheus 0.15) implements neither Debug nor Display.
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "transactions_processed_total",
        "Total number of transaction calls, labelled by status"
    );
    describe_histogram!(
        "transaction_duration_seconds",
        "Time taken to process a transaction, retries included"
    );

    describe_counter!(
        "retry_attempts_total",
        "Total number of retried attempts, labelled by operation"
    );
    describe_counter!(
        "retry_successes_total",
        "Total number of operations that succeeded after a retry"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted their attempts"
    );

    describe_counter!(
        "entity_activations_total",
        "Total number of entity activations"
    );
    describe_counter!(
        "entity_deactivations_total",
        "Total number of idle entity deactivations"
    );
    describe_gauge!("entities_active", "Number of currently active entities");
}

/// Transaction metrics recorder.
pub struct TransactionMetrics;

impl TransactionMetrics {
    /// Record one processed transaction.
    pub fn record(status: TransactionStatus, duration: Duration) {
        counter!("transactions_processed_total", "status" => status.as_str()).increment(1);
        histogram!("transaction_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt(operation: &'static str) {
        counter!("retry_attempts_total", "operation" => operation).increment(1);
    }

    /// Record a successful retry.
    pub fn record_success(operation: &'static str) {
        counter!("retry_successes_total", "operation" => operation).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(operation: &'static str) {
        counter!("retry_exhausted_total", "operation" => operation).increment(1);
    }
}

/// Entity lifecycle metrics recorder.
pub struct EntityMetrics;

impl EntityMetrics {
    /// Record an activation.
    pub fn record_activation() {
        counter!("entity_activations_total").increment(1);
        gauge!("entities_active").increment(1.0);
    }

    /// Record a deactivation.
    pub fn record_deactivation() {
        counter!("entity_deactivations_total").increment(1);
        gauge!("entities_active").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_recorders_work_without_installed_exporter() {
        // With no recorder installed the macros are no-ops; they must not panic.
        TransactionMetrics::record(TransactionStatus::Success, Duration::from_millis(5));
        RetryMetrics::record_attempt("emit_event");
        EntityMetrics::record_activation();
        EntityMetrics::record_deactivation();
    }
}
