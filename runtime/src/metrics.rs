//! Prometheus metrics for seat leases, the request queue and admission control.
//!
//! # Example
//!
//! ```rust,no_run
//! use seatlock_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Render for a `/metrics` handler
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

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
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder handle plus the address it is advertised on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the metrics endpoint is served on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the metrics endpoint is served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder wasn't installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Seat Lock Metrics
    describe_counter!(
        "seat_lock_operations_total",
        "Seat lock operations by operation and outcome"
    );

    // Request Queue Metrics
    describe_counter!(
        "request_queue_enqueued_total",
        "Total number of actions appended to event queues"
    );
    describe_counter!(
        "request_queue_processed_total",
        "Total number of queued actions processed, by outcome"
    );
    describe_counter!(
        "request_queue_workers_started_total",
        "Total number of per-event queue workers started"
    );
    describe_gauge!(
        "request_queue_workers_running",
        "Number of per-event queue workers currently registered"
    );
    describe_histogram!(
        "request_queue_dispatch_duration_seconds",
        "Time taken to apply one queued action"
    );

    // Admission Metrics
    describe_counter!(
        "admission_decisions_total",
        "Admission decisions by path (direct, queued, rejected)"
    );
}

/// Seat lock metrics recorder.
pub struct SeatLockMetrics;

impl SeatLockMetrics {
    /// Record one lock manager operation.
    pub fn record(operation: &'static str, outcome: &'static str) {
        counter!(
            "seat_lock_operations_total",
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Request queue metrics recorder.
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record an enqueue.
    pub fn record_enqueue() {
        counter!("request_queue_enqueued_total").increment(1);
    }

    /// Record a processed item.
    pub fn record_processed(outcome: &'static str, duration: Duration) {
        counter!("request_queue_processed_total", "outcome" => outcome).increment(1);
        histogram!("request_queue_dispatch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a worker start and the current worker count.
    #[allow(clippy::cast_precision_loss)] // Worker counts are small
    pub fn record_worker_started(running: usize) {
        counter!("request_queue_workers_started_total").increment(1);
        gauge!("request_queue_workers_running").set(running as f64);
    }

    /// Record the current worker count after a worker stopped.
    #[allow(clippy::cast_precision_loss)] // Worker counts are small
    pub fn record_worker_stopped(running: usize) {
        gauge!("request_queue_workers_running").set(running as f64);
    }
}

/// Admission metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record an admission decision.
    pub fn record_decision(path: &'static str) {
        counter!("admission_decisions_total", "path" => path).increment(1);
    }
}
