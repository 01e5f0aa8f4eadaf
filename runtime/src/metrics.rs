//! Prometheus metrics for the Seller and Manager.
//!
//! Metrics are optional. When enabled, [`MetricsRecorder::install`] installs
//! the global Prometheus recorder and the process renders the exposition
//! text once at exit. When disabled, the recorder structs below are no-ops
//! because no global recorder is installed.

use crate::error::RuntimeError;
use airsales_core::{ControlCode, SalesStat, SeatClass, TerminationReason};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("handle", &self.handle.as_ref().map(|_| "PrometheusHandle"))
            .finish()
    }
}

impl MetricsRecorder {
    /// Install the global recorder and describe every metric.
    ///
    /// A recorder installed earlier in the same process (as happens across
    /// tests) is tolerated: metrics keep flowing to it, but this instance
    /// cannot render them.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Metrics`] if the exporter cannot be built.
    pub fn install() -> Result<Self, RuntimeError> {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_metrics();
                tracing::debug!("Metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(RuntimeError::Metrics(message))
                }
            }
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn describe_metrics() {
    describe_counter!("airsales_tickets_sold_total", "Tickets sold, labelled by seat class");
    describe_counter!("airsales_clients_created_total", "Synthetic clients enqueued");
    describe_gauge!("airsales_revenue", "Total revenue seen by this process");
    describe_gauge!("airsales_clients_served", "Clients served seen by this process");
    describe_gauge!("airsales_queue_depth", "Clients waiting for a worker");

    describe_counter!("airsales_snapshot_publishes_total", "Snapshots written to shared memory");
    describe_counter!("airsales_snapshot_publish_failures_total", "Snapshot writes that failed");
    describe_counter!("airsales_snapshot_polls_total", "Snapshots read from shared memory");
    describe_counter!("airsales_snapshot_poll_failures_total", "Snapshot reads that failed");

    describe_counter!("airsales_control_codes_sent_total", "Control codes queued to the peer");
    describe_counter!("airsales_control_codes_received_total", "Control codes acted on");
    describe_counter!("airsales_control_codes_ignored_total", "Control codes received in the wrong direction");
    describe_counter!("airsales_control_send_failures_total", "Control codes that could not be queued");
    describe_counter!("airsales_terminations_total", "Winning terminations, labelled by reason");
}

/// Sales pipeline metrics.
pub struct SalesMetrics;

impl SalesMetrics {
    /// Record one ticket sold.
    pub fn record_sale(class: SeatClass) {
        counter!("airsales_tickets_sold_total", "class" => class.label()).increment(1);
    }

    /// Record one client enqueued.
    pub fn record_client_created() {
        counter!("airsales_clients_created_total").increment(1);
    }

    /// Record the current totals.
    pub fn record_stats(stat: SalesStat) {
        gauge!("airsales_revenue").set(f64::from(stat.total_revenue));
        gauge!("airsales_clients_served").set(f64::from(stat.total_clients_served));
    }

    /// Record the queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_queue_depth(depth: usize) {
        gauge!("airsales_queue_depth").set(depth as f64);
    }
}

/// Shared-memory metrics.
pub struct IpcMetrics;

impl IpcMetrics {
    /// Record a snapshot written.
    pub fn record_publish() {
        counter!("airsales_snapshot_publishes_total").increment(1);
    }

    /// Record a snapshot write that failed.
    pub fn record_publish_failure() {
        counter!("airsales_snapshot_publish_failures_total").increment(1);
    }

    /// Record a snapshot read.
    pub fn record_poll() {
        counter!("airsales_snapshot_polls_total").increment(1);
    }

    /// Record a snapshot read that failed.
    pub fn record_poll_failure() {
        counter!("airsales_snapshot_poll_failures_total").increment(1);
    }
}

/// Control-channel and termination metrics.
pub struct ControlMetrics;

impl ControlMetrics {
    /// Record a code queued to the peer.
    pub fn record_sent(code: ControlCode) {
        counter!("airsales_control_codes_sent_total", "code" => code.to_string()).increment(1);
    }

    /// Record a code acted on.
    pub fn record_received(code: ControlCode) {
        counter!("airsales_control_codes_received_total", "code" => code.to_string()).increment(1);
    }

    /// Record a code that arrived in the wrong direction.
    pub fn record_ignored(code: ControlCode) {
        counter!("airsales_control_codes_ignored_total", "code" => code.to_string()).increment(1);
    }

    /// Record a code that could not be queued.
    pub fn record_send_failure() {
        counter!("airsales_control_send_failures_total").increment(1);
    }

    /// Record the winning termination.
    pub fn record_termination(reason: TerminationReason) {
        counter!("airsales_terminations_total", "reason" => reason.to_string()).increment(1);
    }
}
