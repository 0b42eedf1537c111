//! Application metrics for Prometheus monitoring.
//!
//! The recorder is installed once by the binary. Until then every helper is a
//! no-op, so tests and library users need not care.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use jobline_core::JobStatus;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("jobs_enqueued_total", "Jobs accepted by the enqueue endpoint");
    describe_counter!("jobs_claimed_total", "Jobs claimed by a worker loop");
    describe_counter!(
        "jobs_finished_total",
        "Jobs that reached a terminal state, by status"
    );
    describe_histogram!(
        "job_duration_seconds",
        "Time from claim to terminal write in seconds"
    );
    describe_gauge!("job_streams_active", "Open job progress streams");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_enqueued(job_type: &str) {
    counter!("jobs_enqueued_total", "type" => job_type.to_string()).increment(1);
}

pub fn record_claimed(job_type: &str) {
    counter!("jobs_claimed_total", "type" => job_type.to_string()).increment(1);
}

pub fn record_finished(job_type: &str, status: JobStatus, duration: Duration) {
    counter!(
        "jobs_finished_total",
        "type" => job_type.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
    histogram!("job_duration_seconds", "type" => job_type.to_string())
        .record(duration.as_secs_f64());
}

/// Counts one open progress stream for as long as it lives.
pub struct StreamGauge(());

impl StreamGauge {
    pub fn open() -> Self {
        gauge!("job_streams_active").increment(1.0);
        StreamGauge(())
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        gauge!("job_streams_active").decrement(1.0);
    }
}
