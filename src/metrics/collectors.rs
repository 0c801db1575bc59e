//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code
//! and tests can record freely.

use super::prometheus::{
    ALERTS_TOTAL, JOBS_SUBMITTED_TOTAL, JOB_COMPLETIONS_TOTAL, OUTSTANDING_JOBS, QUEUE_DEPTH,
    STAGE_DURATION, STAGE_RUNS_TOTAL,
};

/// Metrics collector for stats-cache operations.
///
/// # Example
///
/// ```ignore
/// use stats_cache::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_stage("discover", "success", 1.2);
/// collector.record_job_submitted();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one stage run.
    ///
    /// # Arguments
    ///
    /// * `stage` - Stage name (e.g. "discover", "submit", "finish")
    /// * `outcome` - "success", "transient" or "integrity"
    /// * `duration_secs` - Wall-clock time spent in the stage
    pub fn record_stage(&self, stage: &str, outcome: &str, duration_secs: f64) {
        if let Some(runs) = STAGE_RUNS_TOTAL.get() {
            runs.with_label_values(&[stage, outcome]).inc();
        }

        if let Some(duration) = STAGE_DURATION.get() {
            duration.with_label_values(&[stage]).observe(duration_secs);
        }

        tracing::trace!(
            stage = stage,
            outcome = outcome,
            duration_secs = duration_secs,
            "Recorded stage metric"
        );
    }

    pub fn record_job_submitted(&self) {
        if let Some(submitted) = JOBS_SUBMITTED_TOTAL.get() {
            submitted.inc();
        }
    }

    /// Record a handled completion event ("cached", "retry_scheduled", "disabled", "ignored").
    pub fn record_completion(&self, outcome: &str) {
        if let Some(completions) = JOB_COMPLETIONS_TOTAL.get() {
            completions.with_label_values(&[outcome]).inc();
        }

        tracing::trace!(outcome = outcome, "Recorded completion metric");
    }

    pub fn record_alert(&self, kind: &str) {
        if let Some(alerts) = ALERTS_TOTAL.get() {
            alerts.with_label_values(&[kind]).inc();
        }
    }

    /// Update the queue depth for a specific queue.
    pub fn update_queue_depth(&self, queue_name: &str, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth
                .with_label_values(&[queue_name])
                .set(depth as f64);
        }

        tracing::trace!(
            queue_name = queue_name,
            depth = depth,
            "Updated queue depth metric"
        );
    }

    pub fn update_outstanding_jobs(&self, count: usize) {
        if let Some(outstanding) = OUTSTANDING_JOBS.get() {
            outstanding.set(count as f64);
        }
    }
}
