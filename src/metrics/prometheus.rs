//! Prometheus metrics registration and export.
//!
//! All stats-cache metrics live in one process-wide registry, initialized
//! once at startup and exported in the text exposition format.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all stats-cache metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Stage executions, labeled by stage and outcome.
pub static STAGE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage execution duration in seconds, labeled by stage.
pub static STAGE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Remote jobs submitted.
pub static JOBS_SUBMITTED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Completion events handled, labeled by outcome.
pub static JOB_COMPLETIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Alerts raised, labeled by kind.
pub static ALERTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage jobs waiting in the queue, labeled by queue name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Repertoire entries currently holding a job id.
pub static OUTSTANDING_JOBS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless: later calls build a fresh
/// registry that is discarded.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let stage_runs_total = CounterVec::new(
        Opts::new("stats_cache_stage_runs_total", "Total pipeline stage runs"),
        &["stage", "outcome"],
    )?;

    let stage_duration = HistogramVec::new(
        HistogramOpts::new(
            "stats_cache_stage_duration_seconds",
            "Pipeline stage duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        &["stage"],
    )?;

    let jobs_submitted_total = IntCounter::new(
        "stats_cache_jobs_submitted_total",
        "Total statistics jobs submitted",
    )?;

    let job_completions_total = CounterVec::new(
        Opts::new(
            "stats_cache_job_completions_total",
            "Total job completion events handled",
        ),
        &["outcome"],
    )?;

    let alerts_total = CounterVec::new(
        Opts::new("stats_cache_alerts_total", "Total operator alerts raised"),
        &["kind"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("stats_cache_queue_depth", "Number of stage jobs in queue"),
        &["queue_name"],
    )?;

    let outstanding_jobs = Gauge::new(
        "stats_cache_outstanding_jobs",
        "Repertoire entries with a job in flight",
    )?;

    registry.register(Box::new(stage_runs_total.clone()))?;
    registry.register(Box::new(stage_duration.clone()))?;
    registry.register(Box::new(jobs_submitted_total.clone()))?;
    registry.register(Box::new(job_completions_total.clone()))?;
    registry.register(Box::new(alerts_total.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(outstanding_jobs.clone()))?;

    // Already-set cells mean a previous call won
    let _ = REGISTRY.set(registry);
    let _ = STAGE_RUNS_TOTAL.set(stage_runs_total);
    let _ = STAGE_DURATION.set(stage_duration);
    let _ = JOBS_SUBMITTED_TOTAL.set(jobs_submitted_total);
    let _ = JOB_COMPLETIONS_TOTAL.set(job_completions_total);
    let _ = ALERTS_TOTAL.set(alerts_total);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = OUTSTANDING_JOBS.set(outstanding_jobs);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
