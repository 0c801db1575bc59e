//! Prometheus-based monitoring for the statistics cache.
//!
//! # Example
//!
//! ```ignore
//! use stats_cache::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! MetricsCollector::new().record_stage("poll", "success", 0.8);
//! let text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use self::prometheus::{export_metrics, init_metrics, metrics_handler};

pub use self::prometheus::{
    ALERTS_TOTAL, JOBS_SUBMITTED_TOTAL, JOB_COMPLETIONS_TOTAL, OUTSTANDING_JOBS, QUEUE_DEPTH,
    REGISTRY, STAGE_DURATION, STAGE_RUNS_TOTAL,
};
