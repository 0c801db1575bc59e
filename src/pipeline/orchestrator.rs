//! The cache pipeline: collaborators plus the state shared by every stage.
//!
//! Stage bodies live in sibling modules as `impl CachePipeline` blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::budget::TimeBudget;
use super::config::{CacheConfig, ConfigError};
use crate::alert::Alerter;
use crate::compute::{CachePaths, ComputeClient, JobTemplate};
use crate::metrics::MetricsCollector;
use crate::registry::CacheRegistry;
use crate::storage::StatisticsStore;

/// Counters since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub discovery_passes: u64,
    pub studies_created: u64,
    pub repertoires_created: u64,
    pub jobs_submitted: u64,
    pub repertoires_cached: u64,
    pub retries_scheduled: u64,
    pub repertoires_disabled: u64,
    pub entries_cleared: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub discovery_passes: AtomicU64,
    pub studies_created: AtomicU64,
    pub repertoires_created: AtomicU64,
    pub jobs_submitted: AtomicU64,
    pub repertoires_cached: AtomicU64,
    pub retries_scheduled: AtomicU64,
    pub repertoires_disabled: AtomicU64,
    pub entries_cleared: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            discovery_passes: self.discovery_passes.load(Ordering::Relaxed),
            studies_created: self.studies_created.load(Ordering::Relaxed),
            repertoires_created: self.repertoires_created.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            repertoires_cached: self.repertoires_cached.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            repertoires_disabled: self.repertoires_disabled.load(Ordering::Relaxed),
            entries_cleared: self.entries_cleared.load(Ordering::Relaxed),
        }
    }
}

/// Reconciles, submits, completes and clears statistics cache entries.
pub struct CachePipeline {
    pub(crate) config: CacheConfig,
    pub(crate) registry: Arc<dyn CacheRegistry>,
    pub(crate) compute: Arc<dyn ComputeClient>,
    pub(crate) statistics: Arc<dyn StatisticsStore>,
    pub(crate) alerter: Arc<dyn Alerter>,
    pub(crate) budget: TimeBudget,
    pub(crate) paths: CachePaths,
    pub(crate) template: JobTemplate,
    pub(crate) metrics: MetricsCollector,
    pub(crate) stats: AtomicStats,
    /// Completion handling is serialized across webhook and poller callers.
    pub(crate) finish_lock: Mutex<()>,
}

impl CachePipeline {
    /// Creates a pipeline over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn new(
        config: CacheConfig,
        registry: Arc<dyn CacheRegistry>,
        compute: Arc<dyn ComputeClient>,
        statistics: Arc<dyn StatisticsStore>,
        alerter: Arc<dyn Alerter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            budget: TimeBudget::new(config.base_job_hours, config.max_job_hours),
            paths: config.paths(),
            template: config.job_template(),
            config,
            registry,
            compute,
            statistics,
            alerter,
            metrics: MetricsCollector::new(),
            stats: AtomicStats::default(),
            finish_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn CacheRegistry> {
        &self.registry
    }

    pub fn compute(&self) -> &Arc<dyn ComputeClient> {
        &self.compute
    }

    pub fn alerter(&self) -> &Arc<dyn Alerter> {
        &self.alerter
    }

    pub fn budget(&self) -> TimeBudget {
        self.budget
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }
}
