//! Runs one stage job against the pipeline.
//!
//! Bootstrap and Check live here because they drive the scheduler rather
//! than registry state: Bootstrap (re)registers or cancels the periodic
//! tasks, Check chooses between Submit and Poll.

use std::sync::Arc;

use serde::Serialize;

use super::job::StageJob;
use super::periodic::{PeriodicScheduler, CHECK, DISCOVERY};
use super::queue::{enqueue_stage, StageQueue};
use crate::alert::AlertKind;
use crate::error::CacheError;
use crate::pipeline::{CachePipeline, CompletionOutcome, Stage, StageGuard};
use crate::registry::{ensure_singleton, CacheSingleton};

/// Summary of a stage run, for logs and admin responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum StageReport {
    Bootstrap { scheduled: bool },
    Discover { studies_created: usize, repertoires_created: usize, failed_repositories: usize },
    Check { next: Option<Stage> },
    Submit { submitted: usize },
    Poll { outstanding: usize, completed: usize },
    Finish { outcome: CompletionOutcome },
    Clear { repertoires_cleared: usize },
}

pub struct StageExecutor {
    pipeline: Arc<CachePipeline>,
    queue: Arc<dyn StageQueue>,
    periodic: Arc<PeriodicScheduler>,
}

impl StageExecutor {
    pub fn new(
        pipeline: Arc<CachePipeline>,
        queue: Arc<dyn StageQueue>,
        periodic: Arc<PeriodicScheduler>,
    ) -> Self {
        Self {
            pipeline,
            queue,
            periodic,
        }
    }

    pub fn pipeline(&self) -> &Arc<CachePipeline> {
        &self.pipeline
    }

    pub fn periodic(&self) -> &Arc<PeriodicScheduler> {
        &self.periodic
    }

    pub async fn run(&self, job: StageJob) -> Result<StageReport, CacheError> {
        match job {
            StageJob::Bootstrap => self.bootstrap().await,
            StageJob::Discover => {
                let singleton = self.singleton(Stage::Discover).await?;
                let report = self.pipeline.discover(&singleton).await?;
                Ok(StageReport::Discover {
                    studies_created: report.studies_created,
                    repertoires_created: report.repertoires_created,
                    failed_repositories: report.failed_repositories.len(),
                })
            }
            StageJob::Check => self.check().await,
            StageJob::Submit => {
                let singleton = self.singleton(Stage::Submit).await?;
                let result = self.pipeline.submit(singleton).await?;
                Ok(StageReport::Submit {
                    submitted: result.submitted.len(),
                })
            }
            StageJob::Poll => {
                let singleton = self.singleton(Stage::Poll).await?;
                let result = self.pipeline.poll(singleton).await?;
                Ok(StageReport::Poll {
                    outstanding: result.outstanding,
                    completed: result.completed,
                })
            }
            StageJob::Finish(event) => {
                let outcome = self.pipeline.finish(event).await?;
                Ok(StageReport::Finish { outcome })
            }
            StageJob::Clear(target) => {
                let report = self.pipeline.clear(target).await?;
                Ok(StageReport::Clear {
                    repertoires_cleared: report.repertoires_cleared,
                })
            }
        }
    }

    async fn singleton(&self, stage: Stage) -> Result<CacheSingleton, CacheError> {
        let guard = StageGuard::new(stage, self.pipeline.alerter().as_ref());
        guard
            .check(
                "load singleton",
                ensure_singleton(self.pipeline.registry().as_ref()).await,
            )
            .await
    }

    /// Applies the enable switches to the periodic schedule.
    async fn bootstrap(&self) -> Result<StageReport, CacheError> {
        let guard = StageGuard::new(Stage::Bootstrap, self.pipeline.alerter().as_ref());
        let config = self.pipeline.config();

        if !config.enabled {
            self.periodic.clear();
            tracing::info!("Statistics cache disabled by configuration");
            guard
                .alert(AlertKind::Lifecycle, "statistics cache disabled by configuration")
                .await;
            guard.finish("disabled");
            return Ok(StageReport::Bootstrap { scheduled: false });
        }

        let singleton = match self.singleton(Stage::Bootstrap).await {
            Ok(s) => s,
            Err(e) => {
                guard.finish(&e.kind().to_string());
                return Err(e);
            }
        };

        if !singleton.enable_cache {
            self.periodic.clear();
            tracing::info!("Statistics cache disabled");
            guard
                .alert(AlertKind::Lifecycle, "statistics cache disabled")
                .await;
            guard.finish("disabled");
            return Ok(StageReport::Bootstrap { scheduled: false });
        }

        self.periodic
            .upsert(DISCOVERY, config.discovery_interval, StageJob::Discover);
        self.periodic
            .upsert(CHECK, config.check_interval, StageJob::Check);
        tracing::info!(
            discovery_secs = config.discovery_interval.as_secs(),
            check_secs = config.check_interval.as_secs(),
            "Statistics cache scheduled"
        );
        guard
            .alert(AlertKind::Lifecycle, "statistics cache enabled")
            .await;
        guard.finish("success");
        Ok(StageReport::Bootstrap { scheduled: true })
    }

    /// Enqueues Poll while a batch is outstanding, Submit otherwise.
    async fn check(&self) -> Result<StageReport, CacheError> {
        let guard = StageGuard::new(Stage::Check, self.pipeline.alerter().as_ref());
        let singleton = self.singleton(Stage::Check).await?;

        if !singleton.enable_cache {
            tracing::debug!("Statistics cache disabled, skipping check");
            guard.finish("skipped");
            return Ok(StageReport::Check { next: None });
        }

        let (next, job) = if singleton.jobs_submitted {
            (Stage::Poll, StageJob::Poll)
        } else {
            (Stage::Submit, StageJob::Submit)
        };
        let enqueued = enqueue_stage(self.queue.as_ref(), job)
            .await
            .map_err(|e| CacheError::Queue(e.to_string()));
        let result = guard.check("enqueue next stage", enqueued).await;
        guard.complete(&result);
        result?;

        tracing::debug!(next = %next, "Check scheduled next stage");
        Ok(StageReport::Check { next: Some(next) })
    }
}
