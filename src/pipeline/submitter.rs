//! Submits statistics jobs for pending repertoire entries.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::orchestrator::{AtomicStats, CachePipeline};
use super::stage::{Stage, StageGuard};
use crate::error::CacheError;
use crate::registry::{
    find_study, CacheRecord, CacheSingleton, RepertoireCacheEntry, RepertoireFilter,
    StudyCacheEntry,
};

/// Result of one submission pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    /// Singleton the pass started from, with the flag it wrote.
    pub singleton: CacheSingleton,
    /// Cache entries that received a job in this pass.
    pub submitted: Vec<Uuid>,
}

impl CachePipeline {
    /// Selects up to the free job capacity of pending entries and submits
    /// one job each.
    ///
    /// `jobs_submitted` is set and persisted before the first job goes out.
    /// Any failure aborts the rest of the batch; jobs already submitted keep
    /// their recorded ids.
    pub async fn submit(&self, singleton: CacheSingleton) -> Result<SubmissionResult, CacheError> {
        let guard = StageGuard::new(Stage::Submit, self.alerter.as_ref());
        let mut result = SubmissionResult {
            singleton,
            submitted: Vec::new(),
        };

        if !result.singleton.enable_cache {
            tracing::info!("Statistics cache disabled, skipping submission");
            guard.finish("skipped");
            return Ok(result);
        }
        if result.singleton.jobs_submitted {
            tracing::debug!("Jobs already outstanding, skipping submission");
            guard.finish("skipped");
            return Ok(result);
        }

        let outcome = self.submit_batch(&guard, &mut result).await;
        guard.complete(&outcome);
        outcome.map(|_| result)
    }

    async fn submit_batch(
        &self,
        guard: &StageGuard<'_>,
        result: &mut SubmissionResult,
    ) -> Result<(), CacheError> {
        let outstanding = guard
            .check(
                "count outstanding jobs",
                self.registry
                    .list_repertoire_entries(&RepertoireFilter::outstanding())
                    .await,
            )
            .await?
            .len();
        let capacity = self.config.max_jobs.saturating_sub(outstanding);

        let pending = if capacity == 0 {
            Vec::new()
        } else {
            guard
                .check(
                    "select pending entries",
                    self.registry
                        .list_repertoire_entries(&RepertoireFilter::pending().with_limit(capacity))
                        .await,
                )
                .await?
        };

        if pending.is_empty() {
            if outstanding > 0 {
                // Jobs exist without the flag; hand them to the poller.
                tracing::warn!(outstanding, "Outstanding jobs found with flag cleared");
                guard
                    .check(
                        "set submission flag",
                        self.registry.set_jobs_submitted(true).await,
                    )
                    .await?;
                result.singleton.jobs_submitted = true;
            } else {
                tracing::debug!("No pending repertoire entries");
            }
            return Ok(());
        }

        guard
            .check(
                "set submission flag",
                self.registry.set_jobs_submitted(true).await,
            )
            .await?;
        result.singleton.jobs_submitted = true;

        tracing::info!(
            selected = pending.len(),
            outstanding,
            max_jobs = self.config.max_jobs,
            "Submitting statistics jobs"
        );

        let mut studies: HashMap<(String, String), StudyCacheEntry> = HashMap::new();
        for entry in pending {
            let key = (entry.repository_id.clone(), entry.study_id.clone());
            let study = match studies.get(&key) {
                Some(study) => study.clone(),
                None => {
                    let study = guard
                        .check(
                            "find study",
                            find_study(self.registry.as_ref(), &key.0, &key.1).await,
                        )
                        .await?;
                    studies.insert(key, study.clone());
                    study
                }
            };

            let id = self.submit_entry(guard, &study, entry).await?;
            result.submitted.push(id);
        }

        AtomicStats::add(&self.stats.jobs_submitted, result.submitted.len());
        Ok(())
    }

    async fn submit_entry(
        &self,
        guard: &StageGuard<'_>,
        study: &StudyCacheEntry,
        mut entry: RepertoireCacheEntry,
    ) -> Result<Uuid, CacheError> {
        let context = format!("repertoire {}", entry.repertoire_id);

        guard
            .check(
                &context,
                self.compute
                    .ensure_directory(&self.paths.study_dir(&study.download_cache_id))
                    .await,
            )
            .await?;
        guard
            .check(
                &context,
                self.compute
                    .ensure_directory(
                        &self
                            .paths
                            .repertoire_dir(&study.download_cache_id, &entry.repertoire_id),
                    )
                    .await,
            )
            .await?;

        let hours = self.budget.hours_for(entry.time_multiplier);
        let spec = self.template.build(
            &entry.id.to_string(),
            &study.download_cache_id,
            &entry.repertoire_id,
            hours,
        );

        let job_id = guard
            .check(&context, self.compute.submit_job(&spec).await)
            .await?;

        tracing::info!(
            repertoire_id = %entry.repertoire_id,
            job_id = %job_id,
            max_run_time = %spec.max_run_time,
            "Submitted statistics job"
        );

        entry.statistics_job_id = Some(job_id);
        let id = entry.id;
        guard
            .check(
                &context,
                self.registry
                    .update_entry(&CacheRecord::Repertoire(entry))
                    .await,
            )
            .await?;
        self.metrics.record_job_submitted();
        Ok(id)
    }
}
