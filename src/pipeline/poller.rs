//! Fallback status polling for outstanding jobs.

use serde::Serialize;

use super::completion::CompletionEvent;
use super::orchestrator::CachePipeline;
use super::stage::{Stage, StageGuard};
use crate::error::CacheError;
use crate::registry::{CacheSingleton, RepertoireFilter};

/// Result of one polling pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResult {
    pub singleton: CacheSingleton,
    pub outstanding: usize,
    pub completed: usize,
    pub failed: usize,
}

impl CachePipeline {
    /// Checks every entry with a job id and completes the terminal ones.
    ///
    /// With nothing outstanding, clears `jobs_submitted` so the next check
    /// submits a new batch. A failed status query is alerted and polling
    /// moves on to the next entry.
    pub async fn poll(&self, singleton: CacheSingleton) -> Result<PollResult, CacheError> {
        let guard = StageGuard::new(Stage::Poll, self.alerter.as_ref());
        let mut result = PollResult {
            singleton,
            outstanding: 0,
            completed: 0,
            failed: 0,
        };

        let outcome = self.poll_outstanding(&guard, &mut result).await;
        guard.complete(&outcome);
        outcome.map(|_| result)
    }

    async fn poll_outstanding(
        &self,
        guard: &StageGuard<'_>,
        result: &mut PollResult,
    ) -> Result<(), CacheError> {
        let outstanding = guard
            .check(
                "list outstanding jobs",
                self.registry
                    .list_repertoire_entries(&RepertoireFilter::outstanding())
                    .await,
            )
            .await?;
        result.outstanding = outstanding.len();
        self.metrics.update_outstanding_jobs(outstanding.len());

        if outstanding.is_empty() {
            if result.singleton.jobs_submitted {
                tracing::info!("No outstanding jobs, clearing submission flag");
                guard
                    .check(
                        "clear submission flag",
                        self.registry.set_jobs_submitted(false).await,
                    )
                    .await?;
                result.singleton.jobs_submitted = false;
            }
            return Ok(());
        }

        for entry in outstanding {
            let Some(job_id) = entry.statistics_job_id.as_deref() else {
                continue;
            };
            let context = format!("job {} for repertoire {}", job_id, entry.repertoire_id);
            let report = match guard
                .check(&context, self.compute.get_job_status(job_id).await)
                .await
            {
                Ok(report) => report,
                Err(_) => {
                    result.failed += 1;
                    continue;
                }
            };

            if !report.status.is_terminal() {
                tracing::debug!(job_id = %job_id, status = %report.status, "Job still running");
                continue;
            }

            match self
                .finish(CompletionEvent::from_report(entry.id, report))
                .await
            {
                Ok(_) => result.completed += 1,
                Err(_) => result.failed += 1,
            }
        }

        tracing::info!(
            outstanding = result.outstanding,
            completed = result.completed,
            failed = result.failed,
            "Polling pass complete"
        );
        Ok(())
    }
}
