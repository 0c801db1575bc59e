//! Handles terminal job events, from the webhook or the poller.
//!
//! Handling is idempotent per (entry, job id): once the entry's job id is
//! cleared, a repeated event for the same job is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::budget::TimeoutDecision;
use super::orchestrator::{AtomicStats, CachePipeline};
use super::stage::{Stage, StageGuard};
use crate::alert::AlertKind;
use crate::compute::{JobStatusReport, RemoteJobStatus};
use crate::error::CacheError;
use crate::registry::{find_study, CacheRecord, RepertoireCacheEntry};

/// Where a completion event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    Poller,
}

/// A job status notification for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub cache_id: Uuid,
    pub status: RemoteJobStatus,
    /// Job the notification is about, when the sender reports it.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Authoritative status already fetched by the sender.
    #[serde(default)]
    pub report: Option<JobStatusReport>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub source: EventSource,
}

impl CompletionEvent {
    /// Event built from webhook query parameters.
    pub fn from_webhook(cache_id: Uuid, status: RemoteJobStatus) -> Self {
        Self {
            cache_id,
            status,
            job_id: None,
            report: None,
            event: None,
            error: None,
            source: EventSource::Webhook,
        }
    }

    /// Event built from a status the poller fetched.
    pub fn from_report(cache_id: Uuid, report: JobStatusReport) -> Self {
        Self {
            cache_id,
            status: report.status,
            job_id: Some(report.id.clone()),
            report: Some(report),
            event: None,
            error: None,
            source: EventSource::Poller,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Why an event was dropped without changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NonTerminal,
    MissingEntry,
    NoJob,
    JobMismatch,
}

/// What a completion event did to its entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CompletionOutcome {
    Cached,
    RetryScheduled { time_multiplier: u32 },
    Disabled { reason: String },
    Ignored { reason: IgnoreReason },
}

impl CompletionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CompletionOutcome::Cached => "cached",
            CompletionOutcome::RetryScheduled { .. } => "retry",
            CompletionOutcome::Disabled { .. } => "disabled",
            CompletionOutcome::Ignored { .. } => "ignored",
        }
    }

    fn ignored(reason: IgnoreReason) -> Self {
        CompletionOutcome::Ignored { reason }
    }
}

impl CachePipeline {
    /// Applies a terminal job event to its repertoire entry.
    pub async fn finish(&self, event: CompletionEvent) -> Result<CompletionOutcome, CacheError> {
        let _serial = self.finish_lock.lock().await;
        let guard = StageGuard::new(Stage::Finish, self.alerter.as_ref());

        let result = self.handle_event(&guard, event).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_completion(outcome.label());
                guard.finish(outcome.label());
            }
            Err(_) => guard.complete(&result),
        }
        result
    }

    async fn handle_event(
        &self,
        guard: &StageGuard<'_>,
        event: CompletionEvent,
    ) -> Result<CompletionOutcome, CacheError> {
        if !event.status.is_terminal() {
            tracing::debug!(
                cache_id = %event.cache_id,
                status = %event.status,
                "Ignoring non-terminal job status"
            );
            return Ok(CompletionOutcome::ignored(IgnoreReason::NonTerminal));
        }

        let context = format!("cache entry {}", event.cache_id);
        let record = guard
            .check(&context, self.registry.get_entry(event.cache_id).await)
            .await?;
        let Some(record) = record else {
            tracing::warn!(cache_id = %event.cache_id, "Completion for unknown cache entry");
            return Ok(CompletionOutcome::ignored(IgnoreReason::MissingEntry));
        };
        let entry = guard.check(&context, record.into_repertoire()).await?;

        let Some(job_id) = entry.statistics_job_id.clone() else {
            tracing::warn!(
                cache_id = %event.cache_id,
                status = %event.status,
                "Completion for entry without an outstanding job"
            );
            return Ok(CompletionOutcome::ignored(IgnoreReason::NoJob));
        };
        if let Some(reported) = event.job_id.as_deref() {
            if reported != job_id {
                tracing::warn!(
                    cache_id = %event.cache_id,
                    reported_job = %reported,
                    current_job = %job_id,
                    "Completion for a superseded job"
                );
                return Ok(CompletionOutcome::ignored(IgnoreReason::JobMismatch));
            }
        }

        let report = match event.report {
            Some(report) => report,
            None => {
                guard
                    .check(&context, self.compute.get_job_status(&job_id).await)
                    .await?
            }
        };
        if report.id != job_id {
            tracing::warn!(
                cache_id = %event.cache_id,
                reported_job = %report.id,
                current_job = %job_id,
                "Status report for a different job"
            );
            return Ok(CompletionOutcome::ignored(IgnoreReason::JobMismatch));
        }

        tracing::info!(
            cache_id = %entry.id,
            repertoire_id = %entry.repertoire_id,
            job_id = %job_id,
            status = %report.status,
            source = ?event.source,
            "Handling job completion"
        );

        match report.status {
            RemoteJobStatus::Finished => self.ingest(guard, entry).await,
            RemoteJobStatus::Failed => self.handle_failure(guard, entry, &report).await,
            _ => {
                tracing::debug!(job_id = %job_id, status = %report.status, "Job not yet terminal");
                Ok(CompletionOutcome::ignored(IgnoreReason::NonTerminal))
            }
        }
    }

    async fn ingest(
        &self,
        guard: &StageGuard<'_>,
        mut entry: RepertoireCacheEntry,
    ) -> Result<CompletionOutcome, CacheError> {
        let context = format!("repertoire {}", entry.repertoire_id);
        let study = guard
            .check(
                &context,
                find_study(self.registry.as_ref(), &entry.repository_id, &entry.study_id).await,
            )
            .await?;

        let path = self
            .paths
            .artifact(&study.download_cache_id, &entry.repertoire_id);
        let bytes = guard
            .check(&context, self.compute.read_artifact(&path).await)
            .await?;

        let statistics = match bytes {
            None => None,
            Some(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Null) => None,
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Statistics artifact is not JSON");
                    None
                }
            },
        };

        let Some(statistics) = statistics else {
            let reason = format!("missing or unreadable statistics artifact {}", path);
            return self.disable(guard, entry, reason).await;
        };

        guard
            .check(
                &context,
                self.statistics
                    .record_statistics(&entry.repertoire_id, &statistics)
                    .await,
            )
            .await?;

        entry.is_cached = true;
        entry.statistics_job_id = None;
        guard
            .check(
                &context,
                self.registry
                    .update_entry(&CacheRecord::Repertoire(entry.clone()))
                    .await,
            )
            .await?;
        tracing::info!(repertoire_id = %entry.repertoire_id, "Repertoire statistics cached");
        AtomicStats::add(&self.stats.repertoires_cached, 1);

        guard
            .check(&context, self.refresh_study_aggregate(study).await)
            .await?;
        Ok(CompletionOutcome::Cached)
    }

    async fn handle_failure(
        &self,
        guard: &StageGuard<'_>,
        mut entry: RepertoireCacheEntry,
        report: &JobStatusReport,
    ) -> Result<CompletionOutcome, CacheError> {
        let message = report
            .last_status_message
            .clone()
            .unwrap_or_else(|| "no status message".to_string());

        if !report.is_timeout() {
            let reason = format!("job {} failed: {}", report.id, message);
            return self.disable(guard, entry, reason).await;
        }

        // The platform's own record of the granted hours wins when present
        let ran_at_cap = report
            .max_hours
            .is_some_and(|hours| hours >= self.budget.max_hours());
        let decision = if ran_at_cap {
            TimeoutDecision::Disable
        } else {
            self.budget.on_timeout(entry.time_multiplier)
        };

        match decision {
            TimeoutDecision::Disable => {
                let reason = format!(
                    "job {} timed out at the {} hour cap",
                    report.id,
                    self.budget.max_hours()
                );
                self.disable(guard, entry, reason).await
            }
            TimeoutDecision::Retry { time_multiplier } => {
                let context = format!("repertoire {}", entry.repertoire_id);
                entry.time_multiplier = time_multiplier;
                entry.statistics_job_id = None;
                guard
                    .check(
                        &context,
                        self.registry
                            .update_entry(&CacheRecord::Repertoire(entry.clone()))
                            .await,
                    )
                    .await?;

                let hours = self.budget.hours_for(time_multiplier);
                tracing::warn!(
                    repertoire_id = %entry.repertoire_id,
                    time_multiplier,
                    hours,
                    "Job timed out, rescheduling with a larger budget"
                );
                guard
                    .alert(
                        AlertKind::JobRetry,
                        format!(
                            "repertoire {} timed out, retrying with {} hours",
                            entry.repertoire_id, hours
                        ),
                    )
                    .await;
                AtomicStats::add(&self.stats.retries_scheduled, 1);
                Ok(CompletionOutcome::RetryScheduled { time_multiplier })
            }
        }
    }

    /// Turns caching off for an entry. `is_cached` is left as it was.
    async fn disable(
        &self,
        guard: &StageGuard<'_>,
        mut entry: RepertoireCacheEntry,
        reason: String,
    ) -> Result<CompletionOutcome, CacheError> {
        let context = format!("repertoire {}", entry.repertoire_id);
        entry.should_cache = false;
        entry.statistics_job_id = None;
        guard
            .check(
                &context,
                self.registry
                    .update_entry(&CacheRecord::Repertoire(entry.clone()))
                    .await,
            )
            .await?;

        tracing::warn!(repertoire_id = %entry.repertoire_id, reason = %reason, "Caching disabled");
        guard
            .alert(
                AlertKind::JobFailure,
                format!("repertoire {} disabled: {}", entry.repertoire_id, reason),
            )
            .await;
        AtomicStats::add(&self.stats.repertoires_disabled, 1);

        let study = guard
            .check(
                &context,
                find_study(self.registry.as_ref(), &entry.repository_id, &entry.study_id).await,
            )
            .await?;
        guard
            .check(&context, self.refresh_study_aggregate(study).await)
            .await?;

        Ok(CompletionOutcome::Disabled { reason })
    }
}
