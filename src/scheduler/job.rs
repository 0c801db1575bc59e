//! Stage jobs and the envelope they travel in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{ClearTarget, CompletionEvent, Stage};

/// Default number of deliveries before a job is dead-lettered.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unit of work for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "payload")]
pub enum StageJob {
    Bootstrap,
    Discover,
    Check,
    Submit,
    Poll,
    Finish(CompletionEvent),
    Clear(ClearTarget),
}

impl StageJob {
    pub fn stage(&self) -> Stage {
        match self {
            StageJob::Bootstrap => Stage::Bootstrap,
            StageJob::Discover => Stage::Discover,
            StageJob::Check => Stage::Check,
            StageJob::Submit => Stage::Submit,
            StageJob::Poll => Stage::Poll,
            StageJob::Finish(_) => Stage::Finish,
            StageJob::Clear(_) => Stage::Clear,
        }
    }
}

/// A stage job as stored in a queue.
///
/// `attempts` counts deliveries. It only grows when a job is recovered from
/// the processing list after a crash; stage failures are never redelivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: StageJob,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueuedJob {
    pub fn new(job: StageJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            created_at: Utc::now(),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn stage(&self) -> Stage {
        self.job.stage()
    }

    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

impl From<StageJob> for QueuedJob {
    fn from(job: StageJob) -> Self {
        QueuedJob::new(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::RemoteJobStatus;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(StageJob::Check.stage(), Stage::Check);
        let event = CompletionEvent::from_webhook(Uuid::nil(), RemoteJobStatus::Failed);
        assert_eq!(StageJob::Finish(event).stage(), Stage::Finish);
        assert_eq!(
            StageJob::Clear(ClearTarget::Study(Uuid::nil())).stage(),
            Stage::Clear
        );
    }

    #[test]
    fn test_unit_job_wire_format() {
        let json = serde_json::to_value(StageJob::Discover).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "discover"}));
    }

    #[test]
    fn test_finish_job_survives_queue_encoding() {
        let event = CompletionEvent::from_webhook(Uuid::new_v4(), RemoteJobStatus::Finished)
            .with_job_id("job-42");
        let queued = QueuedJob::new(StageJob::Finish(event.clone()));
        let data = serde_json::to_string(&queued).unwrap();
        let back: QueuedJob = serde_json::from_str(&data).unwrap();
        assert_eq!(back.id, queued.id);
        assert_eq!(back.job, StageJob::Finish(event));
    }

    #[test]
    fn test_attempts() {
        let mut job = QueuedJob::new(StageJob::Poll).with_max_attempts(2);
        assert!(job.should_retry());
        job.increment_attempts();
        job.increment_attempts();
        assert!(!job.should_retry());
    }
}
