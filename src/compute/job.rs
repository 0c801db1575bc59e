//! Remote job specification and status model.

use serde::{Deserialize, Serialize};

use super::paths::CachePaths;

/// Name given to every statistics job.
pub const JOB_NAME: &str = "statistics cache";

/// Status reported by the remote compute platform.
///
/// Only `Finished` and `Failed` are terminal. Statuses this crate does not
/// know about deserialize to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteJobStatus {
    Pending,
    Queued,
    StagingInputs,
    Running,
    Archiving,
    Finished,
    Failed,
    #[serde(other)]
    Other,
}

impl RemoteJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteJobStatus::Finished | RemoteJobStatus::Failed)
    }

    /// Parses a status string as received on the webhook query string.
    pub fn parse(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.trim().to_uppercase()))
            .unwrap_or(RemoteJobStatus::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteJobStatus::Pending => "PENDING",
            RemoteJobStatus::Queued => "QUEUED",
            RemoteJobStatus::StagingInputs => "STAGING_INPUTS",
            RemoteJobStatus::Running => "RUNNING",
            RemoteJobStatus::Archiving => "ARCHIVING",
            RemoteJobStatus::Finished => "FINISHED",
            RemoteJobStatus::Failed => "FAILED",
            RemoteJobStatus::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub id: String,
    pub status: RemoteJobStatus,
    #[serde(default)]
    pub last_status_message: Option<String>,
    /// Wall-clock budget the job ran with, when the platform reports it.
    #[serde(default)]
    pub max_hours: Option<u32>,
}

impl JobStatusReport {
    pub fn new(id: impl Into<String>, status: RemoteJobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            last_status_message: None,
            max_hours: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.last_status_message = Some(message.into());
        self
    }

    /// True when the last status message reports a wall-clock timeout.
    pub fn is_timeout(&self) -> bool {
        self.last_status_message
            .as_deref()
            .map(|m| m.to_uppercase().contains("TIMEOUT"))
            .unwrap_or(false)
    }
}

/// Job inputs: the study metadata and the repertoire's rearrangement file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInputs {
    pub metadata_file: String,
    pub airr_tsv_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub creator: String,
    pub file_type: String,
    pub repertoire_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPolicy {
    pub save_on_failure: bool,
}

/// Callback registration delivered with the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    pub url: String,
    pub event: String,
    pub persistent: bool,
    pub policy: NotificationPolicy,
}

impl JobNotification {
    /// Notifies on every event; the platform substitutes the `${...}` macros.
    pub fn every_event(callback_base: &str, cache_uuid: &str) -> Self {
        Self {
            url: format!(
                "{}/stats/notify/{}?status=${{JOB_STATUS}}&event=${{EVENT}}&error=${{JOB_ERROR}}&job_id=${{JOB_ID}}",
                callback_base.trim_end_matches('/'),
                cache_uuid
            ),
            event: "*".to_string(),
            persistent: true,
            policy: NotificationPolicy {
                save_on_failure: true,
            },
        }
    }
}

/// Batch job submitted to the remote compute platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    pub app_id: String,
    pub batch_queue: String,
    /// Wall-clock limit formatted `HH:00:00`.
    pub max_run_time: String,
    pub node_count: u32,
    pub archive: bool,
    pub archive_system: String,
    pub archive_path: String,
    pub inputs: JobInputs,
    pub parameters: JobParameters,
    pub notifications: Vec<JobNotification>,
}

/// Static settings shared by every job spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub app_id: String,
    pub batch_queue: String,
    pub storage_system: String,
    pub callback_url: String,
    pub paths: CachePaths,
}

impl JobTemplate {
    /// Builds the job computing statistics for one repertoire.
    pub fn build(
        &self,
        cache_uuid: &str,
        download_cache_id: &str,
        repertoire_id: &str,
        max_hours: u32,
    ) -> JobSpec {
        JobSpec {
            name: JOB_NAME.to_string(),
            app_id: self.app_id.clone(),
            batch_queue: self.batch_queue.clone(),
            max_run_time: format_run_time(max_hours),
            node_count: 1,
            archive: true,
            archive_system: self.storage_system.clone(),
            archive_path: self.paths.repertoire_dir(download_cache_id, repertoire_id),
            inputs: JobInputs {
                metadata_file: self.paths.metadata_input(download_cache_id),
                airr_tsv_file: self.paths.rearrangement_input(download_cache_id, repertoire_id),
            },
            parameters: JobParameters {
                creator: "statistics_cache".to_string(),
                file_type: "rearrangement".to_string(),
                repertoire_id: repertoire_id.to_string(),
            },
            notifications: vec![JobNotification::every_event(&self.callback_url, cache_uuid)],
        }
    }
}

/// Formats whole hours as `HH:00:00`.
pub fn format_run_time(hours: u32) -> String {
    format!("{:02}:00:00", hours)
}
