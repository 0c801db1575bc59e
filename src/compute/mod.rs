//! Remote compute collaborator.
//!
//! The remote platform owns the upstream download cache listings, the file
//! storage holding job inputs and outputs, and the batch scheduler that
//! runs statistics jobs. This module describes that boundary:
//!
//! - [`ComputeClient`]: the trait every pipeline stage talks to
//! - [`JobSpec`] / [`JobStatusReport`]: job submission and status model
//! - [`CachePaths`]: where inputs, archives and artifacts live
//! - [`HttpComputeClient`]: reqwest implementation of the trait

pub mod http;
pub mod job;
pub mod paths;

pub use http::HttpComputeClient;
pub use job::{
    format_run_time, JobInputs, JobNotification, JobParameters, JobSpec, JobStatusReport,
    JobTemplate, RemoteJobStatus,
};
pub use paths::{CachePaths, STATISTICS_ARTIFACT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// A study the upstream download cache can serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheableStudy {
    pub study_id: String,
    pub download_cache_id: String,
}

/// A repertoire the upstream download cache can serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheableRepertoire {
    pub repertoire_id: String,
    pub cache_ref: String,
}

/// Operations consumed from the remote compute platform.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn list_cacheable_studies(
        &self,
        repository_id: &str,
    ) -> Result<Vec<CacheableStudy>, ComputeError>;

    async fn list_cacheable_repertoires(
        &self,
        repository_id: &str,
        study_id: &str,
    ) -> Result<Vec<CacheableRepertoire>, ComputeError>;

    /// Creates a directory if missing. Succeeds if it already exists.
    async fn ensure_directory(&self, path: &str) -> Result<(), ComputeError>;

    /// Submits a job and returns its identifier.
    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ComputeError>;

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, ComputeError>;

    /// Reads a file. `Ok(None)` when the file does not exist.
    async fn read_artifact(&self, path: &str) -> Result<Option<Vec<u8>>, ComputeError>;

    /// Deletes a file or directory tree. Succeeds if it is already gone.
    async fn delete_artifact(&self, path: &str) -> Result<(), ComputeError>;
}
