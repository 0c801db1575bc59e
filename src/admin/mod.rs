//! Administrative operations on the statistics cache.
//!
//! Every operation returns an [`AdminResponse`] rather than an error so the
//! caller (CLI or the service's HTTP routes) can show the message as-is.
//! Work that runs a stage is handed to the stage queue so it is serialized
//! with the service's own runs. Without a queue only registry edits are
//! made and stage-running operations are refused.

use std::sync::Arc;

use serde::Serialize;

use crate::error::CacheError;
use crate::pipeline::{CachePipeline, ClearReport, ClearTarget};
use crate::registry::{
    ensure_singleton, find_repertoire, find_study, CacheSingleton,
    RepertoireCacheEntry, StudyCacheEntry, StudyFilter,
};
use crate::scheduler::{enqueue_stage, StageJob, StageQueue};

/// Outcome of an administrative operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> AdminResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    fn from_result(result: Result<(String, T), CacheError>) -> Self {
        match result {
            Ok((message, data)) => Self::ok(message, data),
            Err(e) => {
                tracing::warn!(error = %e, kind = %e.kind(), "Admin operation failed");
                Self::failed(e.to_string())
            }
        }
    }
}

/// Administrative façade over the pipeline and the stage queue.
pub struct AdminService {
    pipeline: Arc<CachePipeline>,
    queue: Option<Arc<dyn StageQueue>>,
}

impl AdminService {
    pub fn new(pipeline: Arc<CachePipeline>, queue: Arc<dyn StageQueue>) -> Self {
        Self {
            pipeline,
            queue: Some(queue),
        }
    }

    /// Service without a stage queue, limited to registry edits.
    pub fn direct(pipeline: Arc<CachePipeline>) -> Self {
        Self {
            pipeline,
            queue: None,
        }
    }

    pub async fn enable(&self) -> AdminResponse<CacheSingleton> {
        AdminResponse::from_result(self.set_enabled(true).await)
    }

    pub async fn disable(&self) -> AdminResponse<CacheSingleton> {
        AdminResponse::from_result(self.set_enabled(false).await)
    }

    /// Runs discovery and the submit-or-poll check now.
    pub async fn trigger(&self) -> AdminResponse<CacheSingleton> {
        AdminResponse::from_result(self.run_trigger().await)
    }

    /// Study entries, optionally restricted to one repository.
    pub async fn list_studies(
        &self,
        repository_id: Option<&str>,
    ) -> AdminResponse<Vec<StudyCacheEntry>> {
        let filter = match repository_id {
            Some(id) => StudyFilter::for_repository(id),
            None => StudyFilter::new(),
        };
        let result = self
            .pipeline
            .registry()
            .list_study_entries(&filter)
            .await
            .map(|studies| (format!("{} study entries", studies.len()), studies))
            .map_err(CacheError::from);
        AdminResponse::from_result(result)
    }

    /// Sets a study's caching intent, optionally reconciling right away.
    pub async fn set_study_should_cache(
        &self,
        repository_id: &str,
        study_id: &str,
        should_cache: bool,
        reconcile: bool,
    ) -> AdminResponse<StudyCacheEntry> {
        AdminResponse::from_result(
            self.update_study(repository_id, study_id, should_cache, reconcile)
                .await,
        )
    }

    /// Sets a repertoire's caching intent and refreshes its study aggregate.
    pub async fn set_repertoire_should_cache(
        &self,
        repertoire_id: &str,
        should_cache: bool,
    ) -> AdminResponse<RepertoireCacheEntry> {
        AdminResponse::from_result(self.update_repertoire(repertoire_id, should_cache).await)
    }

    pub async fn clear_study(
        &self,
        repository_id: &str,
        study_id: &str,
    ) -> AdminResponse<ClearReport> {
        let result = match find_study(self.pipeline.registry().as_ref(), repository_id, study_id)
            .await
        {
            Ok(study) => {
                self.dispatch_clear(
                    ClearTarget::Study(study.id),
                    format!("study {}/{}", repository_id, study_id),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };
        AdminResponse::from_result(result)
    }

    pub async fn clear_repertoire(&self, repertoire_id: &str) -> AdminResponse<ClearReport> {
        let result = match find_repertoire(self.pipeline.registry().as_ref(), repertoire_id).await
        {
            Ok(entry) => {
                self.dispatch_clear(
                    ClearTarget::Repertoire(entry.id),
                    format!("repertoire {}", repertoire_id),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };
        AdminResponse::from_result(result)
    }

    async fn run_trigger(&self) -> Result<(String, CacheSingleton), CacheError> {
        let queue = self.require_queue("trigger")?;
        let registry = self.pipeline.registry();
        let singleton = ensure_singleton(registry.as_ref()).await?;
        if !singleton.enable_cache {
            return Ok(("statistics cache is disabled".to_string(), singleton));
        }

        for job in [StageJob::Bootstrap, StageJob::Discover, StageJob::Check] {
            enqueue(queue, job).await?;
        }
        Ok(("statistics cache triggered".to_string(), singleton))
    }

    async fn update_study(
        &self,
        repository_id: &str,
        study_id: &str,
        should_cache: bool,
        reconcile: bool,
    ) -> Result<(String, StudyCacheEntry), CacheError> {
        let queue = if reconcile {
            Some(self.require_queue("reconcile")?)
        } else {
            None
        };
        let registry = self.pipeline.registry();
        let mut study = find_study(registry.as_ref(), repository_id, study_id).await?;
        registry.set_should_cache(study.id, should_cache).await?;
        study.should_cache = should_cache;
        tracing::info!(
            repository_id = %repository_id,
            study_id = %study_id,
            should_cache,
            "Study caching intent updated"
        );

        let mut message = format!(
            "study {}/{} should_cache set to {}",
            repository_id, study_id, should_cache
        );
        if let Some(queue) = queue {
            enqueue(queue, StageJob::Discover).await?;
            message.push_str(", reconciliation requested");
        }
        Ok((message, study))
    }

    async fn update_repertoire(
        &self,
        repertoire_id: &str,
        should_cache: bool,
    ) -> Result<(String, RepertoireCacheEntry), CacheError> {
        let registry = self.pipeline.registry();
        let mut entry = find_repertoire(registry.as_ref(), repertoire_id).await?;
        registry.set_should_cache(entry.id, should_cache).await?;
        entry.should_cache = should_cache;

        let study = find_study(registry.as_ref(), &entry.repository_id, &entry.study_id).await?;
        self.pipeline.refresh_study_aggregate(study).await?;

        tracing::info!(repertoire_id = %repertoire_id, should_cache, "Repertoire caching intent updated");
        Ok((
            format!("repertoire {} should_cache set to {}", repertoire_id, should_cache),
            entry,
        ))
    }

    async fn dispatch_clear(
        &self,
        target: ClearTarget,
        label: String,
    ) -> Result<(String, ClearReport), CacheError> {
        let queue = self.require_queue("clear")?;
        enqueue(queue, StageJob::Clear(target)).await?;
        Ok((
            format!("clear of {} accepted", label),
            ClearReport {
                found: true,
                repertoires_cleared: 0,
            },
        ))
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(String, CacheSingleton), CacheError> {
        // Turning on has to re-register the periodic triggers
        let queue = if enabled {
            Some(self.require_queue("enable")?)
        } else {
            self.queue.as_ref()
        };
        let registry = self.pipeline.registry();
        ensure_singleton(registry.as_ref()).await?;
        registry.set_cache_enabled(enabled).await?;
        tracing::info!(enabled, "Statistics cache switch updated");

        if let Some(queue) = queue {
            enqueue(queue, StageJob::Bootstrap).await?;
        }
        let singleton = ensure_singleton(registry.as_ref()).await?;
        let state = if enabled { "enabled" } else { "disabled" };
        Ok((format!("statistics cache {}", state), singleton))
    }

    fn require_queue(&self, operation: &'static str) -> Result<&Arc<dyn StageQueue>, CacheError> {
        self.queue
            .as_ref()
            .ok_or(CacheError::QueueRequired(operation))
    }
}

async fn enqueue(queue: &Arc<dyn StageQueue>, job: StageJob) -> Result<(), CacheError> {
    enqueue_stage(queue.as_ref(), job)
        .await
        .map(|_| ())
        .map_err(|e| CacheError::Queue(e.to_string()))
}
