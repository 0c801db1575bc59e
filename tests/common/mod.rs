//! Shared fixtures for the integration tests: a scriptable compute platform
//! and a pipeline wired over in-memory collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use stats_cache::alert::MemoryAlerter;
use stats_cache::compute::{
    CacheableRepertoire, CacheableStudy, ComputeClient, JobSpec, JobStatusReport, RemoteJobStatus,
};
use stats_cache::error::ComputeError;
use stats_cache::pipeline::{CacheConfig, CachePipeline};
use stats_cache::registry::{
    ensure_singleton, find_repertoire, find_study, CacheRecord, CacheSingleton, MemoryRegistry,
    RepertoireCacheEntry, RepositorySettings, StudyCacheEntry,
};
use stats_cache::storage::MemoryStatisticsStore;

#[derive(Default)]
struct ComputeState {
    studies: HashMap<String, Vec<CacheableStudy>>,
    repertoires: HashMap<(String, String), Vec<CacheableRepertoire>>,
    failing_repositories: HashSet<String>,
    submitted: Vec<JobSpec>,
    statuses: HashMap<String, JobStatusReport>,
    artifacts: HashMap<String, Vec<u8>>,
    directories: Vec<String>,
    deleted: Vec<String>,
    next_job: u64,
    submit_delay: Option<Duration>,
}

/// Compute platform double. Listings, job statuses and artifacts are set
/// by the test; submissions and deletions are recorded.
#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<ComputeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_study(&self, repository_id: &str, study_id: &str, download_cache_id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .studies
            .entry(repository_id.to_string())
            .or_default()
            .push(CacheableStudy {
                study_id: study_id.to_string(),
                download_cache_id: download_cache_id.to_string(),
            });
    }

    pub fn add_repertoire(&self, repository_id: &str, study_id: &str, repertoire_id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .repertoires
            .entry((repository_id.to_string(), study_id.to_string()))
            .or_default()
            .push(CacheableRepertoire {
                repertoire_id: repertoire_id.to_string(),
                cache_ref: format!("ref-{}", repertoire_id),
            });
    }

    /// Makes every listing for the repository fail.
    pub fn fail_repository(&self, repository_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_repositories
            .insert(repository_id.to_string());
    }

    pub fn set_status(&self, job_id: &str, status: RemoteJobStatus, message: Option<&str>) {
        let mut report = JobStatusReport::new(job_id, status);
        if let Some(message) = message {
            report = report.with_message(message);
        }
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(job_id.to_string(), report);
    }

    /// Makes every submission take `delay` before the platform answers.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().unwrap().submit_delay = Some(delay);
    }

    pub fn set_report(&self, report: JobStatusReport) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(report.id.clone(), report);
    }

    pub fn put_artifact(&self, path: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .artifacts
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn directories(&self) -> Vec<String> {
        self.state.lock().unwrap().directories.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl ComputeClient for FakeCompute {
    async fn list_cacheable_studies(
        &self,
        repository_id: &str,
    ) -> Result<Vec<CacheableStudy>, ComputeError> {
        let state = self.state.lock().unwrap();
        if state.failing_repositories.contains(repository_id) {
            return Err(ComputeError::RequestFailed(format!(
                "listing {} refused",
                repository_id
            )));
        }
        Ok(state.studies.get(repository_id).cloned().unwrap_or_default())
    }

    async fn list_cacheable_repertoires(
        &self,
        repository_id: &str,
        study_id: &str,
    ) -> Result<Vec<CacheableRepertoire>, ComputeError> {
        let state = self.state.lock().unwrap();
        if state.failing_repositories.contains(repository_id) {
            return Err(ComputeError::RequestFailed(format!(
                "listing {} refused",
                repository_id
            )));
        }
        Ok(state
            .repertoires
            .get(&(repository_id.to_string(), study_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), ComputeError> {
        let mut state = self.state.lock().unwrap();
        if !state.directories.iter().any(|d| d == path) {
            state.directories.push(path.to_string());
        }
        Ok(())
    }

    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ComputeError> {
        let delay = self.state.lock().unwrap().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.next_job += 1;
        let job_id = format!("job-{}", state.next_job);
        state.submitted.push(spec.clone());
        state.statuses.insert(
            job_id.clone(),
            JobStatusReport::new(&job_id, RemoteJobStatus::Pending),
        );
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, ComputeError> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(job_id)
            .cloned()
            .ok_or_else(|| ComputeError::JobNotFound(job_id.to_string()))
    }

    async fn read_artifact(&self, path: &str) -> Result<Option<Vec<u8>>, ComputeError> {
        Ok(self.state.lock().unwrap().artifacts.get(path).cloned())
    }

    async fn delete_artifact(&self, path: &str) -> Result<(), ComputeError> {
        let mut state = self.state.lock().unwrap();
        state.artifacts.retain(|p, _| !p.starts_with(path));
        state.deleted.push(path.to_string());
        Ok(())
    }
}

/// A pipeline over in-memory collaborators, with handles to each of them.
pub struct Harness {
    pub registry: Arc<MemoryRegistry>,
    pub compute: Arc<FakeCompute>,
    pub statistics: Arc<MemoryStatisticsStore>,
    pub alerter: Arc<MemoryAlerter>,
    pub pipeline: Arc<CachePipeline>,
}

pub fn test_config() -> CacheConfig {
    CacheConfig::new()
        .with_enabled(true)
        .with_max_jobs(10)
        .with_job_hours(1, 48)
        .with_cache_root("/cache")
        .with_callback_url("http://cache.test")
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let compute = Arc::new(FakeCompute::new());
        let statistics = Arc::new(MemoryStatisticsStore::new());
        let alerter = Arc::new(MemoryAlerter::new());
        let pipeline = CachePipeline::new(
            config,
            registry.clone(),
            compute.clone(),
            statistics.clone(),
            alerter.clone(),
        )
        .expect("test config should validate");

        Self {
            registry,
            compute,
            statistics,
            alerter,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn add_repository(&self, repository_id: &str) {
        self.registry
            .upsert_repository(RepositorySettings::new(repository_id));
    }

    pub async fn singleton(&self) -> CacheSingleton {
        ensure_singleton(self.registry.as_ref()).await.unwrap()
    }

    pub async fn study(&self, repository_id: &str, study_id: &str) -> StudyCacheEntry {
        find_study(self.registry.as_ref(), repository_id, study_id)
            .await
            .unwrap()
    }

    pub async fn repertoire(&self, repertoire_id: &str) -> RepertoireCacheEntry {
        find_repertoire(self.registry.as_ref(), repertoire_id)
            .await
            .unwrap()
    }

    /// Sets a study's intent directly, as an administrator would.
    pub async fn opt_in(&self, repository_id: &str, study_id: &str) {
        let mut study = self.study(repository_id, study_id).await;
        study.should_cache = true;
        self.update(CacheRecord::Study(study)).await;
    }

    pub async fn update(&self, record: CacheRecord) {
        use stats_cache::registry::CacheRegistry;
        self.registry.update_entry(&record).await.unwrap();
    }

    /// Registers a repository with one opted-in study and the given
    /// repertoires, then runs discovery so their entries exist.
    pub async fn seed_study(&self, repository_id: &str, study_id: &str, repertoires: &[&str]) {
        self.add_repository(repository_id);
        self.compute
            .add_study(repository_id, study_id, &format!("dc-{}", study_id));
        for repertoire_id in repertoires {
            self.compute
                .add_repertoire(repository_id, study_id, repertoire_id);
        }

        let singleton = self.singleton().await;
        self.pipeline.discover(&singleton).await.unwrap();
        self.opt_in(repository_id, study_id).await;
        self.pipeline.discover(&singleton).await.unwrap();
    }

    /// Path the finished job for this repertoire writes its statistics to.
    pub async fn artifact_path(&self, repertoire_id: &str) -> String {
        let entry = self.repertoire(repertoire_id).await;
        let study = self.study(&entry.repository_id, &entry.study_id).await;
        self.pipeline
            .paths()
            .artifact(&study.download_cache_id, repertoire_id)
    }
}
