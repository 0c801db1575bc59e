//! Cache registry: bookkeeping records for the statistics cache.
//!
//! This module provides:
//! - The tagged record model (`CacheRecord::{Singleton, Study, Repertoire}`)
//! - Query filters for study and repertoire entries
//! - The [`CacheRegistry`] collaborator trait
//! - An in-memory registry used when no database is configured
//!
//! Implementations must reject a second record with the same natural key:
//! (repository_id, study_id) for studies, repertoire_id for repertoires and
//! the kind itself for the singleton.

pub mod entry;
pub mod filter;
pub mod memory;

pub use entry::{
    CacheRecord, CacheSingleton, NewRepertoireEntry, NewStudyEntry, RepertoireCacheEntry,
    RepertoireState, RepositorySettings, StudyCacheEntry,
};
pub use filter::{RepertoireFilter, StudyFilter};
pub use memory::MemoryRegistry;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RegistryError;

/// CRUD over cache bookkeeping records.
#[async_trait]
pub trait CacheRegistry: Send + Sync {
    async fn get_singleton(&self) -> Result<Option<CacheSingleton>, RegistryError>;

    /// Creates the singleton. Fails with `DuplicateKey` if one exists.
    async fn create_singleton(&self) -> Result<CacheSingleton, RegistryError>;

    async fn update_singleton(&self, singleton: &CacheSingleton) -> Result<(), RegistryError>;

    /// Writes only the singleton's `jobs_submitted` flag.
    async fn set_jobs_submitted(&self, submitted: bool) -> Result<(), RegistryError>;

    /// Writes only the singleton's `enable_cache` switch.
    async fn set_cache_enabled(&self, enabled: bool) -> Result<(), RegistryError>;

    /// Settings records for every known upstream repository.
    async fn list_repositories(&self) -> Result<Vec<RepositorySettings>, RegistryError>;

    async fn list_study_entries(
        &self,
        filter: &StudyFilter,
    ) -> Result<Vec<StudyCacheEntry>, RegistryError>;

    async fn create_study_entry(
        &self,
        entry: NewStudyEntry,
    ) -> Result<StudyCacheEntry, RegistryError>;

    async fn list_repertoire_entries(
        &self,
        filter: &RepertoireFilter,
    ) -> Result<Vec<RepertoireCacheEntry>, RegistryError>;

    async fn create_repertoire_entry(
        &self,
        entry: NewRepertoireEntry,
    ) -> Result<RepertoireCacheEntry, RegistryError>;

    async fn get_entry(&self, id: Uuid) -> Result<Option<CacheRecord>, RegistryError>;

    /// Replaces a record. Fails with `NotFound` if it was deleted meanwhile.
    async fn update_entry(&self, record: &CacheRecord) -> Result<(), RegistryError>;

    /// Writes only the `should_cache` intent of a study or repertoire.
    async fn set_should_cache(&self, id: Uuid, should_cache: bool) -> Result<(), RegistryError>;

    /// Writes only a study's `is_cached` aggregate.
    async fn set_study_cached(&self, id: Uuid, is_cached: bool) -> Result<(), RegistryError>;

    async fn delete_entry(&self, id: Uuid) -> Result<(), RegistryError>;
}

pub(crate) fn missing_singleton() -> RegistryError {
    RegistryError::UnexpectedCount {
        what: "cache singleton".to_string(),
        found: 0,
    }
}

/// Returns the singleton, creating it with defaults if absent.
///
/// A concurrent creator winning the race is not an error: the existing
/// record is read back.
pub async fn ensure_singleton(
    registry: &dyn CacheRegistry,
) -> Result<CacheSingleton, RegistryError> {
    if let Some(existing) = registry.get_singleton().await? {
        return Ok(existing);
    }

    match registry.create_singleton().await {
        Ok(created) => {
            tracing::info!(id = %created.id, "Created cache singleton");
            Ok(created)
        }
        Err(RegistryError::DuplicateKey(_)) => {
            registry
                .get_singleton()
                .await?
                .ok_or_else(|| RegistryError::Unavailable("singleton vanished".to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Looks up the one study entry for (repository_id, study_id).
pub async fn find_study(
    registry: &dyn CacheRegistry,
    repository_id: &str,
    study_id: &str,
) -> Result<StudyCacheEntry, RegistryError> {
    let filter = StudyFilter::for_repository(repository_id).with_study(study_id);
    let mut entries = registry.list_study_entries(&filter).await?;
    if entries.len() != 1 {
        return Err(RegistryError::UnexpectedCount {
            what: format!("study entry for {}/{}", repository_id, study_id),
            found: entries.len(),
        });
    }
    Ok(entries.remove(0))
}

/// Looks up the one repertoire entry for a repertoire id.
pub async fn find_repertoire(
    registry: &dyn CacheRegistry,
    repertoire_id: &str,
) -> Result<RepertoireCacheEntry, RegistryError> {
    let filter = RepertoireFilter::new().with_repertoire(repertoire_id);
    let mut entries = registry.list_repertoire_entries(&filter).await?;
    if entries.len() != 1 {
        return Err(RegistryError::UnexpectedCount {
            what: format!("repertoire entry for {}", repertoire_id),
            found: entries.len(),
        });
    }
    Ok(entries.remove(0))
}
