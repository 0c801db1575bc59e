//! In-memory cache registry.
//!
//! Used when no database is configured and by the test suites. Records are
//! kept in insertion order so listings are stable.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::entry::{
    kinds, CacheRecord, CacheSingleton, NewRepertoireEntry, NewStudyEntry,
    RepertoireCacheEntry, RepositorySettings, StudyCacheEntry,
};
use super::filter::{RepertoireFilter, StudyFilter};
use super::{missing_singleton, CacheRegistry};
use crate::error::RegistryError;

#[derive(Default)]
struct State {
    records: Vec<CacheRecord>,
    repositories: HashMap<String, RepositorySettings>,
}

impl State {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    fn studies(&self) -> impl Iterator<Item = &StudyCacheEntry> {
        self.records.iter().filter_map(|r| match r {
            CacheRecord::Study(s) => Some(s),
            _ => None,
        })
    }

    fn repertoires(&self) -> impl Iterator<Item = &RepertoireCacheEntry> {
        self.records.iter().filter_map(|r| match r {
            CacheRecord::Repertoire(r) => Some(r),
            _ => None,
        })
    }

    fn singleton_mut(&mut self) -> Option<&mut CacheSingleton> {
        self.records.iter_mut().find_map(|r| match r {
            CacheRecord::Singleton(s) => Some(s),
            _ => None,
        })
    }

    fn singleton(&self) -> Option<&CacheSingleton> {
        self.records.iter().find_map(|r| match r {
            CacheRecord::Singleton(s) => Some(s),
            _ => None,
        })
    }
}

/// Registry backed by process memory.
#[derive(Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a repository settings record.
    pub fn upsert_repository(&self, settings: RepositorySettings) {
        if let Ok(mut state) = self.state.write() {
            state
                .repositories
                .insert(settings.repository_id.clone(), settings);
        }
    }

    /// Inserts a record as-is, bypassing natural-key checks.
    ///
    /// Loads fixtures, including inconsistent ones.
    pub fn seed(&self, record: impl Into<CacheRecord>) {
        if let Ok(mut state) = self.state.write() {
            state.records.push(record.into());
        }
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<CacheRecord> {
        self.state
            .read()
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, RegistryError> {
        self.state
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, RegistryError> {
        self.state
            .write()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheRegistry for MemoryRegistry {
    async fn get_singleton(&self) -> Result<Option<CacheSingleton>, RegistryError> {
        Ok(self.read()?.singleton().cloned())
    }

    async fn create_singleton(&self) -> Result<CacheSingleton, RegistryError> {
        let mut state = self.write()?;
        if state.singleton().is_some() {
            return Err(RegistryError::DuplicateKey("cache singleton".to_string()));
        }
        let singleton = CacheSingleton::new();
        state.records.push(singleton.clone().into());
        Ok(singleton)
    }

    async fn update_singleton(&self, singleton: &CacheSingleton) -> Result<(), RegistryError> {
        self.update_entry(&CacheRecord::Singleton(singleton.clone()))
            .await
    }

    async fn set_jobs_submitted(&self, submitted: bool) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let singleton = state.singleton_mut().ok_or_else(missing_singleton)?;
        singleton.jobs_submitted = submitted;
        singleton.updated_at = Utc::now();
        Ok(())
    }

    async fn set_cache_enabled(&self, enabled: bool) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let singleton = state.singleton_mut().ok_or_else(missing_singleton)?;
        singleton.enable_cache = enabled;
        singleton.updated_at = Utc::now();
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySettings>, RegistryError> {
        let state = self.read()?;
        let mut repositories: Vec<_> = state.repositories.values().cloned().collect();
        repositories.sort_by(|a, b| a.repository_id.cmp(&b.repository_id));
        Ok(repositories)
    }

    async fn list_study_entries(
        &self,
        filter: &StudyFilter,
    ) -> Result<Vec<StudyCacheEntry>, RegistryError> {
        Ok(self
            .read()?
            .studies()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn create_study_entry(
        &self,
        entry: NewStudyEntry,
    ) -> Result<StudyCacheEntry, RegistryError> {
        let mut state = self.write()?;
        let exists = state
            .studies()
            .any(|s| s.repository_id == entry.repository_id && s.study_id == entry.study_id);
        if exists {
            return Err(RegistryError::DuplicateKey(format!(
                "study {}/{}",
                entry.repository_id, entry.study_id
            )));
        }
        let created = entry.into_entry();
        state.records.push(created.clone().into());
        Ok(created)
    }

    async fn list_repertoire_entries(
        &self,
        filter: &RepertoireFilter,
    ) -> Result<Vec<RepertoireCacheEntry>, RegistryError> {
        let state = self.read()?;
        let matching = state.repertoires().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn create_repertoire_entry(
        &self,
        entry: NewRepertoireEntry,
    ) -> Result<RepertoireCacheEntry, RegistryError> {
        let mut state = self.write()?;
        if state
            .repertoires()
            .any(|r| r.repertoire_id == entry.repertoire_id)
        {
            return Err(RegistryError::DuplicateKey(format!(
                "repertoire {}",
                entry.repertoire_id
            )));
        }
        let created = entry.into_entry();
        state.records.push(created.clone().into());
        Ok(created)
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<CacheRecord>, RegistryError> {
        let state = self.read()?;
        Ok(state.position(id).map(|idx| state.records[idx].clone()))
    }

    async fn update_entry(&self, record: &CacheRecord) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let idx = state
            .position(record.id())
            .ok_or(RegistryError::NotFound(record.id()))?;
        let stored = &state.records[idx];
        if stored.kind() != record.kind() {
            return Err(RegistryError::KindMismatch {
                id: record.id(),
                expected: stored.kind(),
                actual: record.kind(),
            });
        }
        let mut updated = record.clone();
        updated.touch();
        state.records[idx] = updated;
        Ok(())
    }

    async fn set_should_cache(&self, id: Uuid, should_cache: bool) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let idx = state.position(id).ok_or(RegistryError::NotFound(id))?;
        match &mut state.records[idx] {
            CacheRecord::Study(s) => {
                s.should_cache = should_cache;
                s.updated_at = Utc::now();
            }
            CacheRecord::Repertoire(r) => {
                r.should_cache = should_cache;
                r.updated_at = Utc::now();
            }
            CacheRecord::Singleton(_) => {
                return Err(RegistryError::KindMismatch {
                    id,
                    expected: kinds::STUDY,
                    actual: kinds::SINGLETON,
                })
            }
        }
        Ok(())
    }

    async fn set_study_cached(&self, id: Uuid, is_cached: bool) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let idx = state.position(id).ok_or(RegistryError::NotFound(id))?;
        match &mut state.records[idx] {
            CacheRecord::Study(s) => {
                s.is_cached = is_cached;
                s.updated_at = Utc::now();
                Ok(())
            }
            other => Err(RegistryError::KindMismatch {
                id,
                expected: kinds::STUDY,
                actual: other.kind(),
            }),
        }
    }

    async fn delete_entry(&self, id: Uuid) -> Result<(), RegistryError> {
        let mut state = self.write()?;
        let idx = state.position(id).ok_or(RegistryError::NotFound(id))?;
        state.records.remove(idx);
        Ok(())
    }
}
