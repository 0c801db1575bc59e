//! Cache bookkeeping records.
//!
//! The registry holds three kinds of record, distinguished by an explicit
//! tag rather than by ad hoc document fields. Consumers match on
//! [`CacheRecord`] exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;

/// Process-wide cache switchboard. Exactly one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSingleton {
    pub id: Uuid,
    /// Runtime enable flag, toggled by administrators.
    pub enable_cache: bool,
    /// True while a submission batch has jobs outstanding.
    pub jobs_submitted: bool,
    pub updated_at: DateTime<Utc>,
}

impl CacheSingleton {
    /// Creates the default singleton: caching enabled, nothing submitted.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            enable_cache: true,
            jobs_submitted: false,
            updated_at: Utc::now(),
        }
    }
}

impl Default for CacheSingleton {
    fn default() -> Self {
        Self::new()
    }
}

/// Study-level cache record, keyed by (repository_id, study_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyCacheEntry {
    pub id: Uuid,
    pub repository_id: String,
    pub study_id: String,
    /// Upstream download cache holding this study's data files.
    pub download_cache_id: String,
    /// Administrator intent.
    pub should_cache: bool,
    /// Aggregate of the should-cache repertoire entries.
    pub is_cached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repertoire-level cache record, keyed by repertoire_id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepertoireCacheEntry {
    /// Also the cache uuid carried by job callbacks.
    pub id: Uuid,
    pub repository_id: String,
    pub study_id: String,
    pub repertoire_id: String,
    /// Upstream download cache reference for the repertoire's data file.
    pub cache_ref: String,
    pub should_cache: bool,
    pub is_cached: bool,
    /// Remote job currently computing statistics for this entry.
    pub statistics_job_id: Option<String>,
    /// Retry backoff factor applied to the job's wall-clock budget.
    pub time_multiplier: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepertoireCacheEntry {
    /// Returns true if a remote job is in flight for this entry.
    pub fn has_job(&self) -> bool {
        self.statistics_job_id.is_some()
    }

    /// Returns true if the submitter may launch a job for this entry.
    pub fn is_pending(&self) -> bool {
        self.should_cache && !self.is_cached && !self.has_job()
    }

    /// Current lifecycle state, derived from the flags.
    pub fn state(&self) -> RepertoireState {
        match (self.should_cache, self.is_cached, self.has_job()) {
            (_, _, true) => RepertoireState::JobSubmitted,
            (true, true, false) => RepertoireState::Cached,
            (true, false, false) => RepertoireState::AwaitingJob,
            (false, true, false) => RepertoireState::Cached,
            (false, false, false) => RepertoireState::Disabled,
        }
    }
}

/// Lifecycle state of a repertoire entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepertoireState {
    AwaitingJob,
    JobSubmitted,
    Cached,
    /// Registered without caching intent, or disabled after a failure.
    Disabled,
}

/// Any record stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheRecord {
    Singleton(CacheSingleton),
    Study(StudyCacheEntry),
    Repertoire(RepertoireCacheEntry),
}

impl CacheRecord {
    pub fn id(&self) -> Uuid {
        match self {
            CacheRecord::Singleton(s) => s.id,
            CacheRecord::Study(s) => s.id,
            CacheRecord::Repertoire(r) => r.id,
        }
    }

    /// Name of the record kind, as stored.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheRecord::Singleton(_) => kinds::SINGLETON,
            CacheRecord::Study(_) => kinds::STUDY,
            CacheRecord::Repertoire(_) => kinds::REPERTOIRE,
        }
    }

    /// Unwraps a repertoire record, failing with a kind mismatch otherwise.
    pub fn into_repertoire(self) -> Result<RepertoireCacheEntry, RegistryError> {
        match self {
            CacheRecord::Repertoire(r) => Ok(r),
            other => Err(RegistryError::KindMismatch {
                id: other.id(),
                expected: kinds::REPERTOIRE,
                actual: other.kind(),
            }),
        }
    }

    /// Unwraps a study record, failing with a kind mismatch otherwise.
    pub fn into_study(self) -> Result<StudyCacheEntry, RegistryError> {
        match self {
            CacheRecord::Study(s) => Ok(s),
            other => Err(RegistryError::KindMismatch {
                id: other.id(),
                expected: kinds::STUDY,
                actual: other.kind(),
            }),
        }
    }

    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        match self {
            CacheRecord::Singleton(s) => s.updated_at = now,
            CacheRecord::Study(s) => s.updated_at = now,
            CacheRecord::Repertoire(r) => r.updated_at = now,
        }
    }
}

impl From<CacheSingleton> for CacheRecord {
    fn from(value: CacheSingleton) -> Self {
        CacheRecord::Singleton(value)
    }
}

impl From<StudyCacheEntry> for CacheRecord {
    fn from(value: StudyCacheEntry) -> Self {
        CacheRecord::Study(value)
    }
}

impl From<RepertoireCacheEntry> for CacheRecord {
    fn from(value: RepertoireCacheEntry) -> Self {
        CacheRecord::Repertoire(value)
    }
}

/// Record kind tags.
pub mod kinds {
    pub const SINGLETON: &str = "singleton";
    pub const STUDY: &str = "study";
    pub const REPERTOIRE: &str = "repertoire";
}

/// Fields needed to register a study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudyEntry {
    pub repository_id: String,
    pub study_id: String,
    pub download_cache_id: String,
    pub should_cache: bool,
    pub is_cached: bool,
}

impl NewStudyEntry {
    /// A newly discovered study: no caching intent until an administrator opts in.
    pub fn discovered(
        repository_id: impl Into<String>,
        study_id: impl Into<String>,
        download_cache_id: impl Into<String>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            study_id: study_id.into(),
            download_cache_id: download_cache_id.into(),
            should_cache: false,
            is_cached: false,
        }
    }

    pub fn into_entry(self) -> StudyCacheEntry {
        let now = Utc::now();
        StudyCacheEntry {
            id: Uuid::new_v4(),
            repository_id: self.repository_id,
            study_id: self.study_id,
            download_cache_id: self.download_cache_id,
            should_cache: self.should_cache,
            is_cached: self.is_cached,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields needed to register a repertoire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepertoireEntry {
    pub repository_id: String,
    pub study_id: String,
    pub repertoire_id: String,
    pub cache_ref: String,
    pub should_cache: bool,
}

impl NewRepertoireEntry {
    pub fn new(
        repository_id: impl Into<String>,
        study_id: impl Into<String>,
        repertoire_id: impl Into<String>,
        cache_ref: impl Into<String>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            study_id: study_id.into(),
            repertoire_id: repertoire_id.into(),
            cache_ref: cache_ref.into(),
            should_cache: true,
        }
    }

    pub fn into_entry(self) -> RepertoireCacheEntry {
        let now = Utc::now();
        RepertoireCacheEntry {
            id: Uuid::new_v4(),
            repository_id: self.repository_id,
            study_id: self.study_id,
            repertoire_id: self.repertoire_id,
            cache_ref: self.cache_ref,
            should_cache: self.should_cache,
            is_cached: false,
            statistics_job_id: None,
            time_multiplier: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-repository cache switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    pub repository_id: String,
    /// Upstream download cache enabled for this repository.
    pub enable_cache: bool,
    /// Statistics cache enabled for this repository.
    pub enable_statistics_cache: bool,
}

impl RepositorySettings {
    pub fn new(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            enable_cache: true,
            enable_statistics_cache: true,
        }
    }

    /// Both the download cache and the statistics cache must be on.
    pub fn participates(&self) -> bool {
        self.enable_cache && self.enable_statistics_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repertoire() -> RepertoireCacheEntry {
        NewRepertoireEntry::new("ir-1", "s1", "r1", "cache-1").into_entry()
    }

    #[test]
    fn test_new_repertoire_defaults() {
        let entry = repertoire();
        assert!(entry.should_cache);
        assert!(!entry.is_cached);
        assert_eq!(entry.time_multiplier, 1);
        assert!(entry.is_pending());
        assert_eq!(entry.state(), RepertoireState::AwaitingJob);
    }

    #[test]
    fn test_repertoire_state_transitions() {
        let mut entry = repertoire();
        entry.statistics_job_id = Some("job-1".to_string());
        assert_eq!(entry.state(), RepertoireState::JobSubmitted);
        assert!(!entry.is_pending());

        entry.statistics_job_id = None;
        entry.is_cached = true;
        assert_eq!(entry.state(), RepertoireState::Cached);

        entry.is_cached = false;
        entry.should_cache = false;
        assert_eq!(entry.state(), RepertoireState::Disabled);
    }

    #[test]
    fn test_discovered_study_has_no_intent() {
        let entry = NewStudyEntry::discovered("ir-1", "s1", "dc-1").into_entry();
        assert!(!entry.should_cache);
        assert!(!entry.is_cached);
        assert_eq!(entry.download_cache_id, "dc-1");
    }

    #[test]
    fn test_record_kind_mismatch() {
        let study: CacheRecord = NewStudyEntry::discovered("ir-1", "s1", "dc-1")
            .into_entry()
            .into();
        let err = study.into_repertoire().unwrap_err();
        assert!(err.is_integrity());
        assert!(matches!(
            err,
            RegistryError::KindMismatch {
                expected: "repertoire",
                actual: "study",
                ..
            }
        ));
    }

    #[test]
    fn test_record_serialization_is_tagged() {
        let record: CacheRecord = CacheSingleton::new().into();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "singleton");
        assert_eq!(json["enable_cache"], true);
    }

    #[test]
    fn test_repository_participation() {
        let mut settings = RepositorySettings::new("ir-1");
        assert!(settings.participates());
        settings.enable_statistics_cache = false;
        assert!(!settings.participates());
    }
}
