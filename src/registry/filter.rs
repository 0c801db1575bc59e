//! Query filters for cache entries.

use super::entry::{RepertoireCacheEntry, StudyCacheEntry};

/// Filter criteria for listing study entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StudyFilter {
    pub repository_id: Option<String>,
    pub study_id: Option<String>,
    pub should_cache: Option<bool>,
    pub is_cached: Option<bool>,
}

impl StudyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All studies of one repository.
    pub fn for_repository(repository_id: impl Into<String>) -> Self {
        Self::new().with_repository(repository_id)
    }

    pub fn with_repository(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    pub fn with_study(mut self, study_id: impl Into<String>) -> Self {
        self.study_id = Some(study_id.into());
        self
    }

    pub fn with_should_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = Some(should_cache);
        self
    }

    pub fn with_is_cached(mut self, is_cached: bool) -> Self {
        self.is_cached = Some(is_cached);
        self
    }

    pub fn matches(&self, entry: &StudyCacheEntry) -> bool {
        self.repository_id
            .as_ref()
            .map_or(true, |r| *r == entry.repository_id)
            && self.study_id.as_ref().map_or(true, |s| *s == entry.study_id)
            && self.should_cache.map_or(true, |v| v == entry.should_cache)
            && self.is_cached.map_or(true, |v| v == entry.is_cached)
    }
}

/// Filter criteria for listing repertoire entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepertoireFilter {
    pub repository_id: Option<String>,
    pub study_id: Option<String>,
    pub repertoire_id: Option<String>,
    pub should_cache: Option<bool>,
    pub is_cached: Option<bool>,
    /// `Some(true)` selects entries holding a job id, `Some(false)` entries without.
    pub has_job: Option<bool>,
    pub limit: Option<usize>,
}

impl RepertoireFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All repertoires of one study.
    pub fn for_study(repository_id: impl Into<String>, study_id: impl Into<String>) -> Self {
        Self::new()
            .with_repository(repository_id)
            .with_study(study_id)
    }

    /// Entries the submitter may launch a job for.
    pub fn pending() -> Self {
        Self::new()
            .with_should_cache(true)
            .with_is_cached(false)
            .with_has_job(false)
    }

    /// Entries with a job in flight.
    pub fn outstanding() -> Self {
        Self::new().with_has_job(true)
    }

    pub fn with_repository(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    pub fn with_study(mut self, study_id: impl Into<String>) -> Self {
        self.study_id = Some(study_id.into());
        self
    }

    pub fn with_repertoire(mut self, repertoire_id: impl Into<String>) -> Self {
        self.repertoire_id = Some(repertoire_id.into());
        self
    }

    pub fn with_should_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = Some(should_cache);
        self
    }

    pub fn with_is_cached(mut self, is_cached: bool) -> Self {
        self.is_cached = Some(is_cached);
        self
    }

    pub fn with_has_job(mut self, has_job: bool) -> Self {
        self.has_job = Some(has_job);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates every criterion except `limit`.
    pub fn matches(&self, entry: &RepertoireCacheEntry) -> bool {
        self.repository_id
            .as_ref()
            .map_or(true, |r| *r == entry.repository_id)
            && self.study_id.as_ref().map_or(true, |s| *s == entry.study_id)
            && self
                .repertoire_id
                .as_ref()
                .map_or(true, |r| *r == entry.repertoire_id)
            && self.should_cache.map_or(true, |v| v == entry.should_cache)
            && self.is_cached.map_or(true, |v| v == entry.is_cached)
            && self.has_job.map_or(true, |v| v == entry.has_job())
    }
}
