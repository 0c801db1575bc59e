//! Study-level `is_cached` derived from its repertoire entries.

use super::orchestrator::CachePipeline;
use crate::error::RegistryError;
use crate::registry::{RepertoireCacheEntry, RepertoireFilter, StudyCacheEntry};

/// True iff at least one child should be cached and every such child is.
///
/// Children with `should_cache = false` are ignored, so a study whose
/// children are all disabled is not cached.
pub fn study_is_cached(children: &[RepertoireCacheEntry]) -> bool {
    let mut wanted = children.iter().filter(|r| r.should_cache).peekable();
    wanted.peek().is_some() && wanted.all(|r| r.is_cached)
}

impl CachePipeline {
    /// Recomputes the study aggregate and writes it if it changed.
    ///
    /// Only `is_cached` is written; the rest of `study` may be stale.
    pub(crate) async fn refresh_study_aggregate(
        &self,
        mut study: StudyCacheEntry,
    ) -> Result<StudyCacheEntry, RegistryError> {
        let filter = RepertoireFilter::for_study(&study.repository_id, &study.study_id);
        let children = self.registry.list_repertoire_entries(&filter).await?;
        let cached = study_is_cached(&children);

        if cached != study.is_cached {
            tracing::info!(
                repository_id = %study.repository_id,
                study_id = %study.study_id,
                is_cached = cached,
                "Study aggregate changed"
            );
            self.registry.set_study_cached(study.id, cached).await?;
            study.is_cached = cached;
        }
        Ok(study)
    }
}
