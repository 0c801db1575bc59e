//! Administrative removal of cached statistics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orchestrator::{AtomicStats, CachePipeline};
use super::stage::{Stage, StageGuard};
use crate::error::CacheError;
use crate::registry::{find_study, RepertoireCacheEntry, RepertoireFilter, StudyCacheEntry};

/// Entry to clear, by cache entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ClearTarget {
    Study(Uuid),
    Repertoire(Uuid),
}

impl ClearTarget {
    pub fn id(&self) -> Uuid {
        match self {
            ClearTarget::Study(id) | ClearTarget::Repertoire(id) => *id,
        }
    }
}

/// What a clear removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub found: bool,
    pub repertoires_cleared: usize,
}

impl CachePipeline {
    /// Deletes artifacts, statistics and entries for the target, leaving its
    /// study uncached so the next reconciliation re-creates the entries.
    ///
    /// A study keeps its `should_cache` setting.
    pub async fn clear(&self, target: ClearTarget) -> Result<ClearReport, CacheError> {
        let guard = StageGuard::new(Stage::Clear, self.alerter.as_ref());
        let result = self.clear_target(&guard, target).await;
        guard.complete(&result);
        if let Ok(report) = &result {
            AtomicStats::add(&self.stats.entries_cleared, report.repertoires_cleared);
        }
        result
    }

    async fn clear_target(
        &self,
        guard: &StageGuard<'_>,
        target: ClearTarget,
    ) -> Result<ClearReport, CacheError> {
        let context = format!("cache entry {}", target.id());
        let record = guard
            .check(&context, self.registry.get_entry(target.id()).await)
            .await?;
        let Some(record) = record else {
            tracing::warn!(target = ?target, "Clear target no longer exists");
            return Ok(ClearReport::default());
        };

        let mut report = ClearReport {
            found: true,
            repertoires_cleared: 0,
        };

        let study = match target {
            ClearTarget::Repertoire(_) => {
                let entry = guard.check(&context, record.into_repertoire()).await?;
                let study = guard
                    .check(
                        &context,
                        find_study(self.registry.as_ref(), &entry.repository_id, &entry.study_id)
                            .await,
                    )
                    .await?;
                self.clear_repertoire(guard, &study, entry).await?;
                report.repertoires_cleared = 1;
                study
            }
            ClearTarget::Study(_) => {
                let study = guard.check(&context, record.into_study()).await?;
                let children = guard
                    .check(
                        &context,
                        self.registry
                            .list_repertoire_entries(&RepertoireFilter::for_study(
                                &study.repository_id,
                                &study.study_id,
                            ))
                            .await,
                    )
                    .await?;
                for entry in children {
                    self.clear_repertoire(guard, &study, entry).await?;
                    report.repertoires_cleared += 1;
                }
                guard
                    .check(
                        &context,
                        self.compute
                            .delete_artifact(&self.paths.study_dir(&study.download_cache_id))
                            .await,
                    )
                    .await?;
                study
            }
        };

        guard
            .check(
                &context,
                self.registry.set_study_cached(study.id, false).await,
            )
            .await?;

        tracing::info!(
            repository_id = %study.repository_id,
            study_id = %study.study_id,
            repertoires = report.repertoires_cleared,
            "Cleared cached statistics"
        );
        Ok(report)
    }

    async fn clear_repertoire(
        &self,
        guard: &StageGuard<'_>,
        study: &StudyCacheEntry,
        entry: RepertoireCacheEntry,
    ) -> Result<(), CacheError> {
        let context = format!("repertoire {}", entry.repertoire_id);
        guard
            .check(
                &context,
                self.compute
                    .delete_artifact(
                        &self
                            .paths
                            .repertoire_dir(&study.download_cache_id, &entry.repertoire_id),
                    )
                    .await,
            )
            .await?;
        guard
            .check(
                &context,
                self.statistics.delete_statistics(&entry.repertoire_id).await,
            )
            .await?;
        guard
            .check(&context, self.registry.delete_entry(entry.id).await)
            .await?;
        tracing::debug!(repertoire_id = %entry.repertoire_id, "Cleared repertoire entry");
        Ok(())
    }
}
