//! Reconciles study and repertoire entries against upstream listings.
//!
//! A pass only ever creates entries. Existing entries are never modified
//! except for the study aggregate, and nothing is deleted here: removal is
//! an explicit administrative clear.

use std::collections::HashSet;

use serde::Serialize;

use super::orchestrator::{AtomicStats, CachePipeline};
use super::stage::{Stage, StageGuard};
use crate::error::{CacheError, RegistryError};
use crate::registry::{
    CacheSingleton, NewRepertoireEntry, NewStudyEntry, RepertoireFilter, StudyCacheEntry,
    StudyFilter,
};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub skipped: bool,
    pub repositories: usize,
    pub failed_repositories: Vec<String>,
    pub studies_created: usize,
    pub repertoires_created: usize,
}

impl CachePipeline {
    /// Runs one reconciliation pass over every participating repository.
    ///
    /// A failure in one repository is alerted and the pass moves on to the
    /// next one. Only failing to enumerate repositories fails the pass.
    pub async fn discover(&self, singleton: &CacheSingleton) -> Result<DiscoveryReport, CacheError> {
        let guard = StageGuard::new(Stage::Discover, self.alerter.as_ref());
        let mut report = DiscoveryReport::default();

        if !singleton.enable_cache {
            tracing::info!("Statistics cache disabled, skipping discovery");
            report.skipped = true;
            guard.finish("skipped");
            return Ok(report);
        }

        let repositories = match guard
            .check("list repositories", self.participating_repositories().await)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                guard.finish(&e.kind().to_string());
                return Err(e);
            }
        };

        for repository_id in &repositories {
            report.repositories += 1;
            if let Err(e) = self
                .reconcile_repository(&guard, repository_id, &mut report)
                .await
            {
                tracing::warn!(
                    repository_id = %repository_id,
                    error = %e,
                    "Repository reconciliation aborted"
                );
                report.failed_repositories.push(repository_id.clone());
            }
        }

        AtomicStats::add(&self.stats.discovery_passes, 1);
        AtomicStats::add(&self.stats.studies_created, report.studies_created);
        AtomicStats::add(&self.stats.repertoires_created, report.repertoires_created);

        tracing::info!(
            repositories = report.repositories,
            failed = report.failed_repositories.len(),
            studies_created = report.studies_created,
            repertoires_created = report.repertoires_created,
            "Discovery pass complete"
        );
        guard.finish(if report.failed_repositories.is_empty() {
            "success"
        } else {
            "partial"
        });
        Ok(report)
    }

    async fn reconcile_repository(
        &self,
        guard: &StageGuard<'_>,
        repository_id: &str,
        report: &mut DiscoveryReport,
    ) -> Result<(), CacheError> {
        let context = format!("repository {}", repository_id);

        let mut studies = guard
            .check(
                &context,
                self.registry
                    .list_study_entries(&StudyFilter::for_repository(repository_id))
                    .await,
            )
            .await?;

        let mut known = HashSet::new();
        for study in &studies {
            if !known.insert(study.study_id.clone()) {
                return guard
                    .check(
                        &context,
                        Err::<(), _>(RegistryError::UnexpectedCount {
                            what: format!("study entry for {}/{}", repository_id, study.study_id),
                            found: 2,
                        }),
                    )
                    .await;
            }
        }

        let upstream = guard
            .check(
                &context,
                self.compute.list_cacheable_studies(repository_id).await,
            )
            .await?;

        let mut listed = HashSet::new();
        for study in upstream {
            if !listed.insert(study.study_id.clone()) {
                return guard
                    .check(
                        &context,
                        Err::<(), _>(CacheError::Integrity(format!(
                            "upstream lists study {} twice in repository {}",
                            study.study_id, repository_id
                        ))),
                    )
                    .await;
            }
            if known.contains(&study.study_id) {
                continue;
            }

            let created = guard
                .check(
                    &context,
                    self.registry
                        .create_study_entry(NewStudyEntry::discovered(
                            repository_id,
                            &study.study_id,
                            &study.download_cache_id,
                        ))
                        .await,
                )
                .await?;
            tracing::info!(
                repository_id = %repository_id,
                study_id = %created.study_id,
                "Registered study"
            );
            known.insert(created.study_id.clone());
            report.studies_created += 1;
            studies.push(created);
        }

        for study in studies
            .into_iter()
            .filter(|s| s.should_cache && !s.is_cached)
        {
            self.reconcile_study(guard, study, report).await?;
        }
        Ok(())
    }

    async fn reconcile_study(
        &self,
        guard: &StageGuard<'_>,
        study: StudyCacheEntry,
        report: &mut DiscoveryReport,
    ) -> Result<(), CacheError> {
        let context = format!("study {}/{}", study.repository_id, study.study_id);

        let existing = guard
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

        let mut known = HashSet::new();
        for entry in &existing {
            if !known.insert(entry.repertoire_id.clone()) {
                return guard
                    .check(
                        &context,
                        Err::<(), _>(RegistryError::UnexpectedCount {
                            what: format!("repertoire entry for {}", entry.repertoire_id),
                            found: 2,
                        }),
                    )
                    .await;
            }
        }

        let upstream = guard
            .check(
                &context,
                self.compute
                    .list_cacheable_repertoires(&study.repository_id, &study.study_id)
                    .await,
            )
            .await?;

        let mut listed = HashSet::new();
        for repertoire in upstream {
            if !listed.insert(repertoire.repertoire_id.clone()) {
                return guard
                    .check(
                        &context,
                        Err::<(), _>(CacheError::Integrity(format!(
                            "upstream lists repertoire {} twice in study {}",
                            repertoire.repertoire_id, study.study_id
                        ))),
                    )
                    .await;
            }
            if known.contains(&repertoire.repertoire_id) {
                continue;
            }

            guard
                .check(
                    &context,
                    self.registry
                        .create_repertoire_entry(NewRepertoireEntry::new(
                            &study.repository_id,
                            &study.study_id,
                            &repertoire.repertoire_id,
                            &repertoire.cache_ref,
                        ))
                        .await,
                )
                .await?;
            tracing::info!(
                repository_id = %study.repository_id,
                study_id = %study.study_id,
                repertoire_id = %repertoire.repertoire_id,
                "Registered repertoire"
            );
            known.insert(repertoire.repertoire_id);
            report.repertoires_created += 1;
        }

        guard
            .check(&context, self.refresh_study_aggregate(study).await)
            .await?;
        Ok(())
    }
}
