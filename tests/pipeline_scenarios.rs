//! End-to-end pipeline scenarios over in-memory collaborators.
//!
//! Run with: cargo test --test pipeline_scenarios

mod common;

use serde_json::json;
use uuid::Uuid;

use common::{test_config, Harness};
use stats_cache::admin::AdminService;
use stats_cache::alert::AlertKind;
use stats_cache::compute::{JobStatusReport, RemoteJobStatus};
use stats_cache::pipeline::{
    ClearTarget, CompletionEvent, CompletionOutcome, IgnoreReason,
};
use stats_cache::registry::{
    CacheRecord, CacheRegistry, NewRepertoireEntry, NewStudyEntry, RepertoireFilter,
    StudyFilter,
};
use stats_cache::storage::StatisticsStore;

const REPO: &str = "ir-1";
const STUDY: &str = "PRJNA1";

/// Submits pending work and returns the job id assigned to `repertoire_id`.
async fn submit_one(harness: &Harness, repertoire_id: &str) -> String {
    let singleton = harness.singleton().await;
    harness.pipeline.submit(singleton).await.unwrap();
    harness
        .repertoire(repertoire_id)
        .await
        .statistics_job_id
        .expect("job should be recorded on the entry")
}

#[tokio::test]
async fn test_finished_job_caches_statistics() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let job_id = submit_one(&harness, "rep-1").await;
    let path = harness.artifact_path("rep-1").await;
    harness
        .compute
        .put_artifact(&path, br#"{"v_call": {"IGHV1-2": 12}}"#);
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(
            CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Finished)
                .with_job_id(job_id.clone()),
        )
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Cached);

    let entry = harness.repertoire("rep-1").await;
    assert!(entry.is_cached);
    assert!(entry.should_cache);
    assert!(entry.statistics_job_id.is_none());
    assert_eq!(
        harness.statistics.get("rep-1"),
        Some(json!({"v_call": {"IGHV1-2": 12}}))
    );
    assert!(harness.study(REPO, STUDY).await.is_cached);
    assert_eq!(harness.pipeline.stats().repertoires_cached, 1);
}

#[tokio::test]
async fn test_submitted_job_targets_repertoire_paths() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    submit_one(&harness, "rep-1").await;
    let entry = harness.repertoire("rep-1").await;

    let submitted = harness.compute.submitted();
    assert_eq!(submitted.len(), 1);
    let spec = &submitted[0];
    assert_eq!(spec.max_run_time, "01:00:00");
    assert_eq!(spec.parameters.repertoire_id, "rep-1");
    assert_eq!(spec.archive_path, "/cache/dc-PRJNA1/statistics/rep-1");
    assert!(spec.notifications[0]
        .url
        .starts_with(&format!("http://cache.test/stats/notify/{}", entry.id)));

    let directories = harness.compute.directories();
    assert!(directories.contains(&"/cache/dc-PRJNA1/statistics".to_string()));
    assert!(directories.contains(&"/cache/dc-PRJNA1/statistics/rep-1".to_string()));
    assert!(harness.singleton().await.jobs_submitted);
}

#[tokio::test]
async fn test_timeout_doubles_time_multiplier() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let job_id = submit_one(&harness, "rep-1").await;
    harness.compute.set_status(
        &job_id,
        RemoteJobStatus::Failed,
        Some("Job exceeded its wall clock limit: TIMEOUT"),
    );

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Failed))
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::RetryScheduled { time_multiplier: 2 });

    let entry = harness.repertoire("rep-1").await;
    assert_eq!(entry.time_multiplier, 2);
    assert!(entry.statistics_job_id.is_none());
    assert!(entry.should_cache);
    assert!(!entry.is_cached);
    assert_eq!(harness.alerter.count(AlertKind::JobRetry), 1);
}

#[tokio::test]
async fn test_timeout_at_cap_disables_entry() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let mut entry = harness.repertoire("rep-1").await;
    entry.time_multiplier = 64;
    harness.update(CacheRecord::Repertoire(entry)).await;

    let job_id = submit_one(&harness, "rep-1").await;
    assert_eq!(harness.compute.submitted()[0].max_run_time, "48:00:00");
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Failed, Some("timeout"));

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Failed))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Disabled { .. }));

    let entry = harness.repertoire("rep-1").await;
    assert!(!entry.should_cache);
    assert!(entry.statistics_job_id.is_none());
    assert_eq!(harness.alerter.count(AlertKind::JobFailure), 1);
}

#[tokio::test]
async fn test_timeout_reported_at_platform_cap_disables_entry() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let job_id = submit_one(&harness, "rep-1").await;
    let mut report = JobStatusReport::new(&job_id, RemoteJobStatus::Failed).with_message("TIMEOUT");
    report.max_hours = Some(48);
    harness.compute.set_report(report);

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Failed))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Disabled { .. }));
    assert_eq!(harness.repertoire("rep-1").await.time_multiplier, 1);
}

#[tokio::test]
async fn test_repeated_timeouts_grow_budget_until_cap() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let mut run_times = Vec::new();
    loop {
        let singleton = harness.singleton().await;
        let submission = harness.pipeline.submit(singleton).await.unwrap();
        if submission.submitted.is_empty() {
            break;
        }

        let entry = harness.repertoire("rep-1").await;
        let job_id = entry.statistics_job_id.clone().unwrap();
        run_times.push(harness.compute.submitted().last().unwrap().max_run_time.clone());
        harness
            .compute
            .set_status(&job_id, RemoteJobStatus::Failed, Some("TIMEOUT"));

        // First poll completes the job, the second clears the batch flag
        let result = harness.pipeline.poll(submission.singleton).await.unwrap();
        assert_eq!(result.completed, 1);
        let result = harness.pipeline.poll(result.singleton).await.unwrap();
        assert!(!result.singleton.jobs_submitted);

        assert!(run_times.len() <= 7, "budget never reached the cap");
    }

    assert_eq!(
        run_times,
        vec!["01:00:00", "02:00:00", "04:00:00", "08:00:00", "16:00:00", "32:00:00", "48:00:00"]
    );
    let entry = harness.repertoire("rep-1").await;
    assert!(!entry.should_cache);
    assert_eq!(harness.alerter.count(AlertKind::JobRetry), 6);
    assert_eq!(harness.alerter.count(AlertKind::JobFailure), 1);
}

#[tokio::test]
async fn test_non_timeout_failure_disables_entry() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let job_id = submit_one(&harness, "rep-1").await;
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Failed, Some("input file missing"));

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Failed))
        .await
        .unwrap();

    match outcome {
        CompletionOutcome::Disabled { reason } => assert!(reason.contains("input file missing")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(harness.repertoire("rep-1").await.time_multiplier, 1);
}

#[tokio::test]
async fn test_clear_study_removes_every_repertoire() {
    let harness = Harness::new();
    let study = NewStudyEntry {
        should_cache: true,
        is_cached: true,
        ..NewStudyEntry::discovered(REPO, STUDY, "dc-1")
    }
    .into_entry();
    harness.registry.seed(study.clone());

    let mut repertoire_ids = Vec::new();
    for rep in ["rep-1", "rep-2", "rep-3"] {
        let mut entry = NewRepertoireEntry::new(REPO, STUDY, rep, "ref").into_entry();
        entry.is_cached = true;
        harness.registry.seed(entry.clone());
        harness
            .statistics
            .record_statistics(rep, &json!({"rows": 1}))
            .await
            .unwrap();
        repertoire_ids.push(entry.id);
    }

    let report = harness
        .pipeline
        .clear(ClearTarget::Study(study.id))
        .await
        .unwrap();
    assert!(report.found);
    assert_eq!(report.repertoires_cleared, 3);

    for id in repertoire_ids {
        assert!(harness.registry.get_entry(id).await.unwrap().is_none());
    }
    assert!(harness.statistics.is_empty());

    let study = harness.study(REPO, STUDY).await;
    assert!(!study.is_cached);
    assert!(study.should_cache);

    let deleted = harness.compute.deleted();
    assert!(deleted.contains(&"/cache/dc-1/statistics/rep-2".to_string()));
    assert!(deleted.contains(&"/cache/dc-1/statistics".to_string()));
}

#[tokio::test]
async fn test_cleared_repertoire_is_rediscovered() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;

    let rep = harness.repertoire("rep-2").await;
    let report = harness
        .pipeline
        .clear(ClearTarget::Repertoire(rep.id))
        .await
        .unwrap();
    assert_eq!(report.repertoires_cleared, 1);
    assert!(harness.registry.get_entry(rep.id).await.unwrap().is_none());

    // The next discovery pass recreates the entry
    let singleton = harness.singleton().await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert_eq!(report.repertoires_created, 1);
    assert_ne!(harness.repertoire("rep-2").await.id, rep.id);
}

#[tokio::test]
async fn test_completion_for_cleared_entry_is_ignored() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let entry = harness.repertoire("rep-1").await;

    harness
        .pipeline
        .clear(ClearTarget::Repertoire(entry.id))
        .await
        .unwrap();
    let records_before = harness.registry.records().len();

    let outcome = harness
        .pipeline
        .finish(
            CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Finished).with_job_id(job_id),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Ignored {
            reason: IgnoreReason::MissingEntry
        }
    );
    assert_eq!(harness.registry.records().len(), records_before);

    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(
            Uuid::new_v4(),
            RemoteJobStatus::Failed,
        ))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Ignored { .. }));
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;
    let records = harness.registry.records();

    let singleton = harness.singleton().await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert_eq!(report.studies_created, 0);
    assert_eq!(report.repertoires_created, 0);
    assert_eq!(harness.registry.records().len(), records.len());
}

#[tokio::test]
async fn test_discovered_studies_start_without_intent() {
    let harness = Harness::new();
    harness.add_repository(REPO);
    harness.compute.add_study(REPO, STUDY, "dc-1");
    harness.compute.add_repertoire(REPO, STUDY, "rep-1");

    let singleton = harness.singleton().await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert_eq!(report.studies_created, 1);
    assert_eq!(report.repertoires_created, 0);

    let study = harness.study(REPO, STUDY).await;
    assert!(!study.should_cache);
    assert!(!study.is_cached);
    let repertoires = harness
        .registry
        .list_repertoire_entries(&RepertoireFilter::new())
        .await
        .unwrap();
    assert!(repertoires.is_empty());
}

#[tokio::test]
async fn test_discovery_skips_non_participating_repositories() {
    let harness = Harness::new();
    let mut settings = stats_cache::registry::RepositorySettings::new("ir-off");
    settings.enable_statistics_cache = false;
    harness.registry.upsert_repository(settings);
    harness.compute.add_study("ir-off", STUDY, "dc-1");

    let singleton = harness.singleton().await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert_eq!(report.repositories, 0);
    let studies = harness
        .registry
        .list_study_entries(&StudyFilter::new())
        .await
        .unwrap();
    assert!(studies.is_empty());
}

#[tokio::test]
async fn test_discovery_continues_past_failed_repository() {
    let harness = Harness::new();
    harness.add_repository("ir-1");
    harness.add_repository("ir-2");
    harness.compute.fail_repository("ir-1");
    harness.compute.add_study("ir-2", "PRJNA2", "dc-2");

    let singleton = harness.singleton().await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert_eq!(report.repositories, 2);
    assert_eq!(report.failed_repositories, vec!["ir-1".to_string()]);
    assert_eq!(report.studies_created, 1);
    assert_eq!(harness.study("ir-2", "PRJNA2").await.download_cache_id, "dc-2");
    assert!(harness.alerter.count(AlertKind::Transient) >= 1);
}

#[tokio::test]
async fn test_duplicate_upstream_repertoire_is_integrity_error() {
    let harness = Harness::new();
    harness.add_repository(REPO);
    harness.compute.add_study(REPO, STUDY, "dc-1");
    harness.compute.add_repertoire(REPO, STUDY, "rep-1");
    harness.compute.add_repertoire(REPO, STUDY, "rep-1");

    let singleton = harness.singleton().await;
    harness.pipeline.discover(&singleton).await.unwrap();
    harness.opt_in(REPO, STUDY).await;
    let report = harness.pipeline.discover(&singleton).await.unwrap();

    assert_eq!(report.failed_repositories, vec![REPO.to_string()]);
    assert_eq!(harness.alerter.count(AlertKind::Integrity), 1);
}

#[tokio::test]
async fn test_disabled_cache_skips_discovery_and_submission() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;

    let mut singleton = harness.singleton().await;
    singleton.enable_cache = false;
    harness.registry.update_singleton(&singleton).await.unwrap();

    let report = harness.pipeline.discover(&singleton).await.unwrap();
    assert!(report.skipped);
    let result = harness.pipeline.submit(singleton).await.unwrap();
    assert!(result.submitted.is_empty());
    assert!(harness.compute.submitted().is_empty());
}

#[tokio::test]
async fn test_submission_respects_max_jobs() {
    let harness = Harness::with_config(test_config().with_max_jobs(2));
    harness
        .seed_study(REPO, STUDY, &["rep-1", "rep-2", "rep-3", "rep-4", "rep-5"])
        .await;

    let singleton = harness.singleton().await;
    let result = harness.pipeline.submit(singleton).await.unwrap();
    assert_eq!(result.submitted.len(), 2);
    assert!(result.singleton.jobs_submitted);

    let outstanding = harness
        .registry
        .list_repertoire_entries(&RepertoireFilter::outstanding())
        .await
        .unwrap();
    assert_eq!(outstanding.len(), 2);

    // The flag blocks a second batch until polling drains the first
    let again = harness.pipeline.submit(result.singleton).await.unwrap();
    assert!(again.submitted.is_empty());
    assert_eq!(harness.compute.submitted().len(), 2);
}

#[tokio::test]
async fn test_outstanding_jobs_restore_submission_flag() {
    let harness = Harness::with_config(test_config().with_max_jobs(1));
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;
    submit_one(&harness, "rep-1").await;

    let mut singleton = harness.singleton().await;
    singleton.jobs_submitted = false;
    harness.registry.update_singleton(&singleton).await.unwrap();

    let result = harness.pipeline.submit(singleton).await.unwrap();
    assert!(result.submitted.is_empty());
    assert!(result.singleton.jobs_submitted);
    assert!(harness.singleton().await.jobs_submitted);
}

#[tokio::test]
async fn test_poller_clears_flag_when_nothing_outstanding() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;

    // Still running: the flag stays set
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Running, None);
    let result = harness
        .pipeline
        .poll(harness.singleton().await)
        .await
        .unwrap();
    assert_eq!(result.outstanding, 1);
    assert_eq!(result.completed, 0);
    assert!(harness.singleton().await.jobs_submitted);

    let path = harness.artifact_path("rep-1").await;
    harness.compute.put_artifact(&path, br#"{"rows": 10}"#);
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);
    let result = harness.pipeline.poll(result.singleton).await.unwrap();
    assert_eq!(result.completed, 1);
    assert!(harness.repertoire("rep-1").await.is_cached);

    let result = harness.pipeline.poll(result.singleton).await.unwrap();
    assert_eq!(result.outstanding, 0);
    assert!(!harness.singleton().await.jobs_submitted);
}

#[tokio::test]
async fn test_poller_continues_past_status_failure() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;
    let singleton = harness.singleton().await;
    harness.pipeline.submit(singleton).await.unwrap();

    // rep-1 points at a job the platform no longer knows
    let mut lost = harness.repertoire("rep-1").await;
    lost.statistics_job_id = Some("job-gone".to_string());
    harness.update(CacheRecord::Repertoire(lost)).await;

    let job_id = harness.repertoire("rep-2").await.statistics_job_id.unwrap();
    let path = harness.artifact_path("rep-2").await;
    harness.compute.put_artifact(&path, br#"{"rows": 3}"#);
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);

    let result = harness
        .pipeline
        .poll(harness.singleton().await)
        .await
        .unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(result.completed, 1);
    assert!(harness.repertoire("rep-2").await.is_cached);
}

#[tokio::test]
async fn test_duplicate_completion_is_ignored() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let path = harness.artifact_path("rep-1").await;
    harness.compute.put_artifact(&path, br#"{"rows": 1}"#);
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);

    let entry = harness.repertoire("rep-1").await;
    let event = CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Finished)
        .with_job_id(job_id.clone());

    let first = harness.pipeline.finish(event.clone()).await.unwrap();
    let second = harness.pipeline.finish(event).await.unwrap();
    assert_eq!(first, CompletionOutcome::Cached);
    assert_eq!(
        second,
        CompletionOutcome::Ignored {
            reason: IgnoreReason::NoJob
        }
    );
    assert_eq!(harness.pipeline.stats().repertoires_cached, 1);
}

#[tokio::test]
async fn test_superseded_job_completion_is_ignored() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let entry = harness.repertoire("rep-1").await;

    let outcome = harness
        .pipeline
        .finish(
            CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Failed)
                .with_job_id("job-older"),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Ignored {
            reason: IgnoreReason::JobMismatch
        }
    );
    assert_eq!(
        harness.repertoire("rep-1").await.statistics_job_id,
        Some(job_id)
    );
}

#[tokio::test]
async fn test_missing_artifact_disables_entry() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Finished))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Disabled { .. }));

    let entry = harness.repertoire("rep-1").await;
    assert!(!entry.should_cache);
    assert!(!entry.is_cached);
    assert!(entry.statistics_job_id.is_none());
    assert!(!harness.statistics.contains("rep-1"));
    assert_eq!(harness.alerter.count(AlertKind::JobFailure), 1);
}

#[tokio::test]
async fn test_invalid_artifact_disables_entry() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let path = harness.artifact_path("rep-1").await;
    harness.compute.put_artifact(&path, b"not json");
    harness
        .compute
        .set_status(&job_id, RemoteJobStatus::Finished, None);

    let entry = harness.repertoire("rep-1").await;
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Finished))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Disabled { .. }));
    assert!(harness.statistics.is_empty());
}

#[tokio::test]
async fn test_study_aggregate_follows_wanted_repertoires() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1", "rep-2"]).await;
    let singleton = harness.singleton().await;
    let submission = harness.pipeline.submit(singleton).await.unwrap();
    assert_eq!(submission.submitted.len(), 2);

    let rep1 = harness.repertoire("rep-1").await;
    let path = harness.artifact_path("rep-1").await;
    harness.compute.put_artifact(&path, br#"{"rows": 1}"#);
    harness.compute.set_status(
        rep1.statistics_job_id.as_deref().unwrap(),
        RemoteJobStatus::Finished,
        None,
    );
    harness
        .pipeline
        .finish(CompletionEvent::from_webhook(rep1.id, RemoteJobStatus::Finished))
        .await
        .unwrap();
    assert!(!harness.study(REPO, STUDY).await.is_cached);

    // Disabling the other child leaves only cached wanted children
    let rep2 = harness.repertoire("rep-2").await;
    harness.compute.set_status(
        rep2.statistics_job_id.as_deref().unwrap(),
        RemoteJobStatus::Failed,
        Some("segfault"),
    );
    harness
        .pipeline
        .finish(CompletionEvent::from_webhook(rep2.id, RemoteJobStatus::Failed))
        .await
        .unwrap();
    assert!(harness.study(REPO, STUDY).await.is_cached);
}

#[tokio::test]
async fn test_non_terminal_event_changes_nothing() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let entry = harness.repertoire("rep-1").await;

    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_webhook(entry.id, RemoteJobStatus::Running))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Ignored {
            reason: IgnoreReason::NonTerminal
        }
    );
    assert_eq!(
        harness.repertoire("rep-1").await.statistics_job_id,
        Some(job_id)
    );
}

#[tokio::test]
async fn test_poll_keeps_concurrent_disable() {
    let harness = Harness::new();
    harness.singleton().await;
    harness.registry.set_jobs_submitted(true).await.unwrap();
    let loaded = harness.singleton().await;
    assert!(loaded.enable_cache && loaded.jobs_submitted);

    // Switched off after the stage loaded its singleton
    let admin = AdminService::direct(harness.pipeline.clone());
    assert!(admin.disable().await.success);

    let result = harness.pipeline.poll(loaded).await.unwrap();
    assert_eq!(result.outstanding, 0);
    let stored = harness.singleton().await;
    assert!(!stored.enable_cache);
    assert!(!stored.jobs_submitted);
}

#[tokio::test]
async fn test_submit_keeps_concurrent_disable() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let loaded = harness.singleton().await;

    let admin = AdminService::direct(harness.pipeline.clone());
    assert!(admin.disable().await.success);

    let result = harness.pipeline.submit(loaded).await.unwrap();
    assert_eq!(result.submitted.len(), 1);
    let stored = harness.singleton().await;
    assert!(!stored.enable_cache);
    assert!(stored.jobs_submitted);

    // The next pass sees the switch
    let again = harness.pipeline.submit(stored).await.unwrap();
    assert!(again.submitted.is_empty());
}

#[tokio::test]
async fn test_clear_keeps_study_intent() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let study = harness.study(REPO, STUDY).await;

    harness
        .pipeline
        .clear(ClearTarget::Study(study.id))
        .await
        .unwrap();
    let stored = harness.study(REPO, STUDY).await;
    assert!(stored.should_cache);
    assert!(!stored.is_cached);
    assert_eq!(stored.download_cache_id, study.download_cache_id);
}

#[tokio::test]
async fn test_status_report_for_other_job_is_ignored() {
    let harness = Harness::new();
    harness.seed_study(REPO, STUDY, &["rep-1"]).await;
    let job_id = submit_one(&harness, "rep-1").await;
    let entry = harness.repertoire("rep-1").await;

    let report = JobStatusReport::new("job-other", RemoteJobStatus::Finished);
    let outcome = harness
        .pipeline
        .finish(CompletionEvent::from_report(entry.id, report))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Ignored {
            reason: IgnoreReason::JobMismatch
        }
    );
    let stored = harness.repertoire("rep-1").await;
    assert_eq!(stored.statistics_job_id, Some(job_id));
    assert!(!stored.is_cached);
}
