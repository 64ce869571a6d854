//! Lifecycle Engine end-to-end scenarios (spec §8: S1, S3, property 6).

mod common;

use jobrepo_core::lifecycle::Engine;
use jobrepo_core::models::job::{JobState, MonitoringStatus};
use jobrepo_core::query::QueryEngine;

/// S1 — Lifecycle happy path: insert into the cache, promote via `sync_jobs`, stop, and
/// read back the durable row.
#[tokio::test]
async fn s1_lifecycle_happy_path() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let job = common::sample_job(398998, "fritz", "alice", 1675957496);
    let cache_id = engine.start(&job).await.unwrap();
    assert!(cache_id >= 1);

    let synced = engine.sync_jobs().await.unwrap();
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].job_id, 398998);

    engine
        .stop(synced[0].id, 3600, JobState::Completed, MonitoringStatus::ArchivingSuccessful)
        .await
        .unwrap();

    let found = query.find(398998, Some("fritz"), Some(1675957496)).await.unwrap();
    assert_eq!(found.state, JobState::Completed);
    assert_eq!(found.duration, 3600);
}

/// S3 — Walltime sweep: two running jobs overdue by more than the grace period are
/// flagged failed/archiving_failed/duration=0; the sweep reports the count affected.
#[tokio::test]
async fn s3_walltime_sweep_marks_overdue_jobs_failed() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let now = common::now();
    for (job_id, cluster) in [(1, "fritz"), (2, "fritz")] {
        let mut job = common::sample_job(job_id, cluster, "alice", now - 4000);
        job.walltime = 3600;
        engine.start(&job).await.unwrap();
    }
    engine.sync_jobs().await.unwrap();

    let affected = engine.stop_jobs_exceeding_walltime_by(60).await.unwrap();
    assert_eq!(affected, 2);

    for job_id in [1, 2] {
        let job = query.find(job_id, Some("fritz"), None).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.monitoring_status, MonitoringStatus::ArchivingFailed);
        assert_eq!(job.duration, 0);
    }
}

/// A job within its walltime is left untouched by the sweep.
#[tokio::test]
async fn walltime_sweep_ignores_jobs_within_grace() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let now = common::now();
    let mut job = common::sample_job(3, "fritz", "alice", now - 100);
    job.walltime = 3600;
    engine.start(&job).await.unwrap();
    engine.sync_jobs().await.unwrap();

    let affected = engine.stop_jobs_exceeding_walltime_by(60).await.unwrap();
    assert_eq!(affected, 0);

    let found = query.find(3, Some("fritz"), None).await.unwrap();
    assert_eq!(found.state, JobState::Running);
}

/// Property 6 — idempotence: `sync_jobs` against an empty cache is a no-op both times.
#[tokio::test]
async fn sync_jobs_on_empty_cache_is_idempotent_no_op() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());

    assert!(engine.sync_jobs().await.unwrap().is_empty());
    assert!(engine.sync_jobs().await.unwrap().is_empty());
}

/// Inserting a duplicate (job_id, cluster, start_time) into the cache is rejected as a
/// conflict, not silently accepted (§3 invariant, §7 taxonomy).
#[tokio::test]
async fn duplicate_cached_job_is_a_conflict() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());

    let job = common::sample_job(42, "fritz", "alice", 1700000000);
    engine.start(&job).await.unwrap();

    let err = engine.start(&job).await.unwrap_err();
    assert!(matches!(err, jobrepo_core::error::RepoError::Conflict(_)));
}

/// Property 5 — round trip: resources/footprint/metadata survive `Start` → `SyncJobs` →
/// `Find` with identical values after JSON decode.
#[tokio::test]
async fn round_trip_preserves_sub_documents() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let mut job = common::sample_job(7, "alex", "bob", 1700000000);
    job.meta_data.insert("jobName".to_string(), serde_json::json!("batch-run"));
    job.footprint.insert("mem_bw_avg".to_string(), serde_json::json!(12.5));
    job.resources.push(jobrepo_core::models::job::Resource {
        hostname: "n02".to_string(),
        hw_threads: vec![0, 1, 2, 3],
        accelerators: vec!["gpu0".to_string()],
    });

    engine.start(&job).await.unwrap();
    engine.sync_jobs().await.unwrap();

    let found = query.find(7, Some("alex"), Some(1700000000)).await.unwrap();
    assert_eq!(found.resources.len(), 2);
    assert_eq!(found.resources[1].hostname, "n02");
    assert_eq!(found.resources[1].accelerators, vec!["gpu0".to_string()]);
    assert_eq!(
        found.footprint.get("mem_bw_avg").and_then(|v| v.as_f64()),
        Some(12.5)
    );
    assert_eq!(
        found.meta_data.get("jobName").and_then(|v| v.as_str()),
        Some("batch-run")
    );
}

/// `DeleteJobsBefore` with `omit_tagged` excludes jobs that appear in the junction table.
#[tokio::test]
async fn delete_jobs_before_cutoff_respects_omit_tagged() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());

    let old_time = 1000;
    let mut old_job = common::sample_job(100, "fritz", "alice", old_time);
    old_job.state = JobState::Completed;
    old_job.duration = 60;
    engine.start(&old_job).await.unwrap();
    let mut tagged_job = common::sample_job(101, "fritz", "alice", old_time);
    tagged_job.state = JobState::Completed;
    tagged_job.duration = 60;
    engine.start(&tagged_job).await.unwrap();

    let synced = engine.sync_jobs().await.unwrap();
    assert_eq!(synced.len(), 2);

    use jobrepo_core::entity::job_tag;
    use sea_orm::{ActiveModelTrait, Set};
    let tagged_id = synced.iter().find(|j| j.job_id == 101).unwrap().id;
    // Insert the tag row directly (TagService::add_tag would require a real tag row too;
    // the junction row alone is sufficient to exercise `omit_tagged`).
    job_tag::ActiveModel {
        job_id: Set(tagged_id),
        tag_id: Set(1),
    }
    .insert(store.conn())
    .await
    .unwrap();

    let deleted = engine.delete_jobs_before(2000, true).await.unwrap();
    assert_eq!(deleted, 1);
}
