//! Archive worker end-to-end scenario (spec §8: S5), driven through the real bounded
//! channel against an in-memory database rather than asserting the arithmetic in
//! isolation.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use jobrepo_core::external::{ArchiveBackend, JobMeta, MetricConfig, MetricSummary, SubClusterConfig};
use jobrepo_core::lifecycle::{spawn_archive_queue, Engine};
use jobrepo_core::models::job::MonitoringStatus;
use jobrepo_core::query::QueryEngine;

/// S5 — Energy computation, run through the full archive worker: a completed job with
/// num_nodes=4, duration=7200, average power 250W ends up with energy_footprint["power"]
/// = 2.0 kWh, total energy = 2.0, and monitoring_status flipped to archiving_successful.
#[tokio::test]
async fn s5_archive_worker_computes_energy_and_flips_monitoring_status() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let mut job = common::sample_job(1, "fritz", "alice", 1700000000);
    job.num_nodes = 4;
    job.state = jobrepo_core::models::job::JobState::Completed;
    job.duration = 7200;
    engine.start(&job).await.unwrap();
    let synced = engine.sync_jobs().await.unwrap();
    let durable_job = synced[0].clone();

    let archive = Arc::new(common::FakeArchive::default());
    archive.sub_clusters.lock().unwrap().insert(
        ("fritz".to_string(), "main".to_string()),
        SubClusterConfig {
            metric_config: vec![MetricConfig {
                name: "power".to_string(),
                stat_type: "avg".to_string(),
                unit_kind: "power".to_string(),
                peak: 500.0,
            }],
            energy_footprint: vec!["power".to_string()],
            footprint: vec!["power".to_string()],
        },
    );
    *archive.job_meta.lock().unwrap() = Some(JobMeta {
        statistics: HashMap::from([(
            "power".to_string(),
            MetricSummary { avg: 250.0, min: 200.0, max: 300.0 },
        )]),
    });

    let (queue, worker) = spawn_archive_queue(store.clone(), archive.clone() as Arc<dyn ArchiveBackend>, 128);
    let worker_handle = tokio::spawn(worker);

    queue.trigger_archiving(durable_job.clone()).await.unwrap();
    queue.wait_for_archiving().await;
    drop(queue);
    worker_handle.await.unwrap();

    let updated = query.find_by_id_direct(durable_job.id).await.unwrap();
    assert_eq!(updated.monitoring_status, MonitoringStatus::ArchivingSuccessful);
    assert_eq!(updated.energy, 2.0);
    assert_eq!(
        updated.energy_footprint.get("power").and_then(|v| v.as_f64()),
        Some(2.0)
    );
    assert_eq!(
        updated.footprint.get("power_avg").and_then(|v| v.as_f64()),
        Some(250.0)
    );
}

/// A fetch_metadata failure marks the job archiving_failed without ever reaching
/// archive_job (§4.2 step 2).
#[tokio::test]
async fn archive_worker_marks_failed_on_metadata_fetch_error() {
    let store = common::test_store().await;
    let engine = Engine::new(store.clone());
    let query = QueryEngine::new(store.clone());

    let job = common::sample_job(2, "fritz", "alice", 1700000000);
    engine.start(&job).await.unwrap();
    let synced = engine.sync_jobs().await.unwrap();
    let durable_job = synced[0].clone();

    let archive = Arc::new(common::FakeArchive::default());
    *archive.fail_fetch_metadata.lock().unwrap() = true;

    let (queue, worker) = spawn_archive_queue(store.clone(), archive.clone() as Arc<dyn ArchiveBackend>, 128);
    let worker_handle = tokio::spawn(worker);

    queue.trigger_archiving(durable_job.clone()).await.unwrap();
    queue.wait_for_archiving().await;
    drop(queue);
    worker_handle.await.unwrap();

    let updated = query.find_by_id_direct(durable_job.id).await.unwrap();
    assert_eq!(updated.monitoring_status, MonitoringStatus::ArchivingFailed);
    assert!(archive.archived.lock().unwrap().is_empty(), "archive_job must never be called");
}
