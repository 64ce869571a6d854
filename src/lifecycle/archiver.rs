//! Archive worker (§4.2): single-consumer background task that drives a completed job
//! through metadata warm-up, the external archive call, and footprint/energy derivation.
//!
//! Grounded on `services/event_broadcaster.rs`'s channel-wrapper shape and
//! `services/cleanup.rs`'s `tokio::spawn` background-loop-with-per-iteration-error-isolation
//! idiom (`if let Err(e) = ... { error!(...) }` without aborting the loop).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use crate::entity::job;
use crate::error::RepoResult;
use crate::external::ArchiveBackend;
use crate::models::job::{Job, MonitoringStatus};
use crate::store::Store;

/// Producer handle for `TriggerArchiving`/`WaitForArchiving` (§4.2/§5). Cheap to clone;
/// every clone shares the same channel sender and pending counter.
#[derive(Clone)]
pub struct ArchiveQueue {
    sender: mpsc::Sender<Job>,
    pending: Arc<AtomicI64>,
    drained: Arc<Notify>,
}

impl ArchiveQueue {
    /// Enqueues `job` on the bounded channel (capacity from `Config::archive_channel_capacity`,
    /// default 128) and increments the pending-count barrier. Blocks the caller if the
    /// worker is behind — the intended form of back-pressure (§5).
    pub async fn trigger_archiving(&self, job: Job) -> RepoResult<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).await.is_err() {
            // Worker has shut down; undo the increment so wait_for_archiving doesn't hang.
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Blocks until every enqueued job has been processed (§4.2). No timeout: an
    /// operator-invoked drain.
    pub async fn wait_for_archiving(&self) {
        loop {
            if self.pending.load(Ordering::SeqCst) <= 0 {
                return;
            }
            self.drained.notified().await;
        }
    }

    pub fn pending_count(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Builds the producer handle and the worker future. The caller `tokio::spawn`s the
/// worker; dropping every `ArchiveQueue` clone closes the channel and terminates it
/// (§4.2 step 1: "closing the channel terminates the worker").
pub fn spawn_archive_queue(
    store: Store,
    archive: Arc<dyn ArchiveBackend>,
    capacity: usize,
) -> (ArchiveQueue, impl std::future::Future<Output = ()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let pending = Arc::new(AtomicI64::new(0));
    let drained = Arc::new(Notify::new());

    let queue = ArchiveQueue {
        sender: tx,
        pending: pending.clone(),
        drained: drained.clone(),
    };

    let worker = run_worker(store, archive, rx, pending, drained);
    (queue, worker)
}

async fn run_worker(
    store: Store,
    archive: Arc<dyn ArchiveBackend>,
    mut rx: mpsc::Receiver<Job>,
    pending: Arc<AtomicI64>,
    drained: Arc<Notify>,
) {
    info!("archive worker started");
    while let Some(job) = rx.recv().await {
        if let Err(e) = process_one(&store, archive.as_ref(), &job).await {
            error!(job_id = job.id, error = %e, "archive worker: job archiving failed");
            if let Err(mark_err) = mark_failed(&store, job.id).await {
                error!(job_id = job.id, error = %mark_err, "failed to mark job archiving_failed");
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
        drained.notify_waiters();
    }
    info!("archive worker terminated: channel closed");
}

async fn mark_failed(store: &Store, id: i64) -> RepoResult<()> {
    let active = job::ActiveModel {
        id: Set(id),
        monitoring_status: Set(MonitoringStatus::ArchivingFailed.as_i32()),
        ..Default::default()
    };
    job::Entity::update(active).exec(store.conn()).await?;
    Ok(())
}

/// Self-contained per-job transaction (§4.2): metadata warm-up, archive call, footprint
/// and energy recomputation, single update. A failure at any step leaves the job
/// `archiving_failed`; the worker itself never aborts (§4.2 failure isolation).
async fn process_one(store: &Store, archive: &dyn ArchiveBackend, job: &Job) -> RepoResult<()> {
    archive.fetch_metadata(job).await?;

    let meta = archive.archive_job(job).await?;

    let sub_cluster = archive.get_sub_cluster(&job.cluster, &job.subcluster).await?;

    let mut footprint = serde_json::Map::new();
    for metric_name in &sub_cluster.footprint {
        let Ok(idx) = sub_cluster.metric_index(metric_name) else {
            continue;
        };
        let Some(summary) = meta.statistics.get(metric_name) else {
            continue;
        };
        let stat_type = sub_cluster.metric_config[idx].stat_type.as_str();
        let value = match stat_type {
            "avg" => summary.avg,
            "min" => summary.min,
            "max" => summary.max,
            other => {
                warn!(metric = metric_name, stat_type = other, "unknown footprint stat type, skipping");
                continue;
            }
        };
        footprint.insert(format!("{metric_name}_{stat_type}"), serde_json::json!(value));
    }

    let mut energy_footprint = serde_json::Map::new();
    let mut total_energy = 0.0_f64;
    for metric_name in &sub_cluster.energy_footprint {
        // §9 Open Question resolution: `Ok(idx)` is the success branch; `Err` (metric not
        // configured for this sub-cluster) skips the metric rather than replicating the
        // source's inverted error check.
        let Ok(idx) = sub_cluster.metric_index(metric_name) else {
            continue;
        };
        if sub_cluster.metric_config[idx].unit_kind != "power" {
            continue;
        }
        let Some(summary) = meta.statistics.get(metric_name) else {
            continue;
        };
        let kwh = round2(summary.avg * job.num_nodes as f64 * (job.duration as f64 / 3600.0) / 1000.0);
        energy_footprint.insert(metric_name.clone(), serde_json::json!(kwh));
        total_energy += kwh;
    }

    let active = job::ActiveModel {
        id: Set(job.id),
        monitoring_status: Set(MonitoringStatus::ArchivingSuccessful.as_i32()),
        footprint: Set(serde_json::Value::Object(footprint)),
        energy_footprint: Set(serde_json::Value::Object(energy_footprint)),
        energy: Set(round2(total_energy)),
        ..Default::default()
    };
    job::Entity::update(active).exec(store.conn()).await?;
    store.value_cache.invalidate(job.id);

    info!(job_id = job.id, "job archived successfully");
    Ok(())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::fakes::FakeArchive;
    use crate::external::{MetricConfig, MetricSummary, SubClusterConfig};
    use std::collections::HashMap;

    fn sample_job(num_nodes: i32, duration: i64) -> Job {
        Job {
            id: 1,
            job_id: 1,
            hpc_user: "alice".into(),
            project: "p".into(),
            cluster: "fritz".into(),
            subcluster: "main".into(),
            cluster_partition: "default".into(),
            array_job_id: 0,
            num_nodes,
            num_hwthreads: 1,
            num_acc: 0,
            shared: "none".into(),
            monitoring_status: MonitoringStatus::RunningOrArchiving,
            smt: 1,
            state: crate::models::job::JobState::Completed,
            start_time: 0,
            duration,
            walltime: 0,
            resources: vec![crate::models::job::Resource {
                hostname: "n01".into(),
                hw_threads: vec![],
                accelerators: vec![],
            }],
            footprint: Default::default(),
            energy: 0.0,
            energy_footprint: Default::default(),
            meta_data: Default::default(),
        }
    }

    /// S5 — Energy computation: num_nodes=4, duration=7200, avg power 250W →
    /// 250*4*(7200/3600)/1000 = 2.0 kWh.
    #[tokio::test]
    async fn energy_computation_matches_spec_example() {
        let archive = FakeArchive::default();
        *archive.job_meta.lock().unwrap() = Some(crate::external::JobMeta {
            statistics: HashMap::from([(
                "power".to_string(),
                MetricSummary {
                    avg: 250.0,
                    min: 200.0,
                    max: 300.0,
                },
            )]),
        });
        archive.sub_clusters.lock().unwrap().insert(
            ("fritz".to_string(), "main".to_string()),
            SubClusterConfig {
                metric_config: vec![MetricConfig {
                    name: "power".into(),
                    stat_type: "avg".into(),
                    unit_kind: "power".into(),
                    peak: 500.0,
                }],
                energy_footprint: vec!["power".into()],
                footprint: vec!["power".into()],
            },
        );

        let job = sample_job(4, 7200);
        let meta = archive.archive_job(&job).await.unwrap();
        let sub_cluster = archive.get_sub_cluster(&job.cluster, &job.subcluster).await.unwrap();

        let idx = sub_cluster.metric_index("power").unwrap();
        assert_eq!(sub_cluster.metric_config[idx].unit_kind, "power");
        let summary = meta.statistics.get("power").unwrap();
        let kwh = round2(summary.avg * job.num_nodes as f64 * (job.duration as f64 / 3600.0) / 1000.0);
        assert_eq!(kwh, 2.0);
    }

    #[tokio::test]
    async fn archive_failure_does_not_panic_caller() {
        let archive = FakeArchive::default();
        *archive.fail_archive.lock().unwrap() = true;
        let job = sample_job(1, 100);
        assert!(archive.archive_job(&job).await.is_err());
    }
}
