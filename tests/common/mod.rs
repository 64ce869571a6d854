//! Shared scaffolding for the integration suite: an in-memory SQLite `Store` migrated to
//! the current schema version, a `Job` builder, and fakes for the external collaborator
//! traits (duplicated from `external::fakes` since `#[cfg(test)]` items in the library are
//! not visible to a separate `tests/` binary).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;

use jobrepo_core::error::RepoResult;
use jobrepo_core::external::{ArchiveBackend, JobMeta, MetricDispatcher, SubClusterConfig};
use jobrepo_core::migration::Migrator;
use jobrepo_core::models::job::{Job, JobState, MonitoringStatus, Resource};
use jobrepo_core::store::Store;

/// Brings up a fresh in-memory SQLite database at the target schema version and wraps it
/// in a `Store`. Each call gets its own isolated database.
pub async fn test_store() -> Store {
    let conn = Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    Migrator::up(&conn, None).await.expect("run migrations");
    Store::from_connection(conn, 1024 * 1024)
}

/// A minimal, fully-populated `Job` with sensible defaults; callers override only the
/// fields a given scenario cares about.
pub fn sample_job(job_id: i64, cluster: &str, hpc_user: &str, start_time: i64) -> Job {
    Job {
        id: 0,
        job_id,
        hpc_user: hpc_user.to_string(),
        project: "proj-a".to_string(),
        cluster: cluster.to_string(),
        subcluster: "main".to_string(),
        cluster_partition: "default".to_string(),
        array_job_id: 0,
        num_nodes: 2,
        num_hwthreads: 16,
        num_acc: 0,
        shared: "none".to_string(),
        monitoring_status: MonitoringStatus::RunningOrArchiving,
        smt: 1,
        state: JobState::Running,
        start_time,
        duration: 0,
        walltime: 3600,
        resources: vec![Resource {
            hostname: "n01".to_string(),
            hw_threads: vec![],
            accelerators: vec![],
        }],
        footprint: Default::default(),
        energy: 0.0,
        energy_footprint: Default::default(),
        meta_data: Default::default(),
    }
}

pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[derive(Default)]
pub struct FakeArchive {
    pub sub_clusters: Mutex<HashMap<(String, String), SubClusterConfig>>,
    pub archived: Mutex<Vec<i64>>,
    pub fail_archive: Mutex<bool>,
    pub fail_fetch_metadata: Mutex<bool>,
    pub job_meta: Mutex<Option<JobMeta>>,
}

#[async_trait]
impl ArchiveBackend for FakeArchive {
    async fn get_sub_cluster(&self, cluster: &str, subcluster: &str) -> RepoResult<SubClusterConfig> {
        Ok(self
            .sub_clusters
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), subcluster.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_metadata(&self, _job: &Job) -> RepoResult<()> {
        if *self.fail_fetch_metadata.lock().unwrap() {
            return Err(jobrepo_core::error::RepoError::Validation(
                "fake metadata fetch failure".into(),
            ));
        }
        Ok(())
    }

    async fn archive_job(&self, job: &Job) -> RepoResult<JobMeta> {
        if *self.fail_archive.lock().unwrap() {
            return Err(jobrepo_core::error::RepoError::Validation(
                "fake archive failure".into(),
            ));
        }
        self.archived.lock().unwrap().push(job.id);
        Ok(self.job_meta.lock().unwrap().clone().unwrap_or_default())
    }

    async fn update_tags(&self, _job_id: i64, _tags: &[String]) -> RepoResult<()> {
        Ok(())
    }

    async fn update_metadata(&self, _job_id: i64, _meta: &HashMap<String, String>) -> RepoResult<()> {
        Ok(())
    }

    async fn global_peak(&self, _metric: &str) -> RepoResult<Option<f64>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct FakeMetricDispatcher {
    pub averages: Mutex<HashMap<String, f64>>,
}

#[async_trait]
impl MetricDispatcher for FakeMetricDispatcher {
    async fn load_averages(&self, _job: &Job, metrics: &[String]) -> RepoResult<HashMap<String, f64>> {
        let stored = self.averages.lock().unwrap();
        Ok(metrics
            .iter()
            .filter_map(|m| stored.get(m).map(|v| (m.clone(), *v)))
            .collect())
    }
}
