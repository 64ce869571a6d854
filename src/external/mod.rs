//! External collaborator interfaces (§6/§6.1): the metric archive, the live metric
//! dispatcher, and cluster/metric configuration, each consumed behind an `async_trait` so
//! a host can supply its own adapter over `Arc<dyn Trait>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RepoResult;
use crate::models::job::Job;

/// One metric's average/min/max over a job's lifetime, as returned by `ArchiveJob` (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// `archive.ArchiveJob`'s return shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMeta {
    pub statistics: HashMap<String, MetricSummary>,
}

/// The footprint/energy-footprint stat configuration for one metric of a sub-cluster
/// (`archive.GetSubCluster`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    /// "avg" | "min" | "max" — which of `MetricSummary`'s fields the footprint reads.
    pub stat_type: String,
    /// e.g. "power", used by the energy computation (§4.2).
    pub unit_kind: String,
    /// Historical peak value for this metric on this sub-cluster, used for histogram
    /// bin sizing (§4.4).
    pub peak: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubClusterConfig {
    pub metric_config: Vec<MetricConfig>,
    pub energy_footprint: Vec<String>,
    pub footprint: Vec<String>,
}

impl SubClusterConfig {
    /// `archive.MetricIndex`: resolves a metric name to its position in `metric_config`.
    pub fn metric_index(&self, name: &str) -> RepoResult<usize> {
        self.metric_config
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| {
                crate::error::RepoError::Validation(format!(
                    "metric '{name}' is not configured for this sub-cluster"
                ))
            })
    }
}

/// The metric archive: bulk time-series storage/retrieval lives outside this crate
/// (explicit non-goal, §1); only these calls are consumed.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    async fn get_sub_cluster(&self, cluster: &str, subcluster: &str) -> RepoResult<SubClusterConfig>;

    /// Warms the archive's metadata cache for `job` before `archive_job` is called
    /// (§4.2 archive worker step 2). A failure here marks the job `archiving_failed`
    /// without attempting the archive call itself.
    async fn fetch_metadata(&self, job: &Job) -> RepoResult<()>;

    async fn archive_job(&self, job: &Job) -> RepoResult<JobMeta>;

    async fn update_tags(&self, job_id: i64, tags: &[String]) -> RepoResult<()>;

    async fn update_metadata(&self, job_id: i64, meta: &HashMap<String, String>) -> RepoResult<()>;

    /// Peak enumeration across every known cluster, used when a sub-cluster does not
    /// itself define a peak for a metric (§4.4: "if absent, take the max peak across all
    /// clusters").
    async fn global_peak(&self, metric: &str) -> RepoResult<Option<f64>>;
}

/// Live per-job metric averages for the running-jobs histogram (§4.4).
#[async_trait]
pub trait MetricDispatcher: Send + Sync {
    async fn load_averages(&self, job: &Job, metrics: &[String]) -> RepoResult<HashMap<String, f64>>;
}

/// Cluster/metric configuration lookups that do not require contacting the archive
/// directly (kept separate so a host can back it with a cached/static source).
#[async_trait]
pub trait ClusterConfigProvider: Send + Sync {
    async fn clusters(&self) -> RepoResult<Vec<String>>;
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

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
        async fn get_sub_cluster(
            &self,
            cluster: &str,
            subcluster: &str,
        ) -> RepoResult<SubClusterConfig> {
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
                return Err(crate::error::RepoError::Validation("fake metadata fetch failure".into()));
            }
            Ok(())
        }

        async fn archive_job(&self, job: &Job) -> RepoResult<JobMeta> {
            if *self.fail_archive.lock().unwrap() {
                return Err(crate::error::RepoError::Validation("fake archive failure".into()));
            }
            self.archived.lock().unwrap().push(job.id);
            Ok(self
                .job_meta
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_default())
        }

        async fn update_tags(&self, _job_id: i64, _tags: &[String]) -> RepoResult<()> {
            Ok(())
        }

        async fn update_metadata(
            &self,
            _job_id: i64,
            _meta: &HashMap<String, String>,
        ) -> RepoResult<()> {
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
        async fn load_averages(
            &self,
            _job: &Job,
            metrics: &[String],
        ) -> RepoResult<HashMap<String, f64>> {
            let stored = self.averages.lock().unwrap();
            Ok(metrics
                .iter()
                .filter_map(|m| stored.get(m).map(|v| (m.clone(), *v)))
                .collect())
        }
    }
}
