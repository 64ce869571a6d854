//! Job-facing enums and sub-document shapes (§3).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle state (`job.job_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Stopped,
    Preempted,
    OutOfMemory,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Stopped => "stopped",
            Self::Preempted => "preempted",
            Self::OutOfMemory => "out_of_memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "timeout" => Some(Self::Timeout),
            "stopped" => Some(Self::Stopped),
            "preempted" => Some(Self::Preempted),
            "out_of_memory" => Some(Self::OutOfMemory),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Terminal states are never re-swept by the walltime/duration jobs.
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Archive progress flag, distinct from `JobState` (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    RunningOrArchiving,
    ArchivingSuccessful,
    ArchivingFailed,
    Disabled,
}

impl MonitoringStatus {
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::RunningOrArchiving => 0,
            Self::ArchivingSuccessful => 1,
            Self::ArchivingFailed => 2,
            Self::Disabled => 3,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::RunningOrArchiving),
            1 => Some(Self::ArchivingSuccessful),
            2 => Some(Self::ArchivingFailed),
            3 => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Jobs in these statuses are skipped in histogram/statistics bucket computation (§4.4).
    pub fn skipped_in_stats(&self) -> bool {
        matches!(self, Self::ArchivingFailed | Self::Disabled)
    }
}

/// One entry in a job's `resources` JSON array (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hw_threads: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accelerators: Vec<String>,
}

/// A fully assembled job, decoded from either the cache or durable row plus its JSON
/// sub-documents. This is the shape returned by the Filter & Query Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_id: i64,
    pub hpc_user: String,
    pub project: String,
    pub cluster: String,
    pub subcluster: String,
    pub cluster_partition: String,
    pub array_job_id: i64,
    pub num_nodes: i32,
    pub num_hwthreads: i32,
    pub num_acc: i32,
    pub shared: String,
    pub monitoring_status: MonitoringStatus,
    pub smt: i32,
    pub state: JobState,
    pub start_time: i64,
    /// Authoritative only when `state` is terminal; recomputed as `now - start_time` on
    /// read when `state == Running` (§3 invariant 2, §8 property 1).
    pub duration: i64,
    pub walltime: i64,
    pub resources: Vec<Resource>,
    pub footprint: serde_json::Map<String, serde_json::Value>,
    pub energy: f64,
    pub energy_footprint: serde_json::Map<String, serde_json::Value>,
    pub meta_data: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    /// Applies the running-job duration substitution (§3, §8 property 1).
    pub fn effective_duration(&self, now: i64) -> i64 {
        if self.state.is_running() {
            now - self.start_time
        } else {
            self.duration
        }
    }
}

macro_rules! impl_from_row {
    ($model:ty) => {
        impl TryFrom<$model> for Job {
            type Error = crate::error::RepoError;

            fn try_from(m: $model) -> Result<Self, Self::Error> {
                Ok(Job {
                    id: m.id,
                    job_id: m.job_id,
                    hpc_user: m.hpc_user,
                    project: m.project,
                    cluster: m.cluster,
                    subcluster: m.subcluster,
                    cluster_partition: m.cluster_partition,
                    array_job_id: m.array_job_id,
                    num_nodes: m.num_nodes,
                    num_hwthreads: m.num_hwthreads,
                    num_acc: m.num_acc,
                    shared: m.shared,
                    monitoring_status: MonitoringStatus::from_i32(m.monitoring_status)
                        .ok_or_else(|| {
                            crate::error::RepoError::Integrity(format!(
                                "unknown monitoring_status {}",
                                m.monitoring_status
                            ))
                        })?,
                    smt: m.smt,
                    state: JobState::parse(&m.job_state).ok_or_else(|| {
                        crate::error::RepoError::Integrity(format!(
                            "unknown job_state '{}'",
                            m.job_state
                        ))
                    })?,
                    start_time: m.start_time,
                    duration: m.duration,
                    walltime: m.walltime,
                    resources: serde_json::from_value(m.resources)?,
                    footprint: serde_json::from_value(m.footprint)?,
                    energy: m.energy,
                    energy_footprint: serde_json::from_value(m.energy_footprint)?,
                    meta_data: serde_json::from_value(m.meta_data)?,
                })
            }
        }
    };
}

impl_from_row!(crate::entity::job::Model);
impl_from_row!(crate::entity::job_cache::Model);
