//! Statistics/histogram DTOs (§4.4).

use serde::{Deserialize, Serialize};

/// One row of the grouped/ungrouped aggregate result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsStatistics {
    /// Group key value (username, project, cluster, or subcluster); empty for the
    /// ungrouped shape.
    pub id: String,
    /// Populated only for `group_by == hpc_user`, from a left join against `hpc_user`.
    pub name: Option<String>,
    pub total_jobs: i64,
    pub total_users: i64,
    pub total_walltime: i64,
    pub total_nodes: i64,
    pub total_node_hours: i64,
    pub total_cores: i64,
    pub total_core_hours: i64,
    pub total_accs: i64,
    pub total_acc_hours: i64,
    /// Filled in by `AddJobCount`/`AddJobCountGrouped` (§4.4).
    pub running_jobs: i64,
    pub short_jobs: i64,
}

/// Column that `StatsEngine::query_jobs_stats_grouped` groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    HpcUser,
    Project,
    Cluster,
    Subcluster,
}

impl GroupBy {
    pub fn column(&self) -> &'static str {
        match self {
            Self::HpcUser => "hpc_user",
            Self::Project => "project",
            Self::Cluster => "cluster",
            Self::Subcluster => "subcluster",
        }
    }
}

/// Sort key accepted by the statistics engine (§4.4), descending only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatsSortBy {
    TotalJobs,
    TotalUsers,
    TotalWalltime,
    TotalNodes,
    TotalNodeHours,
    TotalCores,
    TotalCoreHours,
    TotalAccs,
    TotalAccHours,
}

impl StatsSortBy {
    /// The aggregate column alias this sort key orders by (§4.4), matching the
    /// `column_as` names `StatsEngine::run_aggregate` assigns in its `SELECT`.
    pub fn column(&self) -> &'static str {
        match self {
            Self::TotalJobs => "total_jobs",
            Self::TotalUsers => "total_users",
            Self::TotalWalltime => "total_walltime",
            Self::TotalNodes => "total_nodes",
            Self::TotalNodeHours => "total_node_hours",
            Self::TotalCores => "total_cores",
            Self::TotalCoreHours => "total_core_hours",
            Self::TotalAccs => "total_accs",
            Self::TotalAccHours => "total_acc_hours",
        }
    }
}

/// One bucket of any histogram shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoPoint {
    pub value: i64,
    pub count: i64,
}

/// Named duration-bin configuration (§4.4): (bin size seconds, bin count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationBinPreset {
    OneMinute,
    TenMinutes,
    OneHour,
    SixHours,
    TwelveHours,
}

impl DurationBinPreset {
    pub fn shape(&self) -> (i64, i64) {
        match self {
            Self::OneMinute => (60, 60),
            Self::TenMinutes => (600, 72),
            Self::OneHour => (3600, 48),
            Self::SixHours => (21600, 12),
            Self::TwelveHours => (43200, 14),
        }
    }

    /// Default shape used when no preset is requested (§4.4): 1h bins, 24 of them.
    pub fn default_shape() -> (i64, i64) {
        (3600, 24)
    }
}
