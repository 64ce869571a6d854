//! Query-engine input shapes: the typed predicate sum that makes up a `JobFilter` (§4.3).

use serde::{Deserialize, Serialize};

use crate::models::job::JobState;

/// Scalar string comparison, applied to `cluster`/`partition`/`project`/`hpc_user`/`job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StringInput {
    Eq(String),
    Neq(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    In(Vec<String>),
}

/// Inclusive integer range; either bound may be absent for an open-ended comparison.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IntRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Inclusive float range, same shape as `IntRange` but for `energy`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FloatRange {
    pub from: Option<f64>,
    pub to: Option<f64>,
}

/// Named relative windows accepted by `TimeRange::range` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeWindow {
    Last6h,
    Last24h,
    Last7d,
    Last30d,
}

impl RelativeWindow {
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Last6h => 6 * 3600,
            Self::Last24h => 24 * 3600,
            Self::Last7d => 7 * 24 * 3600,
            Self::Last30d => 30 * 24 * 3600,
        }
    }
}

/// `start_time` filter: either explicit bounds or a named relative window, resolved
/// against `now` at query time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub range: Option<RelativeWindow>,
}

/// One {metric, FloatRange} pair of the `MetricStats` predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricStatRange {
    pub metric: String,
    pub range: FloatRange,
}

/// The full sum-of-optional-predicates filter composed by `query::filter` into a
/// `sea_orm::Condition` (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub db_id: Option<Vec<i64>>,
    pub cluster: Option<StringInput>,
    pub partition: Option<StringInput>,
    pub project: Option<StringInput>,
    pub user: Option<StringInput>,
    pub job_id: Option<StringInput>,
    pub state: Option<Vec<JobState>>,
    pub shared: Option<String>,
    pub num_nodes: Option<IntRange>,
    pub num_accelerators: Option<IntRange>,
    pub num_hwthreads: Option<IntRange>,
    pub duration: Option<IntRange>,
    pub energy: Option<FloatRange>,
    pub array_job_id: Option<i64>,
    pub start_time: Option<TimeRange>,
    pub tags: Option<Vec<i64>>,
    pub metric_stats: Option<Vec<MetricStatRange>>,
    pub node: Option<StringInput>,
    pub job_name: Option<StringInput>,
    pub schedule: Option<ScheduleKind>,
    pub min_running_for: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Interactive,
    Batch,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Whether an `OrderByInput` targets a plain column or a footprint sub-document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderByKind {
    Col,
    Footprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByInput {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: OrderByKind,
    pub direction: SortDirection,
}

/// `(page, items_per_page)`; `items_per_page == -1` disables pagination (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub items_per_page: i64,
}

impl PageRequest {
    pub fn is_paginated(&self) -> bool {
        self.items_per_page >= 0
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).max(0) as u64 * self.items_per_page.max(0) as u64
    }

    pub fn limit(&self) -> u64 {
        self.items_per_page.max(0) as u64
    }
}
