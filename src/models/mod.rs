//! Domain DTOs, separate from `entity::*`'s SeaORM row shapes (§3.1).

pub mod filter;
pub mod job;
pub mod node_state;
pub mod stats;
pub mod tag;
pub mod user;

pub use filter::{
    FloatRange, IntRange, JobFilter, MetricStatRange, OrderByInput, OrderByKind, PageRequest,
    RelativeWindow, ScheduleKind, SortDirection, StringInput, TimeRange,
};
pub use job::{Job, JobState, MonitoringStatus, Resource};
pub use node_state::NodeStateSample;
pub use stats::{DurationBinPreset, GroupBy, HistoPoint, JobsStatistics, StatsSortBy};
pub use tag::{Tag, TagCount, TagScope};
pub use user::{AuthSource, Principal, Role, User};
