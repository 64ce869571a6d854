//! Statistics Engine (§4.4): grouped/ungrouped aggregates and histogram construction.

pub mod histogram;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::config::Config;
use crate::error::{RepoError, RepoResult};
use crate::models::filter::JobFilter;
use crate::models::job::MonitoringStatus;
use crate::models::stats::{GroupBy, JobsStatistics, StatsSortBy};
use crate::models::user::Principal;
use crate::query::{filter as job_filter, visibility};
use crate::store::Store;

pub use histogram::HistogramEngine;

/// The `CASE WHEN job_state = 'running' THEN (now - start_time) ELSE duration END`
/// fragment, shared by every aggregate so the running-job substitution (§8 property 1)
/// can never drift between the grouped and ungrouped query shapes (§4.4.1).
fn effective_duration_sql(now: i64) -> String {
    format!("CASE WHEN job_state = 'running' THEN ({now} - start_time) ELSE duration END")
}

pub struct StatsEngine {
    store: Store,
    short_running_jobs_duration_secs: i64,
}

impl StatsEngine {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            short_running_jobs_duration_secs: config.short_running_jobs_duration_secs,
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn row_i64(row: &serde_json::Value, key: &str) -> i64 {
        row.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    async fn run_aggregate(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        group_column: Option<&str>,
        sort: Option<StatsSortBy>,
    ) -> RepoResult<Vec<JobsStatistics>> {
        let now = Self::now();
        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, filters, now)?;
        let dur = effective_duration_sql(now);

        let mut select = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .select_only()
            .column_as(Expr::cust("COUNT(*)"), "total_jobs")
            .column_as(Expr::cust("COUNT(DISTINCT hpc_user)"), "total_users")
            .column_as(Expr::cust(format!("SUM({dur}) / 3600")), "total_walltime")
            .column_as(Expr::cust("SUM(num_nodes)"), "total_nodes")
            .column_as(
                Expr::cust(format!("SUM(num_nodes * ({dur})) / 3600")),
                "total_node_hours",
            )
            .column_as(Expr::cust("SUM(num_hwthreads)"), "total_cores")
            .column_as(
                Expr::cust(format!("SUM(num_hwthreads * ({dur})) / 3600")),
                "total_core_hours",
            )
            .column_as(Expr::cust("SUM(num_acc)"), "total_accs")
            .column_as(
                Expr::cust(format!("SUM(num_acc * ({dur})) / 3600")),
                "total_acc_hours",
            );

        select = match group_column {
            Some(col) => select
                .column_as(Expr::cust(col), "id")
                .group_by(Expr::cust(col)),
            None => select.column_as(Expr::cust("''"), "id"),
        };

        if let Some(sort) = sort {
            select = select.order_by(Expr::cust(sort.column()), Order::Desc);
        }

        let rows = select
            .into_json()
            .all(self.store.conn())
            .await
            .map_err(RepoError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(JobsStatistics {
                id: row
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: None,
                total_jobs: Self::row_i64(row, "total_jobs"),
                total_users: Self::row_i64(row, "total_users"),
                total_walltime: Self::row_i64(row, "total_walltime"),
                total_nodes: Self::row_i64(row, "total_nodes"),
                total_node_hours: Self::row_i64(row, "total_node_hours"),
                total_cores: Self::row_i64(row, "total_cores"),
                total_core_hours: Self::row_i64(row, "total_core_hours"),
                total_accs: Self::row_i64(row, "total_accs"),
                total_acc_hours: Self::row_i64(row, "total_acc_hours"),
                running_jobs: 0,
                short_jobs: 0,
            });
        }

        if group_column == Some(GroupBy::HpcUser.column()) {
            self.attach_display_names(&mut out).await?;
        }

        Ok(out)
    }

    async fn attach_display_names(&self, rows: &mut [JobsStatistics]) -> RepoResult<()> {
        for row in rows.iter_mut() {
            let user = crate::entity::hpc_user::Entity::find_by_id(row.id.clone())
                .one(self.store.conn())
                .await
                .map_err(RepoError::from)?;
            row.name = user.map(|u| u.name);
        }
        Ok(())
    }

    /// `stats::query_jobs_stats` (ungrouped shape, §4.4.1).
    pub async fn query_jobs_stats(
        &self,
        principal: &Principal,
        filters: &JobFilter,
    ) -> RepoResult<JobsStatistics> {
        let mut rows = self.run_aggregate(principal, filters, None, None).await?;
        Ok(rows.pop().unwrap_or_default())
    }

    /// `stats::query_jobs_stats_grouped` (§4.4.1). Sorted descending by `sort`.
    pub async fn query_jobs_stats_grouped(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        group_by: GroupBy,
        sort: StatsSortBy,
    ) -> RepoResult<Vec<JobsStatistics>> {
        self.run_aggregate(principal, filters, Some(group_by.column()), Some(sort))
            .await
    }

    /// **AddJobCount(stats)**: fills `running_jobs`/`short_jobs` on the single ungrouped
    /// row (§4.4).
    pub async fn add_job_count(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        stats: &mut JobsStatistics,
    ) -> RepoResult<()> {
        let (running, short) = self.count_running_and_short(principal, filters, None).await?;
        stats.running_jobs = running;
        stats.short_jobs = short;
        Ok(())
    }

    /// **AddJobCountGrouped(stats, group_by)**: same, matched back per group id (§4.4).
    pub async fn add_job_count_grouped(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        group_by: GroupBy,
        stats: &mut [JobsStatistics],
    ) -> RepoResult<()> {
        for row in stats.iter_mut() {
            let (running, short) = self
                .count_running_and_short(principal, filters, Some((group_by, row.id.clone())))
                .await?;
            row.running_jobs = running;
            row.short_jobs = short;
        }
        Ok(())
    }

    async fn count_running_and_short(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        group: Option<(GroupBy, String)>,
    ) -> RepoResult<(i64, i64)> {
        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, filters, Self::now())?;

        let mut select = crate::entity::job::Entity::find()
            .filter(visibility.clone())
            .filter(predicate.clone())
            .filter(crate::entity::job::Column::JobState.eq("running"));
        if let Some((group_by, id)) = &group {
            select = select.filter(Expr::cust(group_by.column()).eq(id.clone()));
        }
        let running = select.count(self.store.conn()).await.map_err(RepoError::from)? as i64;

        let mut short_select = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .filter(crate::entity::job::Column::Duration.lt(self.short_running_jobs_duration_secs));
        if let Some((group_by, id)) = &group {
            short_select = short_select.filter(Expr::cust(group_by.column()).eq(id.clone()));
        }
        let short = short_select.count(self.store.conn()).await.map_err(RepoError::from)? as i64;

        Ok((running, short))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn skip_in_stats(status: MonitoringStatus) -> bool {
        status.skipped_in_stats()
    }
}
