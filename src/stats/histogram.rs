//! Histogram construction (§4.4): simple bucketed, duration (pre-initialized bins), and
//! per-metric histograms over completed and live-running jobs.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, QueryFilter, QuerySelect};
use std::sync::Arc;

use crate::error::{RepoError, RepoResult};
use crate::external::{ArchiveBackend, MetricDispatcher};
use crate::models::filter::JobFilter;
use crate::models::job::MonitoringStatus;
use crate::models::stats::{DurationBinPreset, HistoPoint};
use crate::models::user::Principal;
use crate::query::{filter as job_filter, visibility};
use crate::store::Store;

/// Limit on how many live running jobs a metric histogram fetches live averages for
/// (§4.4: "limited to ≤ 5000 jobs").
const LIVE_HISTOGRAM_JOB_LIMIT: u64 = 5000;

/// Metric/stat names are interpolated directly into a `JSON_EXTRACT` path fragment (sea_orm's
/// `group_by`/`column_as` have no bind-parameter form for a computed SELECT expression), so a
/// caller-supplied name is rejected outright if it could break out of the quoted path literal.
fn reject_unsafe_json_path_segment(segment: &str) -> RepoResult<()> {
    const FORBIDDEN: [char; 3] = ['\'', '\\', '"'];
    if let Some(c) = segment.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(RepoError::Validation(format!(
            "metric/stat name containing '{c}' is not allowed: {segment:?}"
        )));
    }
    Ok(())
}

pub struct HistogramEngine {
    store: Store,
    archive: Arc<dyn ArchiveBackend>,
    dispatcher: Arc<dyn MetricDispatcher>,
}

impl HistogramEngine {
    pub fn new(store: Store, archive: Arc<dyn ArchiveBackend>, dispatcher: Arc<dyn MetricDispatcher>) -> Self {
        Self {
            store,
            archive,
            dispatcher,
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn monitoring_status_filter() -> sea_orm::Condition {
        // Skipped in bucket computation (§4.4).
        sea_orm::Condition::all()
            .add(crate::entity::job::Column::MonitoringStatus.ne(MonitoringStatus::ArchivingFailed.as_i32()))
            .add(crate::entity::job::Column::MonitoringStatus.ne(MonitoringStatus::Disabled.as_i32()))
    }

    /// **Simple bucketed histogram** (num_nodes/num_hwthreads/num_accelerators): GROUP BY
    /// the raw column, natural bins (§4.4).
    pub async fn simple_bucketed(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        column: &str,
    ) -> RepoResult<Vec<HistoPoint>> {
        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, filters, Self::now())?;

        let rows = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .filter(Self::monitoring_status_filter())
            .select_only()
            .column_as(Expr::cust(column), "value")
            .column_as(Expr::cust("COUNT(*)"), "count")
            .group_by(Expr::cust(column))
            .into_json()
            .all(self.store.conn())
            .await
            .map_err(RepoError::from)?;

        Ok(rows
            .iter()
            .map(|r| HistoPoint {
                value: r.get("value").and_then(|v| v.as_i64()).unwrap_or(0),
                count: r.get("count").and_then(|v| v.as_i64()).unwrap_or(0),
            })
            .collect())
    }

    /// **Duration histogram** (§4.4): bins are pre-initialized with zero counts, then
    /// matched back to the query result by exact value equality, so the result is always
    /// complete and gap-free (§8 property 7).
    pub async fn duration_histogram(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        preset: Option<DurationBinPreset>,
    ) -> RepoResult<Vec<HistoPoint>> {
        let (bin_size, bin_count) = preset
            .map(|p| p.shape())
            .unwrap_or_else(DurationBinPreset::default_shape);

        let mut bins: Vec<HistoPoint> = (1..=bin_count)
            .map(|i| HistoPoint {
                value: i * bin_size,
                count: 0,
            })
            .collect();

        let now = Self::now();
        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, filters, now)?;
        let dur = format!("CASE WHEN job_state = 'running' THEN ({now} - start_time) ELSE duration END");
        let bucket_expr = format!("(({dur}) / {bin_size} + 1) * {bin_size}");

        let rows = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .filter(Self::monitoring_status_filter())
            .select_only()
            .column_as(Expr::cust(&bucket_expr), "value")
            .column_as(Expr::cust("COUNT(*)"), "count")
            .group_by(Expr::cust(&bucket_expr))
            .into_json()
            .all(self.store.conn())
            .await
            .map_err(RepoError::from)?;

        for row in &rows {
            let value = row.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
            let count = row.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            if let Some(bin) = bins.iter_mut().find(|b| b.value == value) {
                bin.count += count;
            }
        }

        Ok(bins)
    }

    /// **Metric histogram over completed jobs** (§4.4): looks up the metric's peak for the
    /// filtered cluster(s), falling back to the global max peak, computes a bin number per
    /// job via `JSON_EXTRACT(footprint, "$.<metric>_<stat>")`, pre-initializes bins by
    /// `peak / N_bins`, then fills from the query.
    pub async fn metric_histogram_completed(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        metric: &str,
        stat: &str,
        cluster: &str,
        subcluster: &str,
        num_bins: i64,
    ) -> RepoResult<Vec<HistoPoint>> {
        self.store.require_json_capable_backend()?;
        reject_unsafe_json_path_segment(metric)?;
        reject_unsafe_json_path_segment(stat)?;

        let sub_cluster = self.archive.get_sub_cluster(cluster, subcluster).await?;
        let peak = match sub_cluster.metric_config.iter().find(|m| m.name == metric) {
            Some(cfg) if cfg.peak > 0.0 => cfg.peak,
            _ => self
                .archive
                .global_peak(metric)
                .await?
                .ok_or_else(|| RepoError::Validation(format!("no known peak for metric '{metric}'")))?,
        };

        let bin_step = peak / num_bins as f64;
        let mut bins: Vec<HistoPoint> = (1..=num_bins)
            .map(|i| HistoPoint {
                value: (i as f64 * bin_step).round() as i64,
                count: 0,
            })
            .collect();

        let now = Self::now();
        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, filters, now)?;

        let path = format!("$.{metric}_{stat}");
        // bin = cast((value == peak ? peak*0.999999999 : value) / peak * N_bins as int) + 1
        let bin_expr = format!(
            "CAST((CASE WHEN JSON_EXTRACT(footprint, '{path}') >= {peak} THEN {peak} * 0.999999999 ELSE JSON_EXTRACT(footprint, '{path}') END) / {peak} * {num_bins} AS INTEGER) + 1"
        );

        let rows = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .filter(Self::monitoring_status_filter())
            .filter(crate::entity::job::Column::JobState.eq(crate::models::job::JobState::Completed.as_str()))
            .filter(Expr::cust("JSON_VALID(footprint)"))
            .select_only()
            .column_as(Expr::cust(&bin_expr), "bin")
            .column_as(Expr::cust("COUNT(*)"), "count")
            .group_by(Expr::cust(&bin_expr))
            .into_json()
            .all(self.store.conn())
            .await
            .map_err(RepoError::from)?;

        for row in &rows {
            let bin_index = row.get("bin").and_then(|v| v.as_i64()).unwrap_or(0);
            let count = row.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            if bin_index >= 1 && (bin_index as usize) <= bins.len() {
                bins[(bin_index - 1) as usize].count += count;
            }
        }

        Ok(bins)
    }

    /// **Metric histogram over live running jobs** (§4.4): limited to ≤ 5000 jobs, fetches
    /// per-job averages from the `MetricDispatcher`, buckets in memory.
    pub async fn metric_histogram_running(
        &self,
        principal: &Principal,
        filters: &JobFilter,
        metric: &str,
        peak: f64,
        num_bins: i64,
    ) -> RepoResult<Vec<HistoPoint>> {
        let bin_step = peak / num_bins as f64;
        let mut bins: Vec<HistoPoint> = (1..=num_bins)
            .map(|i| HistoPoint {
                value: (i as f64 * bin_step).round() as i64,
                count: 0,
            })
            .collect();

        let mut running_filter = filters.clone();
        running_filter.state = Some(vec![crate::models::job::JobState::Running]);

        let visibility = visibility::job_visibility(principal)?;
        let predicate = job_filter::apply_job_filter(&self.store, &running_filter, Self::now())?;
        let rows = crate::entity::job::Entity::find()
            .filter(visibility)
            .filter(predicate)
            .filter(Self::monitoring_status_filter())
            .limit(LIVE_HISTOGRAM_JOB_LIMIT)
            .all(self.store.conn())
            .await
            .map_err(RepoError::from)?;

        for row in rows {
            let job = crate::models::job::Job::try_from(row)?;
            let averages = self
                .dispatcher
                .load_averages(&job, &[metric.to_string()])
                .await?;
            let Some(value) = averages.get(metric).copied() else {
                continue;
            };
            let capped = if value >= peak { peak * 0.999_999_999 } else { value };
            let bin_index = ((capped / peak * num_bins as f64) as i64) + 1;
            if bin_index >= 1 && (bin_index as usize) <= bins.len() {
                bins[(bin_index - 1) as usize].count += 1;
            }
        }

        Ok(bins)
    }
}
