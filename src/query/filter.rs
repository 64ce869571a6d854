//! `JobFilter` → `sea_orm::Condition` composition (§4.3), against `entity::job`.
//!
//! Most predicates compose through the fluent `ColumnTrait`/`QueryFilter` builder; the
//! handful that need JSON functions SeaORM's builder does not expose (`JSON_EXTRACT`,
//! `json_each`, `JSON_VALID`) drop to `sea_query::Expr::cust_with_values` for a literal
//! fragment, gated by `Store::require_json_capable_backend` (§4.1.1).

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition};

use crate::entity::job;
use crate::error::RepoResult;
use crate::models::filter::{
    FloatRange, IntRange, JobFilter, RelativeWindow, ScheduleKind, StringInput, TimeRange,
};
use crate::store::Store;

fn apply_string(col: job::Column, input: &StringInput) -> Condition {
    match input {
        StringInput::Eq(v) => Condition::all().add(col.eq(v.clone())),
        StringInput::Neq(v) => Condition::all().add(col.ne(v.clone())),
        StringInput::StartsWith(v) => Condition::all().add(col.starts_with(v)),
        StringInput::EndsWith(v) => Condition::all().add(col.ends_with(v)),
        StringInput::Contains(v) => Condition::all().add(col.contains(v)),
        StringInput::In(values) => Condition::all().add(col.is_in(values.clone())),
    }
}

fn apply_int_range(col: job::Column, range: &IntRange) -> Option<Condition> {
    match (range.from, range.to) {
        (Some(from), Some(to)) => Some(Condition::all().add(col.between(from, to))),
        (Some(from), None) => Some(Condition::all().add(col.gte(from))),
        (None, Some(to)) => Some(Condition::all().add(col.lte(to))),
        (None, None) => None,
    }
}

fn apply_float_range(col: job::Column, range: &FloatRange) -> Option<Condition> {
    match (range.from, range.to) {
        (Some(from), Some(to)) => Some(Condition::all().add(col.between(from, to))),
        (Some(from), None) => Some(Condition::all().add(col.gte(from))),
        (None, Some(to)) => Some(Condition::all().add(col.lte(to))),
        (None, None) => None,
    }
}

fn resolve_time_range(range: &TimeRange, now: i64) -> (Option<i64>, Option<i64>) {
    if let Some(window) = range.range {
        return (Some(now - window.seconds()), None);
    }
    (range.from, range.to)
}

/// Composes every predicate present on `filter` (other than `tags`, handled by the caller
/// via a junction join) into a single `Condition`.
pub fn apply_job_filter(store: &Store, filter: &JobFilter, now: i64) -> RepoResult<Condition> {
    let mut cond = Condition::all();

    if let Some(ids) = &filter.db_id {
        cond = cond.add(job::Column::Id.is_in(ids.clone()));
    }
    if let Some(s) = &filter.cluster {
        cond = cond.add(apply_string(job::Column::Cluster, s));
    }
    if let Some(s) = &filter.partition {
        cond = cond.add(apply_string(job::Column::ClusterPartition, s));
    }
    if let Some(s) = &filter.project {
        cond = cond.add(apply_string(job::Column::Project, s));
    }
    if let Some(s) = &filter.user {
        cond = cond.add(apply_string(job::Column::HpcUser, s));
    }
    if let Some(s) = &filter.job_id {
        // job_id is numeric in storage but the predicate shape (Eq/Contains/...) mirrors
        // the string family per §4.3's table; cast to text for the LIKE-style variants.
        cond = cond.add(apply_string(job::Column::JobId, s));
    }
    if let Some(states) = &filter.state {
        cond = cond.add(job::Column::JobState.is_in(states.iter().map(|s| s.as_str())));
    }
    if let Some(shared) = &filter.shared {
        cond = cond.add(job::Column::Shared.eq(shared.clone()));
    }
    if let Some(r) = &filter.num_nodes {
        if let Some(c) = apply_int_range(job::Column::NumNodes, r) {
            cond = cond.add(c);
        }
    }
    if let Some(r) = &filter.num_accelerators {
        if let Some(c) = apply_int_range(job::Column::NumAcc, r) {
            cond = cond.add(c);
        }
    }
    if let Some(r) = &filter.num_hwthreads {
        if let Some(c) = apply_int_range(job::Column::NumHwthreads, r) {
            cond = cond.add(c);
        }
    }
    if let Some(r) = &filter.duration {
        if let Some(c) = apply_int_range(job::Column::Duration, r) {
            cond = cond.add(c);
        }
    }
    if let Some(r) = &filter.energy {
        if let Some(c) = apply_float_range(job::Column::Energy, r) {
            cond = cond.add(c);
        }
    }
    if let Some(id) = filter.array_job_id {
        cond = cond.add(job::Column::ArrayJobId.eq(id));
    }
    if let Some(range) = &filter.start_time {
        let (from, to) = resolve_time_range(range, now);
        match (from, to) {
            (Some(f), Some(t)) => cond = cond.add(job::Column::StartTime.between(f, t)),
            (Some(f), None) => cond = cond.add(job::Column::StartTime.gte(f)),
            (None, Some(t)) => cond = cond.add(job::Column::StartTime.lte(t)),
            (None, None) => {}
        }
    }
    if let Some(min_running_for) = filter.min_running_for {
        cond = cond.add(job::Column::StartTime.lt(now - min_running_for));
    }

    if filter.metric_stats.is_some()
        || filter.node.is_some()
        || filter.job_name.is_some()
        || filter.schedule.is_some()
    {
        store.require_json_capable_backend()?;
    }

    if let Some(metric_stats) = &filter.metric_stats {
        for m in metric_stats {
            let path = format!("$.{}", m.metric);
            cond = cond.add(
                Expr::cust_with_values(
                    "JSON_VALID(footprint) AND JSON_EXTRACT(footprint, ?) BETWEEN ? AND ?",
                    [
                        path.into(),
                        m.range.from.unwrap_or(f64::MIN).into(),
                        m.range.to.unwrap_or(f64::MAX).into(),
                    ],
                ),
            );
        }
    }

    if let Some(node) = &filter.node {
        match node {
            StringInput::Eq(v) => {
                cond = cond.add(Expr::cust_with_values(
                    "EXISTS (SELECT 1 FROM json_each(resources) WHERE JSON_EXTRACT(value, '$.hostname') = ?)",
                    [v.clone().into()],
                ));
            }
            StringInput::Contains(v) => {
                let pattern = format!("%{v}%");
                cond = cond.add(Expr::cust_with_values(
                    "EXISTS (SELECT 1 FROM json_each(resources) WHERE JSON_EXTRACT(value, '$.hostname') LIKE ?)",
                    [pattern.into()],
                ));
            }
            _ => {
                return Err(crate::error::RepoError::Validation(
                    "Node filter only supports Eq/Contains".into(),
                ))
            }
        };
    }

    if let Some(name) = &filter.job_name {
        match name {
            StringInput::Eq(v) => {
                cond = cond.add(Expr::cust_with_values(
                    "JSON_EXTRACT(meta_data, '$.jobName') = ?",
                    [v.clone().into()],
                ));
            }
            StringInput::Contains(v) => {
                let pattern = format!("%{v}%");
                cond = cond.add(Expr::cust_with_values(
                    "JSON_EXTRACT(meta_data, '$.jobName') LIKE ?",
                    [pattern.into()],
                ));
            }
            _ => {
                return Err(crate::error::RepoError::Validation(
                    "JobName filter only supports Eq/Contains".into(),
                ))
            }
        }
    }

    if let Some(schedule) = filter.schedule {
        let expr = Expr::cust("JSON_EXTRACT(meta_data, '$.jobName')");
        cond = cond.add(match schedule {
            ScheduleKind::Interactive => Condition::all().add(expr.eq("interactive")),
            ScheduleKind::Batch => Condition::all().add(expr.ne("interactive")),
        });
    }

    Ok(cond)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_window_against_now() {
        let range = TimeRange {
            from: None,
            to: None,
            range: Some(RelativeWindow::Last24h),
        };
        let (from, to) = resolve_time_range(&range, 1_000_000);
        assert_eq!(from, Some(1_000_000 - 24 * 3600));
        assert_eq!(to, None);
    }
}
