//! Lifecycle Engine (§4.2): cache-table inserts, atomic promotion to the durable table,
//! stop transitions, walltime/duration sweeps, retention deletes, and the archive worker
//! that drives completed jobs through metric fetch and footprint/energy derivation.
//!
//! Grounded on `db/test_jobs.rs` (insert/update idiom against a `sea_orm::ActiveModel`) and
//! `services/cleanup.rs` (sweep-with-cutoff, count-then-act, logged counters).

pub mod archiver;
pub mod hooks;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    Statement, TransactionTrait,
};
use std::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::entity::{job, job_cache, job_tag};
use crate::error::{RepoError, RepoResult};
use crate::models::job::{Job, JobState, MonitoringStatus};
use crate::store::Store;

pub use archiver::{spawn_archive_queue, ArchiveQueue};
pub use hooks::{HookRegistry, JobHook};

/// Translates a unique-constraint violation into `RepoError::Conflict`; any other
/// database error passes through as `RepoError::Database` (§7).
fn classify_insert_error(err: DbErr) -> RepoError {
    let text = err.to_string();
    if text.to_lowercase().contains("unique") {
        RepoError::Conflict(format!("duplicate (job_id, cluster, start_time): {text}"))
    } else {
        RepoError::Database(err)
    }
}

fn job_cache_active_model(job: &Job) -> RepoResult<job_cache::ActiveModel> {
    Ok(job_cache::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        job_id: Set(job.job_id),
        hpc_user: Set(job.hpc_user.clone()),
        project: Set(job.project.clone()),
        cluster: Set(job.cluster.clone()),
        subcluster: Set(job.subcluster.clone()),
        cluster_partition: Set(job.cluster_partition.clone()),
        array_job_id: Set(job.array_job_id),
        num_nodes: Set(job.num_nodes),
        num_hwthreads: Set(job.num_hwthreads),
        num_acc: Set(job.num_acc),
        shared: Set(job.shared.clone()),
        monitoring_status: Set(job.monitoring_status.as_i32()),
        smt: Set(job.smt),
        job_state: Set(job.state.as_str().to_string()),
        start_time: Set(job.start_time),
        duration: Set(job.duration),
        walltime: Set(job.walltime),
        resources: Set(serde_json::to_value(&job.resources)?),
        footprint: Set(serde_json::Value::Object(job.footprint.clone())),
        energy: Set(job.energy),
        energy_footprint: Set(serde_json::Value::Object(job.energy_footprint.clone())),
        meta_data: Set(serde_json::Value::Object(job.meta_data.clone())),
    })
}

fn promote_to_job_active_model(cached: &job_cache::Model) -> job::ActiveModel {
    job::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        job_id: Set(cached.job_id),
        hpc_user: Set(cached.hpc_user.clone()),
        project: Set(cached.project.clone()),
        cluster: Set(cached.cluster.clone()),
        subcluster: Set(cached.subcluster.clone()),
        cluster_partition: Set(cached.cluster_partition.clone()),
        array_job_id: Set(cached.array_job_id),
        num_nodes: Set(cached.num_nodes),
        num_hwthreads: Set(cached.num_hwthreads),
        num_acc: Set(cached.num_acc),
        shared: Set(cached.shared.clone()),
        monitoring_status: Set(cached.monitoring_status),
        smt: Set(cached.smt),
        job_state: Set(cached.job_state.clone()),
        start_time: Set(cached.start_time),
        duration: Set(cached.duration),
        walltime: Set(cached.walltime),
        resources: Set(cached.resources.clone()),
        footprint: Set(cached.footprint.clone()),
        energy: Set(cached.energy),
        energy_footprint: Set(cached.energy_footprint.clone()),
        meta_data: Set(cached.meta_data.clone()),
    }
}

/// The Lifecycle Engine (§4.2). `sync_mutex` coordinates `insert_cached` against
/// `sync_jobs` so a batch promotion never observes a torn cache snapshot (§5).
pub struct Engine {
    store: Store,
    sync_mutex: AsyncMutex<()>,
    hooks: RwLock<HookRegistry>,
}

impl Engine {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            sync_mutex: AsyncMutex::new(()),
            hooks: RwLock::new(HookRegistry::new()),
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub fn register_hook(&self, hook: Box<dyn JobHook>) {
        self.hooks.write().expect("hook registry poisoned").register(hook);
    }

    /// **InsertCached(job)** (§4.2): serializes sub-documents to JSON and inserts into the
    /// cache table. Held under `sync_mutex` so a concurrent `sync_jobs` cannot observe a
    /// torn batch.
    pub async fn insert_cached(&self, job: &Job) -> RepoResult<i64> {
        let _guard = self.sync_mutex.lock().await;
        let active = job_cache_active_model(job)?;
        let inserted = active
            .insert(self.store.conn())
            .await
            .map_err(classify_insert_error)?;
        Ok(inserted.id)
    }

    /// **Start(job)**: convenience wrapper over `insert_cached` (§4.2) — the JSON encoding
    /// happens inside `insert_cached` itself since `Job`'s sub-documents are already typed
    /// values here, not raw strings to be serialized by the caller.
    pub async fn start(&self, job: &Job) -> RepoResult<i64> {
        self.insert_cached(job).await
    }

    /// **Stop(id, duration, state, monitoring_status)** (§4.2): updates exactly those three
    /// fields in the durable table.
    pub async fn stop(
        &self,
        id: i64,
        duration: i64,
        state: JobState,
        monitoring_status: MonitoringStatus,
    ) -> RepoResult<()> {
        let active = job::ActiveModel {
            id: Set(id),
            duration: Set(duration),
            job_state: Set(state.as_str().to_string()),
            monitoring_status: Set(monitoring_status.as_i32()),
            ..Default::default()
        };
        job::Entity::update(active).exec(self.store.conn()).await?;
        Ok(())
    }

    /// **StopCached(id, duration, state, monitoring_status)** (§4.2): same, against the
    /// hot-tier table.
    pub async fn stop_cached(
        &self,
        id: i64,
        duration: i64,
        state: JobState,
        monitoring_status: MonitoringStatus,
    ) -> RepoResult<()> {
        let active = job_cache::ActiveModel {
            id: Set(id),
            duration: Set(duration),
            job_state: Set(state.as_str().to_string()),
            monitoring_status: Set(monitoring_status.as_i32()),
            ..Default::default()
        };
        job_cache::Entity::update(active).exec(self.store.conn()).await?;
        Ok(())
    }

    /// **SyncJobs()** (§4.2): moves every cache row into the durable table as a unit and
    /// returns the synced jobs, firing `JobStart` hooks once per job afterwards (§5: "Start
    /// hooks fire after the row is durable"). Implemented as a single database transaction
    /// so "copy succeeds, delete fails" cannot leave a half-promoted cache — a stronger
    /// guarantee than the spec's literal two-step description, recorded in DESIGN.md.
    pub async fn sync_jobs(&self) -> RepoResult<Vec<Job>> {
        let _guard = self.sync_mutex.lock().await;

        let txn = self.store.conn().begin().await?;
        let cached_rows = job_cache::Entity::find().all(&txn).await?;
        if cached_rows.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let mut synced = Vec::with_capacity(cached_rows.len());
        for cached in &cached_rows {
            let active = promote_to_job_active_model(cached);
            let inserted = active.insert(&txn).await?;
            synced.push(Job::try_from(inserted)?);
        }

        let cache_ids: Vec<i64> = cached_rows.iter().map(|c| c.id).collect();
        job_cache::Entity::delete_many()
            .filter(job_cache::Column::Id.is_in(cache_ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(count = synced.len(), "synced jobs from cache to durable table");

        let hooks = self.hooks.read().expect("hook registry poisoned");
        for job in &synced {
            hooks.fire_start(job);
        }

        Ok(synced)
    }

    /// **StopJobsExceedingWalltimeBy(grace_seconds)** (§4.2): marks running jobs overdue by
    /// more than `grace_seconds` past their walltime as failed/archiving_failed/duration=0.
    /// Returns the number of jobs affected.
    pub async fn stop_jobs_exceeding_walltime_by(&self, grace_seconds: i64) -> RepoResult<u64> {
        let now = Self::now();
        let cond = sea_orm::Condition::all()
            .add(job::Column::JobState.eq(JobState::Running.as_str()))
            .add(job::Column::Walltime.gt(0))
            .add(sea_orm::sea_query::Expr::cust(format!(
                "({now} - start_time) > (walltime + {grace_seconds})"
            )));
        let overdue = job::Entity::find().filter(cond).all(self.store.conn()).await?;

        let count = overdue.len() as u64;
        for row in overdue {
            let active = job::ActiveModel {
                id: Set(row.id),
                job_state: Set(JobState::Failed.as_str().to_string()),
                monitoring_status: Set(MonitoringStatus::ArchivingFailed.as_i32()),
                duration: Set(0),
                ..Default::default()
            };
            job::Entity::update(active).exec(self.store.conn()).await?;
        }

        if count > 0 {
            warn!(count, grace_seconds, "stopped jobs exceeding walltime");
        }
        Ok(count)
    }

    /// **UpdateDuration()** (§4.2): bulk `SET duration = now - start_time WHERE
    /// state='running'`.
    pub async fn update_duration(&self) -> RepoResult<u64> {
        let now = Self::now();
        let backend = self.store.backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            format!(
                "UPDATE job SET duration = {now} - start_time WHERE job_state = {}",
                quote_literal(JobState::Running.as_str())
            ),
            [],
        );
        let result = self.store.conn().execute(stmt).await?;
        Ok(result.rows_affected())
    }

    /// **DeleteJobsBefore(cutoff, omit_tagged)** (§4.2): counts, then deletes, jobs with
    /// `start_time < cutoff`; when `omit_tagged` is set, jobs present in the junction table
    /// are excluded. Invalidates cached metadata/energy-footprint entries for every deleted
    /// id via the enumerate-then-delete pattern (§9).
    pub async fn delete_jobs_before(&self, cutoff: i64, omit_tagged: bool) -> RepoResult<u64> {
        let mut select = job::Entity::find().filter(job::Column::StartTime.lt(cutoff));
        if omit_tagged {
            let tagged_ids: Vec<i64> = job_tag::Entity::find()
                .all(self.store.conn())
                .await?
                .into_iter()
                .map(|t| t.job_id)
                .collect();
            if !tagged_ids.is_empty() {
                select = select.filter(job::Column::Id.is_not_in(tagged_ids));
            }
        }

        let victims = select.all(self.store.conn()).await?;
        let count = victims.len() as u64;
        let ids: Vec<i64> = victims.iter().map(|v| v.id).collect();

        if !ids.is_empty() {
            job::Entity::delete_many()
                .filter(job::Column::Id.is_in(ids.clone()))
                .exec(self.store.conn())
                .await?;
            self.store.value_cache.invalidate_many(&ids);
        }

        info!(count, cutoff, omit_tagged, "deleted jobs before cutoff");
        Ok(count)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Minimal single-quote literal escape for the one hand-written SQL fragment in this
/// module (`update_duration`'s WHERE clause) — the driver-specific `execute_unprepared`
/// path used by the schema guard has no bind-parameter form for a bare `UPDATE ... WHERE`
/// with a computed assignment, so the state name (a closed enum, never user input) is
/// inlined directly.
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
