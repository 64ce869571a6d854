//! Operator CLI exercising a subset of the core (§6): schema migration recovery actions,
//! a one-shot `SyncJobs`, and an archive-queue drain.
//!
//! Usage:
//!   jobrepo-cli migrate-db
//!   jobrepo-cli revert-db
//!   jobrepo-cli force-db <version>
//!   jobrepo-cli sync-jobs
//!   jobrepo-cli archive-drain
//!
//! Grounded on `src/bin/manage_api_keys.rs` (manual `match args[1]` dispatch,
//! `eprintln!` + `std::process::exit` on error).

use std::env;
use std::sync::Arc;

use sea_orm::{ColumnTrait, Database, EntityTrait, QueryFilter};
use sea_orm_migration::MigratorTrait;

use jobrepo_core::config::Config;
use jobrepo_core::entity::job;
use jobrepo_core::error::RepoError;
use jobrepo_core::external::{ArchiveBackend, JobMeta, SubClusterConfig};
use jobrepo_core::lifecycle::{spawn_archive_queue, Engine};
use jobrepo_core::models::job::{Job, MonitoringStatus};
use jobrepo_core::store::{SchemaGuard, Store};

/// Exit codes (§6): 0 success, 2 dirty migration, 3 version mismatch, 1 otherwise.
const EXIT_SUCCESS: i32 = 0;
const EXIT_OTHER: i32 = 1;
const EXIT_DIRTY: i32 = 2;
const EXIT_VERSION_MISMATCH: i32 = 3;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::try_init().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(EXIT_OTHER);
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(EXIT_OTHER);
        }
    };

    let code = match args[1].as_str() {
        "migrate-db" => migrate_db(&config).await,
        "revert-db" => revert_db(&config).await,
        "force-db" => {
            let Some(version) = args.get(2).and_then(|v| v.parse::<i64>().ok()) else {
                eprintln!("Error: force-db requires a numeric <version> argument");
                std::process::exit(EXIT_OTHER);
            };
            force_db(&config, version).await
        }
        "sync-jobs" => sync_jobs(&config).await,
        "archive-drain" => archive_drain(&config).await,
        "help" | "--help" | "-h" => {
            print_usage();
            EXIT_SUCCESS
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            EXIT_OTHER
        }
    };
    std::process::exit(code);
}

/// Connects without running the schema guard's version check — migration recovery
/// actions must be reachable even when the guard would otherwise refuse to serve.
async fn connect_raw(config: &Config) -> Result<sea_orm::DatabaseConnection, RepoError> {
    Database::connect(config.database_url.clone())
        .await
        .map_err(RepoError::Database)
}

async fn migrate_db(config: &Config) -> i32 {
    let conn = match connect_raw(config).await {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };
    match SchemaGuard::migrate_up(&conn).await {
        Ok(version) => {
            println!("migrated to schema version {version}");
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

async fn revert_db(config: &Config) -> i32 {
    let conn = match connect_raw(config).await {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };
    match SchemaGuard::migrate_down_one(&conn).await {
        Ok(version) => {
            println!("reverted to schema version {version}");
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

async fn force_db(config: &Config, version: i64) -> i32 {
    let conn = match connect_raw(config).await {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };
    match SchemaGuard::force_version(&conn, version).await {
        Ok(()) => {
            println!("schema version forced to {version}");
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

async fn sync_jobs(config: &Config) -> i32 {
    let store = match Store::connect(config).await {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    let engine = Engine::new(store);
    match engine.sync_jobs().await {
        Ok(synced) => {
            println!("synced {} job(s) from cache to durable table", synced.len());
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

/// A production host has no `ArchiveBackend` implementation bundled in this crate (the
/// metric archive is an explicit non-goal, §1) — `archive-drain` run standalone can only
/// exercise the queue's drain semantics against jobs already marked
/// `archiving_failed`-or-worse, which need no archive call to resolve. Anything still
/// `running_or_archiving` and non-running is enqueued against a backend that immediately
/// reports failure, so the job is at least marked `archiving_failed` rather than left
/// stuck; a real deployment supplies its own `ArchiveBackend` and drives the queue itself.
struct UnavailableArchive;

#[async_trait::async_trait]
impl ArchiveBackend for UnavailableArchive {
    async fn get_sub_cluster(
        &self,
        _cluster: &str,
        _subcluster: &str,
    ) -> Result<SubClusterConfig, RepoError> {
        Err(unavailable())
    }

    async fn fetch_metadata(&self, _job: &Job) -> Result<(), RepoError> {
        Err(unavailable())
    }

    async fn archive_job(&self, _job: &Job) -> Result<JobMeta, RepoError> {
        Err(unavailable())
    }

    async fn update_tags(&self, _job_id: i64, _tags: &[String]) -> Result<(), RepoError> {
        Err(unavailable())
    }

    async fn update_metadata(
        &self,
        _job_id: i64,
        _meta: &std::collections::HashMap<String, String>,
    ) -> Result<(), RepoError> {
        Err(unavailable())
    }

    async fn global_peak(&self, _metric: &str) -> Result<Option<f64>, RepoError> {
        Err(unavailable())
    }
}

fn unavailable() -> RepoError {
    RepoError::Validation(
        "no ArchiveBackend is configured for the standalone CLI; embed this crate in a host \
         process that supplies one to actually archive jobs"
            .into(),
    )
}

async fn archive_drain(config: &Config) -> i32 {
    let store = match Store::connect(config).await {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    let pending = match job::Entity::find()
        .filter(job::Column::MonitoringStatus.eq(MonitoringStatus::RunningOrArchiving.as_i32()))
        .all(store.conn())
        .await
    {
        Ok(rows) => rows,
        Err(e) => return report_error(&RepoError::Database(e)),
    };

    let (queue, worker) = spawn_archive_queue(
        store,
        Arc::new(UnavailableArchive) as Arc<dyn ArchiveBackend>,
        config.archive_channel_capacity,
    );
    let worker_handle = tokio::spawn(worker);

    let mut enqueued = 0usize;
    for row in pending {
        let job = match Job::try_from(row) {
            Ok(job) => job,
            Err(e) => {
                eprintln!("skipping row with integrity error: {e}");
                continue;
            }
        };
        if job.state.is_running() {
            continue;
        }
        if queue.trigger_archiving(job).await.is_ok() {
            enqueued += 1;
        }
    }

    queue.wait_for_archiving().await;
    drop(queue);
    let _ = worker_handle.await;

    println!("drained archive queue ({enqueued} job(s) enqueued)");
    EXIT_SUCCESS
}

fn report_error(e: &RepoError) -> i32 {
    eprintln!("Error: {e}");
    match e {
        RepoError::Validation(msg) if msg.contains("dirty") => EXIT_DIRTY,
        RepoError::Validation(msg) if msg.contains("behind target") || msg.contains("ahead of target") => {
            EXIT_VERSION_MISMATCH
        }
        _ => EXIT_OTHER,
    }
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: jobrepo-cli <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  migrate-db            Apply every pending migration");
    eprintln!("  revert-db             Revert exactly one migration step");
    eprintln!("  force-db <version>    Force the schema version, clearing dirty");
    eprintln!("  sync-jobs             Trigger SyncJobs once (promote cache to durable)");
    eprintln!("  archive-drain         Drain the archive queue, then exit");
    eprintln!("  help                  Show this help");
    eprintln!();
}
