//! Versioned schema guard (§4.1): refuses to serve on a stale, ahead-of-target, or dirty
//! schema, and exposes the explicit `migrate up` / `migrate down one` / `force version`
//! recovery operations.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::{info, warn};

use crate::error::{RepoError, RepoResult};
use crate::migration::Migrator;

/// Outcome of `SchemaGuard::check` at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Persisted version matches the target and the table is clean.
    Ready,
    /// No `schema_migrations` row yet; the database has never been migrated.
    Uninitialized,
}

pub struct SchemaGuard;

impl SchemaGuard {
    /// The schema version this build expects, derived from the migration count (teacher
    /// idiom: the migration list itself is the source of truth, not a hand-maintained
    /// constant).
    pub fn target_version() -> i64 {
        Migrator::migrations().len() as i64
    }

    async fn ensure_table(db: &DatabaseConnection) -> Result<(), DbErr> {
        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version BIGINT PRIMARY KEY, dirty BOOLEAN NOT NULL DEFAULT FALSE)",
        )
        .await?;
        Ok(())
    }

    async fn read_row(db: &DatabaseConnection) -> Result<Option<(i64, bool)>, DbErr> {
        let stmt = Statement::from_string(
            db.get_database_backend(),
            "SELECT version, dirty FROM schema_migrations LIMIT 1".to_owned(),
        );
        let row = db.query_one(stmt).await?;
        match row {
            Some(row) => {
                let version: i64 = row.try_get("", "version")?;
                let dirty: bool = row.try_get("", "dirty").unwrap_or(false);
                Ok(Some((version, dirty)))
            }
            None => Ok(None),
        }
    }

    async fn write_row(db: &DatabaseConnection, version: i64, dirty: bool) -> Result<(), DbErr> {
        db.execute_unprepared("DELETE FROM schema_migrations")
            .await?;
        let stmt = Statement::from_sql_and_values(
            db.get_database_backend(),
            "INSERT INTO schema_migrations (version, dirty) VALUES (?, ?)",
            [version.into(), dirty.into()],
        );
        db.execute(stmt).await?;
        Ok(())
    }

    /// Runs at `Store::connect` time (§4.1.1). Does not mutate the schema itself; callers
    /// needing to actually migrate call `migrate_up` explicitly.
    pub async fn check(db: &DatabaseConnection) -> RepoResult<GuardOutcome> {
        Self::ensure_table(db).await?;
        let target = Self::target_version();
        match Self::read_row(db).await? {
            None => {
                info!("schema_migrations table is empty; database has never been migrated");
                Ok(GuardOutcome::Uninitialized)
            }
            Some((version, dirty)) => {
                if dirty {
                    return Err(RepoError::Validation(format!(
                        "schema_migrations marked dirty at version {version}; run force-db to recover"
                    )));
                }
                if version < target {
                    return Err(RepoError::Validation(format!(
                        "schema version {version} behind target {target}; run migrate-db"
                    )));
                }
                if version > target {
                    return Err(RepoError::Validation(format!(
                        "schema version {version} ahead of target {target}; downgrade this build or run revert-db"
                    )));
                }
                Ok(GuardOutcome::Ready)
            }
        }
    }

    /// Applies every pending `sea_orm_migration` step, then writes the clean target
    /// version. Marks the row dirty for the duration of the run so a crash mid-migration
    /// is visible to the next `check`.
    pub async fn migrate_up(db: &DatabaseConnection) -> RepoResult<i64> {
        Self::ensure_table(db).await?;
        let target = Self::target_version();
        Self::write_row(db, target, true).await?;
        Migrator::up(db, None).await?;
        Self::write_row(db, target, false).await?;
        info!(target, "schema migrated up");
        Ok(target)
    }

    /// Reverts exactly one migration step (§6: `migrate down one`).
    pub async fn migrate_down_one(db: &DatabaseConnection) -> RepoResult<i64> {
        Self::ensure_table(db).await?;
        let (current, _) = Self::read_row(db)
            .await?
            .ok_or_else(|| RepoError::Validation("no schema version recorded".into()))?;
        Self::write_row(db, current, true).await?;
        Migrator::down(db, Some(1)).await?;
        let new_version = current - 1;
        Self::write_row(db, new_version, false).await?;
        warn!(from = current, to = new_version, "schema reverted one step");
        Ok(new_version)
    }

    /// Forces the version row to `version` and clears dirty, without running any
    /// migration (operator recovery action, §6).
    pub async fn force_version(db: &DatabaseConnection, version: i64) -> RepoResult<()> {
        Self::ensure_table(db).await?;
        Self::write_row(db, version, false).await?;
        warn!(version, "schema version forced");
        Ok(())
    }
}
