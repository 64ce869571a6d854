//! Store & Schema Guard (§4.1): connection pool, value cache, schema version check.

pub mod schema_guard;
pub mod value_cache;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseBackend, DatabaseConnection};
use tracing::info;

use crate::config::Config;
use crate::error::{RepoError, RepoResult};

pub use schema_guard::{GuardOutcome, SchemaGuard};
pub use value_cache::{CachedValue, ValueCache, ValueCacheKind};

/// Singleton holding the database handle, value cache, and driver identity. Cheap to
/// clone: everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct Store {
    conn: DatabaseConnection,
    pub value_cache: Arc<ValueCache>,
}

impl Store {
    /// Connects using the pool limits from `Config` (defaults 4/4/1h/1h, §4.1), runs the
    /// schema guard, and returns a ready `Store`.
    pub async fn connect(config: &Config) -> RepoResult<Self> {
        let mut opts = ConnectOptions::new(config.database_url.clone());
        opts.max_connections(config.max_open_connections)
            .min_connections(config.max_idle_connections)
            .connect_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(config.conn_max_idle_time_secs))
            .max_lifetime(Duration::from_secs(config.conn_max_lifetime_secs));

        let conn = Database::connect(opts).await?;
        info!(
            backend = ?conn.get_database_backend(),
            max_open = config.max_open_connections,
            max_idle = config.max_idle_connections,
            "store connected"
        );

        SchemaGuard::check(&conn).await?;

        Ok(Self {
            conn,
            value_cache: Arc::new(ValueCache::new(config.value_cache_bytes)),
        })
    }

    /// Wraps an already-open connection (used by tests to share an in-memory SQLite
    /// connection across a `Store` and raw assertions).
    pub fn from_connection(conn: DatabaseConnection, value_cache_bytes: usize) -> Self {
        Self {
            conn,
            value_cache: Arc::new(ValueCache::new(value_cache_bytes)),
        }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.conn.get_database_backend()
    }

    /// JSON-function predicates (`JSON_EXTRACT`/`JSON_VALID`/`json_each`) are only
    /// implemented for the SQLite/MySQL dialect (§4.1.1). Callers in `query`/`stats` call
    /// this before emitting a raw JSON fragment.
    pub fn require_json_capable_backend(&self) -> RepoResult<()> {
        match self.backend() {
            DatabaseBackend::Sqlite | DatabaseBackend::MySql => Ok(()),
            DatabaseBackend::Postgres => Err(RepoError::Validation(
                "JSON-dependent predicates are not supported against a Postgres backend in this crate".into(),
            )),
        }
    }
}
