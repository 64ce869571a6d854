//! UI Config Store (§4.7): a process-wide defaults map plus a per-user overlay, merged
//! and cached for 24h per user.
//!
//! Grounded on `services/event_broadcaster.rs`'s encapsulated-lock-behind-a-struct idiom;
//! the process-wide `RwLock` over the defaults map is named directly in the spec.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::entity::configuration;
use crate::error::RepoResult;
use crate::store::Store;

/// Fixed key under which the short-running-jobs duration threshold (from process config)
/// is always injected into a merged config (§4.7).
pub const SHORT_RUNNING_JOBS_KEY: &str = "short_running_jobs_duration";

type ConfigMap = serde_json::Map<String, serde_json::Value>;

struct CacheEntry {
    value: ConfigMap,
    inserted_at: Instant,
}

pub struct UiConfigStore {
    store: Store,
    defaults: RwLock<ConfigMap>,
    per_user_cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    short_running_jobs_duration_secs: i64,
}

impl UiConfigStore {
    pub fn new(store: Store, defaults: ConfigMap, cache_ttl_hours: u64, short_running_jobs_duration_secs: i64) -> Self {
        Self {
            store,
            defaults: RwLock::new(defaults),
            per_user_cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_secs(cache_ttl_hours * 3600),
            short_running_jobs_duration_secs,
        }
    }

    fn inject_short_running_jobs(&self, map: &mut ConfigMap) {
        map.insert(
            SHORT_RUNNING_JOBS_KEY.to_string(),
            serde_json::json!(self.short_running_jobs_duration_secs),
        );
    }

    /// **GetUIConfig(nil)**: a copy of the defaults map, with the short-running-jobs
    /// threshold injected (§4.7).
    pub fn defaults_snapshot(&self) -> ConfigMap {
        let mut map = self.defaults.read().expect("ui config defaults poisoned").clone();
        self.inject_short_running_jobs(&mut map);
        map
    }

    /// **GetUIConfig(user)**: defaults merged with the user's overlay, cached for
    /// `cache_ttl` (§4.7).
    pub async fn get_ui_config(&self, username: &str) -> RepoResult<ConfigMap> {
        if let Some(cached) = self.cached_for(username) {
            return Ok(cached);
        }

        let overlay_rows = configuration::Entity::find()
            .filter(configuration::Column::Username.eq(username))
            .all(self.store.conn())
            .await?;

        let mut merged = self.defaults.read().expect("ui config defaults poisoned").clone();
        for row in overlay_rows {
            merged.insert(row.confkey, row.value);
        }
        self.inject_short_running_jobs(&mut merged);

        self.per_user_cache.lock().expect("ui config cache poisoned").insert(
            username.to_string(),
            CacheEntry {
                value: merged.clone(),
                inserted_at: Instant::now(),
            },
        );

        Ok(merged)
    }

    fn cached_for(&self, username: &str) -> Option<ConfigMap> {
        let cache = self.per_user_cache.lock().expect("ui config cache poisoned");
        let entry = cache.get(username)?;
        if entry.inserted_at.elapsed() < self.cache_ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// **UpdateConfig(key, value, user)** (§4.7): REPLACE-upserts the overlay row and
    /// invalidates that user's cache entry; with `user = None`, mutates the defaults map
    /// in place under the write lock.
    pub async fn update_config(
        &self,
        key: &str,
        value: serde_json::Value,
        username: Option<&str>,
    ) -> RepoResult<()> {
        match username {
            None => {
                self.defaults
                    .write()
                    .expect("ui config defaults poisoned")
                    .insert(key.to_string(), value);
            }
            Some(username) => {
                let active = configuration::ActiveModel {
                    username: sea_orm::Set(username.to_string()),
                    confkey: sea_orm::Set(key.to_string()),
                    value: sea_orm::Set(value),
                };
                configuration::Entity::insert(active)
                    .on_conflict(
                        OnConflict::columns([
                            configuration::Column::Username,
                            configuration::Column::Confkey,
                        ])
                        .update_column(configuration::Column::Value)
                        .to_owned(),
                    )
                    .exec(self.store.conn())
                    .await?;

                self.per_user_cache
                    .lock()
                    .expect("ui config cache poisoned")
                    .remove(username);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Migrator;
    use crate::store::Store;
    use sea_orm_migration::MigratorTrait;

    fn defaults() -> ConfigMap {
        let mut m = serde_json::Map::new();
        m.insert("theme".to_string(), serde_json::json!("dark"));
        m
    }

    async fn store() -> Store {
        let conn = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&conn, None).await.unwrap();
        Store::from_connection(conn, 1024)
    }

    #[test]
    fn defaults_snapshot_injects_short_running_key() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ui = UiConfigStore::new(rt.block_on(store()), defaults(), 24, 300);
        let snapshot = ui.defaults_snapshot();
        assert_eq!(snapshot.get("theme"), Some(&serde_json::json!("dark")));
        assert_eq!(
            snapshot.get(SHORT_RUNNING_JOBS_KEY),
            Some(&serde_json::json!(300))
        );
    }

    #[test]
    fn mutating_defaults_with_no_user_is_visible_in_next_snapshot() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ui = UiConfigStore::new(rt.block_on(store()), defaults(), 24, 300);
        ui.defaults
            .write()
            .unwrap()
            .insert("locale".to_string(), serde_json::json!("en"));
        let snapshot = ui.defaults_snapshot();
        assert_eq!(snapshot.get("locale"), Some(&serde_json::json!("en")));
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ui = UiConfigStore::new(rt.block_on(store()), defaults(), 24, 300);
        ui.per_user_cache.lock().unwrap().insert(
            "alice".to_string(),
            CacheEntry {
                value: serde_json::Map::new(),
                inserted_at: Instant::now() - Duration::from_secs(25 * 3600),
            },
        );
        assert!(ui.cached_for("alice").is_none());
    }

    #[tokio::test]
    async fn update_config_upserts_and_invalidates_cache() {
        let ui = UiConfigStore::new(store().await, defaults(), 24, 300);
        ui.get_ui_config("alice").await.unwrap();
        assert!(ui.cached_for("alice").is_some());

        ui.update_config("theme", serde_json::json!("light"), Some("alice"))
            .await
            .unwrap();
        assert!(ui.cached_for("alice").is_none());

        let merged = ui.get_ui_config("alice").await.unwrap();
        assert_eq!(merged.get("theme"), Some(&serde_json::json!("light")));
    }
}
