//! Configuration for the widget engine.
//!
//! Two layers live here:
//! - [`WidgetEngineConfig`]: construction-time settings with defaults.
//! - [`WidgetConfig`] + [`ConfigStore`]: the synchronized session snapshot,
//!   replaced atomically as a whole and written through to client-side
//!   storage on every successful update.
//!
//! # Example
//!
//! ```
//! use widget_engine::WidgetEngineConfig;
//!
//! let config = WidgetEngineConfig::new("https://app.example.com", "env-1");
//! assert_eq!(config.retry_attempts, 2);
//! assert_eq!(config.refresh_interval_secs, 30);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::WidgetError;
use crate::state::EnvironmentState;
use crate::storage::{ConfigStorage, StorageError};

/// Construction-time settings for the widget engine.
///
/// All fields except `api_host` and `environment_id` have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetEngineConfig {
    /// Base URL of the backend (e.g. "https://app.example.com").
    pub api_host: String,

    /// Environment this widget syncs against.
    pub environment_id: String,

    /// Identified user, absent for anonymous visitors.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Delivery attempts per response send before the queue halts.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// How long a synced state snapshot stays fresh.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Tick interval of the background expiry check.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Client version reported to the sync endpoint.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

fn default_retry_attempts() -> usize { 2 }
fn default_state_ttl_secs() -> u64 { 30 * 60 } // 30 minutes
fn default_refresh_interval_secs() -> u64 { 30 }
fn default_client_version() -> String { env!("CARGO_PKG_VERSION").to_string() }

impl WidgetEngineConfig {
    #[must_use]
    pub fn new(api_host: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            api_host: api_host.into(),
            environment_id: environment_id.into(),
            user_id: None,
            retry_attempts: default_retry_attempts(),
            state_ttl_secs: default_state_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            client_version: default_client_version(),
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), WidgetError> {
        if self.api_host.trim().is_empty() {
            return Err(WidgetError::InvalidInput("api_host must not be empty"));
        }
        if self.environment_id.trim().is_empty() {
            return Err(WidgetError::InvalidInput("environment_id must not be empty"));
        }
        Ok(())
    }
}

/// The persisted session snapshot: connection identity, the last
/// synchronized state, and its freshness deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub api_host: String,
    pub environment_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub state: EnvironmentState,
    /// After this instant the state must be refreshed before reuse.
    pub expires_at: DateTime<Utc>,
}

/// The four fields an update replaces together. `expires_at` is stamped by
/// the store so freshness bookkeeping cannot be forgotten by a caller.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub api_host: String,
    pub environment_id: String,
    pub user_id: Option<String>,
    pub state: EnvironmentState,
}

/// Dependency-injected container for the current [`WidgetConfig`].
///
/// Single instance per widget session, explicitly constructed and passed to
/// the sync engine and response queue, no hidden global. All mutation is
/// copy-on-write: read the current snapshot, compute the next one, then
/// [`update`](Self::update) replaces the whole structure atomically so
/// concurrent readers never observe a partially written config. Concurrent
/// updates are last-write-wins.
pub struct ConfigStore {
    ttl: Duration,
    storage: Arc<dyn ConfigStorage>,
    current: RwLock<Option<WidgetConfig>>,
}

impl ConfigStore {
    #[must_use]
    pub fn new(ttl_secs: u64, storage: Arc<dyn ConfigStorage>) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            storage,
            current: RwLock::new(None),
        }
    }

    /// Seed the in-memory config from persisted storage.
    ///
    /// Only a snapshot for the same host and environment is restored; this
    /// is what preserves an anonymous visitor's display history across page
    /// loads. A snapshot for a different environment, or a corrupt one, is
    /// discarded. Returns whether a snapshot was restored.
    pub fn bootstrap(&self, api_host: &str, environment_id: &str) -> Result<bool, StorageError> {
        let persisted = match self.storage.load() {
            Ok(p) => p,
            Err(StorageError::Corrupt(e)) => {
                warn!(error = %e, "discarding corrupt persisted config");
                self.storage.clear()?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match persisted {
            Some(config) if config.api_host == api_host && config.environment_id == environment_id => {
                *self.current.write() = Some(config);
                Ok(true)
            }
            Some(_) => {
                warn!("persisted config belongs to a different environment, discarding");
                self.storage.clear()?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Current snapshot, cloned. `None` before the first sync.
    #[must_use]
    pub fn get(&self) -> Option<WidgetConfig> {
        self.current.read().clone()
    }

    /// Atomically replace the whole config and write it through to storage.
    ///
    /// Persistence happens before the in-memory swap: if the write fails the
    /// previous snapshot stays untouched and observable.
    pub fn update(&self, update: ConfigUpdate) -> Result<WidgetConfig, StorageError> {
        let next = WidgetConfig {
            api_host: update.api_host,
            environment_id: update.environment_id,
            user_id: update.user_id,
            state: update.state,
            expires_at: Utc::now() + self.ttl,
        };
        self.storage.save(&next)?;
        *self.current.write() = Some(next.clone());
        Ok(next)
    }

    /// Extend the current config's freshness window without changing its
    /// contents. Used when a background refresh fails and should be retried
    /// a full TTL later instead of on every tick.
    pub fn touch(&self) -> Result<(), StorageError> {
        let Some(config) = self.get() else { return Ok(()) };
        self.update(ConfigUpdate {
            api_host: config.api_host,
            environment_id: config.environment_id,
            user_id: config.user_id,
            state: config.state,
        })?;
        Ok(())
    }

    /// Whether the cached state must be refreshed before reuse. An empty
    /// store counts as expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match &*self.current.read() {
            Some(config) => config.expires_at < Utc::now(),
            None => true,
        }
    }

    /// Tear down the session: forget the in-memory config and drop the
    /// persisted snapshot.
    pub fn reset(&self) -> Result<(), StorageError> {
        *self.current.write() = None;
        self.storage.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Product;
    use crate::storage::InMemoryStorage;
    use std::collections::HashMap;

    fn empty_state() -> EnvironmentState {
        EnvironmentState {
            surveys: vec![],
            no_code_action_classes: vec![],
            product: Product::default(),
            attributes: HashMap::new(),
            displays: Some(vec![]),
        }
    }

    fn update_for(env: &str) -> ConfigUpdate {
        ConfigUpdate {
            api_host: "https://app.example.com".to_string(),
            environment_id: env.to_string(),
            user_id: None,
            state: empty_state(),
        }
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = WidgetEngineConfig::new("https://app.example.com", "env-1");
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.state_ttl_secs, 30 * 60);
        assert_eq!(config.refresh_interval_secs, 30);
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_engine_config_validation() {
        assert!(WidgetEngineConfig::new("", "env-1").validate().is_err());
        assert!(WidgetEngineConfig::new("https://a", "").validate().is_err());
        assert!(WidgetEngineConfig::new("https://a", "env-1").validate().is_ok());
    }

    #[test]
    fn test_update_stamps_expiry() {
        let store = ConfigStore::new(60, Arc::new(InMemoryStorage::new()));
        let before = Utc::now();
        let config = store.update(update_for("env-1")).unwrap();

        assert!(config.expires_at >= before + Duration::seconds(59));
        assert!(!store.is_expired());
    }

    #[test]
    fn test_empty_store_is_expired() {
        let store = ConfigStore::new(60, Arc::new(InMemoryStorage::new()));
        assert!(store.is_expired());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let store = ConfigStore::new(0, Arc::new(InMemoryStorage::new()));
        store.update(update_for("env-1")).unwrap();
        assert!(store.is_expired());
    }

    #[test]
    fn test_update_writes_through_to_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = ConfigStore::new(60, storage.clone());
        store.update(update_for("env-1")).unwrap();

        let persisted = storage.load().unwrap().unwrap();
        assert_eq!(persisted.environment_id, "env-1");
    }

    #[test]
    fn test_bootstrap_restores_matching_snapshot() {
        let storage = Arc::new(InMemoryStorage::new());
        {
            let store = ConfigStore::new(60, storage.clone());
            store.update(update_for("env-1")).unwrap();
        }

        let store = ConfigStore::new(60, storage);
        let restored = store.bootstrap("https://app.example.com", "env-1").unwrap();
        assert!(restored);
        assert_eq!(store.get().unwrap().environment_id, "env-1");
    }

    #[test]
    fn test_bootstrap_discards_other_environment() {
        let storage = Arc::new(InMemoryStorage::new());
        {
            let store = ConfigStore::new(60, storage.clone());
            store.update(update_for("env-1")).unwrap();
        }

        let store = ConfigStore::new(60, storage.clone());
        let restored = store.bootstrap("https://app.example.com", "env-2").unwrap();
        assert!(!restored);
        assert!(store.get().is_none());
        // The stale snapshot is gone from storage too.
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_touch_extends_expiry() {
        let store = ConfigStore::new(0, Arc::new(InMemoryStorage::new()));
        store.update(update_for("env-1")).unwrap();
        let first = store.get().unwrap().expires_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.touch().unwrap();
        assert!(store.get().unwrap().expires_at > first);
    }

    #[test]
    fn test_touch_on_empty_store_is_noop() {
        let store = ConfigStore::new(60, Arc::new(InMemoryStorage::new()));
        store.touch().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_reset_clears_memory_and_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = ConfigStore::new(60, storage.clone());
        store.update(update_for("env-1")).unwrap();

        store.reset().unwrap();
        assert!(store.get().is_none());
        assert!(storage.load().unwrap().is_none());
    }
}
