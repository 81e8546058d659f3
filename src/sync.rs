// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! State synchronization with the backend.
//!
//! Keeps the local [`EnvironmentState`] snapshot consistent with backend
//! truth while respecting caching, and applies the visibility rules for
//! anonymous visitors: their locally accumulated display history (which the
//! backend never sees) is merged back into every fresh snapshot and run
//! through the eligibility filter before caching.
//!
//! Failure semantics: any network or parsing failure aborts the sync and
//! leaves the previous config untouched; the error propagates to the
//! caller, who decides whether to retry, degrade, or halt.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error};

use crate::backend::BackendClient;
use crate::config::{ConfigStore, ConfigUpdate};
use crate::eligibility::filter_eligible_surveys;
use crate::errors::{NetworkError, WidgetError};
use crate::metrics;
use crate::state::EnvironmentState;

/// Connection identity for one sync. `environment_id` and `api_host` must
/// be non-empty; an absent `user_id` selects the public/anonymous endpoint
/// variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncParams {
    pub api_host: String,
    pub environment_id: String,
    pub user_id: Option<String>,
}

impl SyncParams {
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

/// Fetches remote state and republishes the local snapshot.
pub struct SyncEngine {
    backend: Arc<dyn BackendClient>,
    store: Arc<ConfigStore>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, store: Arc<ConfigStore>) -> Self {
        Self { backend, store }
    }

    /// Fetch the current state and atomically replace the cached config
    /// (`api_host`/`environment_id`/`user_id`/`state` together, so
    /// concurrent readers never observe a partial snapshot).
    ///
    /// Concurrent syncs are not locked against each other; the last update
    /// to complete wins.
    #[tracing::instrument(skip(self, params), fields(environment_id = %params.environment_id, identified = params.user_id.is_some()))]
    pub async fn sync(&self, params: &SyncParams, no_cache: bool) -> Result<(), WidgetError> {
        params.validate()?;
        let started = Instant::now();

        let payload = match self.sync_with_backend(params, no_cache).await {
            Ok(payload) => payload,
            Err(e) => {
                metrics::record_sync("error", started.elapsed());
                error!(error = %e, "error during sync");
                return Err(e.into());
            }
        };

        let mut state = EnvironmentState::from_sync(payload);
        let fetched = state.surveys.len();

        if params.user_id.is_none() {
            // Anonymous session: the backend cannot know the display
            // history, so carry the previously cached list forward and
            // filter before caching.
            let displays = self
                .store
                .get()
                .and_then(|config| config.state.displays)
                .unwrap_or_default();
            state.displays = Some(displays);
            state = filter_eligible_surveys(state, Utc::now())?;
            metrics::record_surveys_filtered(fetched - state.surveys.len());
        }
        debug!(fetched, eligible = state.surveys.len(), "fetched surveys during sync");

        self.store.update(ConfigUpdate {
            api_host: params.api_host.clone(),
            environment_id: params.environment_id.clone(),
            user_id: params.user_id.clone(),
            state,
        })?;
        metrics::record_sync("success", started.elapsed());
        Ok(())
    }

    /// The tagged-result boundary around the network: errors come back as
    /// values here and are only re-thrown by [`sync`](Self::sync) for
    /// caller convenience.
    async fn sync_with_backend(
        &self,
        params: &SyncParams,
        no_cache: bool,
    ) -> Result<crate::state::StateSync, NetworkError> {
        self.backend
            .fetch_state(params.user_id.as_deref(), no_cache)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{sync_payload, MockBackend};
    use crate::state::{Display, DisplayOption, Person, Product, Survey};
    use crate::storage::InMemoryStorage;
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashMap;

    fn fixture() -> (Arc<MockBackend>, Arc<ConfigStore>, SyncEngine) {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(ConfigStore::new(60, Arc::new(InMemoryStorage::new())));
        let engine = SyncEngine::new(backend.clone(), store.clone());
        (backend, store, engine)
    }

    fn params(user_id: Option<&str>) -> SyncParams {
        SyncParams {
            api_host: "https://app.example.com".to_string(),
            environment_id: "env-1".to_string(),
            user_id: user_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_anonymous_sync_seeds_empty_display_history() {
        let (backend, store, engine) = fixture();
        backend.set_sync_payload(sync_payload(vec![Survey::new(
            "s1",
            "NPS",
            DisplayOption::DisplayOnce,
        )]));

        engine.sync(&params(None), false).await.unwrap();

        let config = store.get().unwrap();
        assert_eq!(config.state.displays, Some(vec![]));
        assert_eq!(config.state.surveys.len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_sync_merges_cached_displays_and_filters() {
        let (backend, store, engine) = fixture();
        backend.set_sync_payload(sync_payload(vec![
            Survey::new("seen", "Seen", DisplayOption::DisplayOnce),
            Survey::new("fresh", "Fresh", DisplayOption::DisplayOnce),
        ]));

        // First sync, then record a local display for "seen".
        engine.sync(&params(None), false).await.unwrap();
        let config = store.get().unwrap();
        let mut state = config.state.clone();
        state.displays = Some(vec![Display {
            created_at: Utc::now(),
            survey_id: "seen".to_string(),
            responded: false,
        }]);
        store
            .update(ConfigUpdate {
                api_host: config.api_host,
                environment_id: config.environment_id,
                user_id: None,
                state,
            })
            .unwrap();

        // Second sync: the backend returns both surveys again, but the
        // local history filters "seen" out.
        engine.sync(&params(None), false).await.unwrap();
        let state = store.get().unwrap().state;
        let ids: Vec<_> = state.surveys.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
        // History itself survives the sync.
        assert_eq!(state.displays.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_identified_sync_caches_state_as_is() {
        let (backend, store, engine) = fixture();
        let mut payload = sync_payload(vec![Survey::new("s1", "NPS", DisplayOption::DisplayOnce)]);
        payload.person = Some(Person {
            attributes: HashMap::from([("plan".to_string(), json!("pro"))]),
        });
        backend.set_sync_payload(payload);

        engine.sync(&params(Some("user-1")), false).await.unwrap();

        let config = store.get().unwrap();
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
        assert!(config.state.displays.is_none());
        assert_eq!(config.state.attributes["plan"], json!("pro"));
    }

    #[tokio::test]
    async fn test_failed_sync_leaves_previous_config_untouched() {
        let (backend, store, engine) = fixture();
        backend.set_sync_payload(sync_payload(vec![Survey::new(
            "s1",
            "NPS",
            DisplayOption::RespondMultiple,
        )]));
        engine.sync(&params(None), false).await.unwrap();
        let before = store.get().unwrap();

        backend.fail_next_syncs(1);
        let err = engine.sync(&params(None), false).await.unwrap_err();
        assert!(matches!(err, WidgetError::Network(_)));
        assert_eq!(store.get().unwrap(), before);
    }

    #[tokio::test]
    async fn test_sync_rejects_empty_inputs() {
        let (_backend, _store, engine) = fixture();
        let mut bad = params(None);
        bad.environment_id = String::new();
        assert!(matches!(
            engine.sync(&bad, false).await.unwrap_err(),
            WidgetError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_display_option_aborts_sync() {
        let (backend, store, engine) = fixture();
        backend.set_sync_payload(sync_payload(vec![Survey::new(
            "s1",
            "NPS",
            DisplayOption::Unknown,
        )]));

        let err = engine.sync(&params(None), false).await.unwrap_err();
        assert!(matches!(err, WidgetError::InvalidDisplayOption(_)));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_product_recontact_window_respected_across_syncs() {
        let (backend, store, engine) = fixture();
        let mut payload = sync_payload(vec![Survey::new(
            "s1",
            "NPS",
            DisplayOption::RespondMultiple,
        )]);
        payload.product = Product {
            recontact_days: Some(7),
            ..Product::default()
        };
        backend.set_sync_payload(payload);

        engine.sync(&params(None), false).await.unwrap();
        let config = store.get().unwrap();

        // A display of another survey three days ago silences everything.
        let mut state = config.state.clone();
        state.displays = Some(vec![Display {
            created_at: Utc::now() - Duration::days(3),
            survey_id: "other".to_string(),
            responded: false,
        }]);
        store
            .update(ConfigUpdate {
                api_host: config.api_host.clone(),
                environment_id: config.environment_id.clone(),
                user_id: None,
                state,
            })
            .unwrap();
        engine.sync(&params(None), false).await.unwrap();
        assert!(store.get().unwrap().state.surveys.is_empty());

        // Eight days later it comes back.
        let config = store.get().unwrap();
        let mut state = config.state.clone();
        state.displays = Some(vec![Display {
            created_at: Utc::now() - Duration::days(8),
            survey_id: "other".to_string(),
            responded: false,
        }]);
        store
            .update(ConfigUpdate {
                api_host: config.api_host.clone(),
                environment_id: config.environment_id.clone(),
                user_id: None,
                state,
            })
            .unwrap();
        engine.sync(&params(None), false).await.unwrap();
        assert_eq!(store.get().unwrap().state.surveys.len(), 1);
    }
}
