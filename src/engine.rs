// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Widget engine coordinator.
//!
//! The [`WidgetEngine`] ties the pieces together: the dependency-injected
//! [`ConfigStore`], the [`SyncEngine`], the background expiry refresher,
//! and per-survey [`SurveySession`]s with their response queues.
//!
//! # Lifecycle
//!
//! ```text
//! new → setup (restore persisted config, initial sync) → start_refresh_loop
//!     → begin_survey / sync / ...
//!     → logout (stop loop, clear persisted state)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use widget_engine::{HttpBackend, InMemoryStorage, WidgetEngine, WidgetEngineConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), widget_engine::WidgetError> {
//! let config = WidgetEngineConfig::new("https://app.example.com", "env-1");
//! let backend = Arc::new(HttpBackend::new(
//!     config.api_host.clone(),
//!     config.environment_id.clone(),
//!     config.client_version.clone(),
//! ));
//! let engine = WidgetEngine::new(config, backend, Arc::new(InMemoryStorage::new()))?;
//!
//! engine.setup().await?;
//! engine.start_refresh_loop();
//!
//! for survey in engine.eligible_surveys() {
//!     println!("eligible: {}", survey.name);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::config::{ConfigStore, WidgetConfig, WidgetEngineConfig};
use crate::errors::WidgetError;
use crate::queue::{DeliveryEvents, ResponseQueue, SurveyState};
use crate::retry::RetryConfig;
use crate::session::SurveySession;
use crate::state::{EnvironmentState, Survey};
use crate::storage::ConfigStorage;
use crate::sync::{SyncEngine, SyncParams};

pub struct WidgetEngine {
    settings: WidgetEngineConfig,
    store: Arc<ConfigStore>,
    backend: Arc<dyn BackendClient>,
    sync_engine: Arc<SyncEngine>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    survey_running: Arc<AtomicBool>,
}

impl WidgetEngine {
    /// Build an engine from settings, a backend client, and config storage.
    /// Everything is injected; the engine holds no global state.
    pub fn new(
        settings: WidgetEngineConfig,
        backend: Arc<dyn BackendClient>,
        storage: Arc<dyn ConfigStorage>,
    ) -> Result<Self, WidgetError> {
        settings.validate()?;
        let store = Arc::new(ConfigStore::new(settings.state_ttl_secs, storage));
        let sync_engine = Arc::new(SyncEngine::new(backend.clone(), store.clone()));
        Ok(Self {
            settings,
            store,
            backend,
            sync_engine,
            refresh_task: Mutex::new(None),
            survey_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Boot the widget: restore a persisted config for this environment (an
    /// anonymous visitor's display history survives page loads this way),
    /// then sync unless the restored snapshot is still fresh for the same
    /// user.
    pub async fn setup(&self) -> Result<(), WidgetError> {
        let restored = self
            .store
            .bootstrap(&self.settings.api_host, &self.settings.environment_id)?;
        if restored {
            debug!("restored persisted widget config");
        }

        let fresh_for_same_user = matches!(
            self.store.get(),
            Some(config) if config.user_id == self.settings.user_id && config.expires_at >= Utc::now()
        );
        if fresh_for_same_user {
            debug!("persisted config still fresh, skipping initial sync");
        } else {
            self.sync(false).await?;
        }
        info!("widget engine ready");
        Ok(())
    }

    /// Trigger a sync now. `no_cache` bypasses HTTP-level caching.
    pub async fn sync(&self, no_cache: bool) -> Result<(), WidgetError> {
        self.sync_engine.sync(&self.sync_params(), no_cache).await
    }

    /// Start the periodic expiry check: every tick, if the cached config
    /// has expired, a background sync refreshes it. Idempotent; a loop that
    /// is already running is left alone. A sync already in flight does not
    /// block a newly triggered one; last write wins on the config.
    pub fn start_refresh_loop(&self) {
        let mut guard = self.refresh_task.lock();
        if guard.is_some() {
            debug!("refresh loop already running");
            return;
        }

        let store = self.store.clone();
        let sync_engine = self.sync_engine.clone();
        let interval = std::time::Duration::from_secs(self.settings.refresh_interval_secs);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !store.is_expired() {
                    continue;
                }
                let Some(config) = store.get() else { continue };
                debug!("config has expired, starting sync");
                let params = SyncParams {
                    api_host: config.api_host,
                    environment_id: config.environment_id,
                    user_id: config.user_id,
                };
                if let Err(error) = sync_engine.sync(&params, false).await {
                    warn!(%error, "background refresh failed, extending config to retry later");
                    if let Err(error) = store.touch() {
                        warn!(%error, "could not extend config expiry");
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    /// Stop the periodic expiry check. The only cancellable operation;
    /// individual network calls always run to completion or failure.
    pub fn stop_refresh_loop(&self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
            debug!("refresh loop stopped");
        }
    }

    /// Current config snapshot, if synced.
    #[must_use]
    pub fn config(&self) -> Option<WidgetConfig> {
        self.store.get()
    }

    /// Current state snapshot, if synced.
    #[must_use]
    pub fn state(&self) -> Option<EnvironmentState> {
        self.store.get().map(|config| config.state)
    }

    /// The surveys currently showable to this visitor. Empty is a normal
    /// answer, not an error.
    #[must_use]
    pub fn eligible_surveys(&self) -> Vec<Survey> {
        self.state().map(|state| state.surveys).unwrap_or_default()
    }

    /// Start a survey session. Only one survey runs at a time; a second
    /// call before the first session closes returns
    /// [`WidgetError::SurveyAlreadyRunning`].
    ///
    /// `events` receives the terminal delivery signals for this session.
    pub fn begin_survey(
        &self,
        survey: &Survey,
        events: Arc<dyn DeliveryEvents>,
    ) -> Result<SurveySession, WidgetError> {
        if self.survey_running.swap(true, Ordering::SeqCst) {
            debug!("a survey is already running, skipping");
            return Err(WidgetError::SurveyAlreadyRunning);
        }

        let user_id = self
            .store
            .get()
            .and_then(|config| config.user_id)
            .or_else(|| self.settings.user_id.clone());
        let survey_state = SurveyState::new(survey.id.clone(), user_id);
        let retry = RetryConfig::delivery().with_max_retries(self.settings.retry_attempts);
        let queue = ResponseQueue::new(
            self.backend.clone(),
            survey_state.clone(),
            retry,
            events,
        );

        if survey.delay > 0 {
            debug!(delay = survey.delay, survey_id = %survey.id, "survey display delayed");
        }

        Ok(SurveySession::new(
            survey.clone(),
            self.store.clone(),
            self.backend.clone(),
            self.sync_engine.clone(),
            queue,
            survey_state,
            self.survey_running.clone(),
        ))
    }

    /// Tear down the session on explicit logout/reset: stop the refresh
    /// loop and drop the cached and persisted config.
    pub fn logout(&self) -> Result<(), WidgetError> {
        self.stop_refresh_loop();
        self.store.reset()?;
        info!("widget session reset");
        Ok(())
    }

    fn sync_params(&self) -> SyncParams {
        SyncParams {
            api_host: self.settings.api_host.clone(),
            environment_id: self.settings.environment_id.clone(),
            user_id: self.settings.user_id.clone(),
        }
    }
}

impl Drop for WidgetEngine {
    fn drop(&mut self) {
        // Detached interval task must not outlive the engine.
        self.stop_refresh_loop();
    }
}
