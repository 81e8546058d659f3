// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One running survey session.
//!
//! A [`SurveySession`] is created by [`WidgetEngine::begin_survey`]
//! (crate::engine::WidgetEngine::begin_survey) when the host decides to show
//! a survey. It owns the survey's [`SurveyState`] and response queue and
//! translates host events into engine state changes:
//!
//! - `register_display` when the survey becomes visible,
//! - `submit_response` for every answered or finished question,
//! - `close` when the host dismisses the survey.
//!
//! For anonymous visitors the session is also where the local display
//! history gets written: an appended record on display, the `responded`
//! flip on first answer, and a refilter of the cached surveys after each.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{BackendClient, FileUpload, UploadParams};
use crate::config::{ConfigStore, ConfigUpdate, WidgetConfig};
use crate::eligibility::filter_eligible_surveys;
use crate::errors::WidgetError;
use crate::metrics;
use crate::queue::{ResponseQueue, ResponseUpdate, SurveyState};
use crate::state::{Display, EnvironmentState, Survey, SurveyAppearance};
use crate::sync::{SyncEngine, SyncParams};

pub struct SurveySession {
    survey: Survey,
    store: Arc<ConfigStore>,
    backend: Arc<dyn BackendClient>,
    sync_engine: Arc<SyncEngine>,
    queue: ResponseQueue,
    survey_state: Mutex<SurveyState>,
    running: Arc<AtomicBool>,
    display_responded_sent: AtomicBool,
}

impl SurveySession {
    pub(crate) fn new(
        survey: Survey,
        store: Arc<ConfigStore>,
        backend: Arc<dyn BackendClient>,
        sync_engine: Arc<SyncEngine>,
        queue: ResponseQueue,
        survey_state: SurveyState,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            survey,
            store,
            backend,
            sync_engine,
            queue,
            survey_state: Mutex::new(survey_state),
            running,
            display_responded_sent: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn survey(&self) -> &Survey {
        &self.survey
    }

    /// Product branding with this survey's overwrites applied, for the host
    /// renderer.
    #[must_use]
    pub fn appearance(&self) -> SurveyAppearance {
        let product = self
            .store
            .get()
            .map(|config| config.state.product)
            .unwrap_or_default();
        let overwrites = self.survey.product_overwrites.clone().unwrap_or_default();
        SurveyAppearance {
            brand_color: overwrites.brand_color.or(product.brand_color),
            highlight_border_color: overwrites
                .highlight_border_color
                .or(product.highlight_border_color),
            placement: overwrites.placement.or(product.placement),
            click_outside_close: overwrites
                .click_outside_close
                .unwrap_or(product.click_outside_close),
            dark_overlay: overwrites.dark_overlay.unwrap_or(product.dark_overlay),
            branding_enabled: product.in_app_survey_branding,
        }
    }

    /// Record that the survey became visible.
    ///
    /// Anonymous sessions first append a local display record and refilter
    /// the cached surveys; then the backend display is created for both
    /// session kinds. The returned display id gates response attribution,
    /// so a failed create propagates instead of being swallowed; queued
    /// responses would otherwise be lost silently.
    pub async fn register_display(&self) -> Result<(), WidgetError> {
        let config = self.store.get().ok_or(WidgetError::MissingConfig)?;

        if config.user_id.is_none() {
            let mut state = config.state.clone();
            let mut displays = state.displays.take().unwrap_or_default();
            displays.push(Display {
                created_at: Utc::now(),
                survey_id: self.survey.id.clone(),
                responded: false,
            });
            state.displays = Some(displays);
            self.replace_state(&config, state)?;
        }

        let display_id = self
            .backend
            .create_display(&self.survey.id, config.user_id.as_deref())
            .await?;
        metrics::record_display_created();
        debug!(display_id = %display_id, survey_id = %self.survey.id, "display created");

        let snapshot = {
            let mut survey_state = self.survey_state.lock();
            survey_state.update_display_id(display_id);
            survey_state.clone()
        };
        self.queue.update_survey_state(snapshot);
        Ok(())
    }

    /// Feed one answered (or finishing) question into the delivery queue.
    ///
    /// Anonymous sessions flip the current impression's `responded` flag on
    /// the first answer and refilter; identified sessions stamp the user id
    /// and notify the legacy responded endpoint once.
    pub async fn submit_response(&self, update: ResponseUpdate) -> Result<(), WidgetError> {
        let config = self.store.get().ok_or(WidgetError::MissingConfig)?;

        match &config.user_id {
            None => {
                let mut state = config.state.clone();
                let flipped = {
                    let displays = state.displays.as_mut().ok_or(WidgetError::MissingDisplay)?;
                    let last = displays.last_mut().ok_or(WidgetError::MissingDisplay)?;
                    if last.responded {
                        false
                    } else {
                        last.responded = true;
                        true
                    }
                };
                if flipped {
                    self.replace_state(&config, state)?;
                }
            }
            Some(user_id) => {
                self.survey_state.lock().update_user_id(user_id.clone());
                if !self.display_responded_sent.swap(true, Ordering::SeqCst) {
                    let display_id = self.survey_state.lock().display_id().cloned();
                    if let Some(display_id) = display_id {
                        if let Err(error) = self.backend.mark_display_responded(&display_id).await {
                            warn!(%error, "could not mark display responded");
                        }
                    }
                }
            }
        }

        let snapshot = self.survey_state.lock().clone();
        self.queue.update_survey_state(snapshot);
        self.queue.add(update);
        Ok(())
    }

    /// Host retry affordance after a terminal delivery failure.
    pub fn retry_delivery(&self) {
        self.queue.process_queue();
    }

    /// Upload a file attached from within a survey question.
    pub async fn upload_file(&self, upload: &FileUpload) -> Result<String, WidgetError> {
        let params = UploadParams {
            survey_id: Some(self.survey.id.clone()),
        };
        Ok(self.backend.upload_file(upload, &params).await?)
    }

    /// Dismiss the survey.
    ///
    /// Anonymous sessions refilter the cached state (the new display
    /// history must take effect immediately); identified sessions force a
    /// no-cache sync so the next eligible set reflects backend truth.
    pub async fn close(&self) -> Result<(), WidgetError> {
        let config = self.store.get().ok_or(WidgetError::MissingConfig)?;

        let result = match &config.user_id {
            None => self.replace_state(&config, config.state.clone()),
            Some(_) => {
                let params = SyncParams {
                    api_host: config.api_host.clone(),
                    environment_id: config.environment_id.clone(),
                    user_id: config.user_id.clone(),
                };
                self.sync_engine.sync(&params, true).await
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Whether the delivery queue is waiting for an explicit retry.
    #[must_use]
    pub fn is_delivery_halted(&self) -> bool {
        self.queue.is_halted()
    }

    /// Refilter `state` against the current display history and atomically
    /// replace the cached config with it.
    fn replace_state(
        &self,
        config: &WidgetConfig,
        state: EnvironmentState,
    ) -> Result<(), WidgetError> {
        let state = filter_eligible_surveys(state, Utc::now())?;
        self.store.update(ConfigUpdate {
            api_host: config.api_host.clone(),
            environment_id: config.environment_id.clone(),
            user_id: config.user_id.clone(),
            state,
        })?;
        Ok(())
    }
}

impl Drop for SurveySession {
    fn drop(&mut self) {
        // Release the one-survey-at-a-time guard even when the host never
        // called close().
        self.running.store(false, Ordering::SeqCst);
    }
}
