// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Response delivery queue.
//!
//! Accepts response updates as a respondent progresses through a survey and
//! delivers them to the backend without blocking the caller. One logical
//! in-flight item per survey session: each update carries the cumulative
//! answer state, so [`ResponseQueue::add`] coalesces into the pending
//! payload instead of stacking independent requests.
//!
//! Delivery is eager (no scheduled tick) to keep the data-loss window
//! small. The first durable delivery creates the backend response record;
//! every later one amends it, so a session produces at most one record.
//! When the bounded retry budget is exhausted the queue emits
//! `response_sending_failed` once and halts until the host signals an
//! explicit retry via [`ResponseQueue::process_queue`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BackendClient, ResponseInput};
use crate::errors::WidgetError;
use crate::metrics;
use crate::retry::{retry, RetryConfig};

/// Identity of one survey session as seen by the backend.
///
/// `display_id` must be established before a response can be attributed;
/// `response_id` appears after the first successful create and stays for
/// the rest of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyState {
    survey_id: String,
    response_id: Option<String>,
    display_id: Option<String>,
    user_id: Option<String>,
}

impl SurveyState {
    #[must_use]
    pub fn new(survey_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            survey_id: survey_id.into(),
            response_id: None,
            display_id: None,
            user_id,
        }
    }

    pub fn update_display_id(&mut self, display_id: impl Into<String>) {
        self.display_id = Some(display_id.into());
    }

    pub fn update_response_id(&mut self, response_id: impl Into<String>) {
        self.response_id = Some(response_id.into());
    }

    pub fn update_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    #[must_use]
    pub fn survey_id(&self) -> &str {
        &self.survey_id
    }

    #[must_use]
    pub fn response_id(&self) -> Option<&String> {
        self.response_id.as_ref()
    }

    #[must_use]
    pub fn display_id(&self) -> Option<&String> {
        self.display_id.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&String> {
        self.user_id.as_ref()
    }
}

/// Cumulative answer state for one survey session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseUpdate {
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub ttc: HashMap<String, f64>,
    #[serde(default)]
    pub finished: bool,
}

impl ResponseUpdate {
    /// Fold a newer update into this one. Later answers win per question;
    /// `finished` latches once set.
    pub fn merge(&mut self, newer: &ResponseUpdate) {
        self.data.extend(newer.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.ttc.extend(newer.ttc.iter().map(|(k, v)| (k.clone(), *v)));
        self.finished = self.finished || newer.finished;
    }
}

/// Terminal delivery signals emitted to the host.
///
/// Registered once at queue construction (observer style) instead of being
/// swapped in and out through mutable callbacks. The host is expected to
/// show an error state with a retry affordance on failure, and to treat the
/// session as closed on finish.
pub trait DeliveryEvents: Send + Sync {
    /// The retry budget for the pending payload is exhausted; the queue is
    /// halted until [`ResponseQueue::process_queue`] is called.
    fn response_sending_failed(&self);

    /// A `finished` update was durably acknowledged; the session is closed.
    fn response_sending_finished(&self);
}

struct QueueState {
    survey_state: SurveyState,
    pending: Option<ResponseUpdate>,
    /// Bumped on every `add`; lets the drive task detect payloads that
    /// changed while a request was outstanding.
    seq: u64,
    in_flight: bool,
    halted: bool,
    closed: bool,
}

struct QueueInner {
    backend: Arc<dyn BackendClient>,
    retry: RetryConfig,
    events: Arc<dyn DeliveryEvents>,
    state: Mutex<QueueState>,
}

/// Buffers and delivers the responses of one survey session.
#[derive(Clone)]
pub struct ResponseQueue {
    inner: Arc<QueueInner>,
}

impl ResponseQueue {
    #[must_use]
    pub fn new(
        backend: Arc<dyn BackendClient>,
        survey_state: SurveyState,
        retry: RetryConfig,
        events: Arc<dyn DeliveryEvents>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                backend,
                retry,
                events,
                state: Mutex::new(QueueState {
                    survey_state,
                    pending: None,
                    seq: 0,
                    in_flight: false,
                    halted: false,
                    closed: false,
                }),
            }),
        }
    }

    /// Replace the session identity (new display id, resolved user id).
    ///
    /// A `response_id` already learned from a successful create is kept when
    /// the incoming state does not carry one, so a session pushing display
    /// updates cannot turn the next delivery back into a create.
    pub fn update_survey_state(&self, survey_state: SurveyState) {
        let mut state = self.inner.state.lock();
        let known_response_id = state.survey_state.response_id.clone();
        state.survey_state = survey_state;
        if state.survey_state.response_id.is_none() {
            state.survey_state.response_id = known_response_id;
        }
    }

    /// Merge a response update into the pending payload and attempt
    /// delivery immediately.
    ///
    /// Returns without blocking; delivery happens on a spawned task. An
    /// update arriving while a request is outstanding is merged and
    /// guaranteed to be (re)sent once the current attempt completes.
    pub fn add(&self, update: ResponseUpdate) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                warn!(
                    survey_id = %state.survey_state.survey_id,
                    "survey session already finished, dropping response update"
                );
                return;
            }
            match &mut state.pending {
                Some(pending) => pending.merge(&update),
                None => state.pending = Some(update),
            }
            state.seq += 1;
            // A fresh update is an explicit signal; it lifts a halt.
            state.halted = false;
            if state.in_flight {
                return;
            }
            state.in_flight = true;
        }
        self.spawn_drive();
    }

    /// Host-triggered retry after a terminal failure.
    pub fn process_queue(&self) {
        {
            let mut state = self.inner.state.lock();
            state.halted = false;
            if state.pending.is_none() || state.in_flight {
                return;
            }
            state.in_flight = true;
        }
        self.spawn_drive();
    }

    /// Whether a payload is waiting (unsent or halted).
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Whether the queue gave up and is waiting for an explicit retry.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.state.lock().halted
    }

    #[must_use]
    pub fn survey_state(&self) -> SurveyState {
        self.inner.state.lock().survey_state.clone()
    }

    fn spawn_drive(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            drive(inner).await;
        });
    }
}

/// Delivery loop for one queue. At most one instance runs at a time,
/// guarded by the `in_flight` flag.
async fn drive(inner: Arc<QueueInner>) {
    loop {
        let (payload, seq) = {
            let mut state = inner.state.lock();
            match &state.pending {
                Some(pending) => (pending.clone(), state.seq),
                None => {
                    state.in_flight = false;
                    return;
                }
            }
        };

        let result = retry("response_delivery", &inner.retry, || {
            let inner = inner.clone();
            let payload = payload.clone();
            async move { send_once(&inner, &payload).await }
        })
        .await;

        match result {
            Ok(response_id) => {
                let notify_finished = {
                    let mut state = inner.state.lock();
                    state.survey_state.response_id = Some(response_id);
                    if state.seq != seq {
                        // Newer answers arrived mid-flight; send them too.
                        continue;
                    }
                    state.pending = None;
                    state.in_flight = false;
                    if payload.finished {
                        state.closed = true;
                    }
                    payload.finished
                };
                if notify_finished {
                    debug!("finished response durably acknowledged");
                    inner.events.response_sending_finished();
                }
                return;
            }
            Err(error) => {
                {
                    let mut state = inner.state.lock();
                    state.halted = true;
                    state.in_flight = false;
                }
                warn!(%error, "response delivery halted after exhausting retries");
                metrics::record_delivery_halted();
                inner.events.response_sending_failed();
                return;
            }
        }
    }
}

/// One delivery attempt: create when no response id is known yet,
/// update afterwards.
async fn send_once(inner: &QueueInner, payload: &ResponseUpdate) -> Result<String, WidgetError> {
    let survey_state = inner.state.lock().survey_state.clone();

    // A response must never be attributed without an established display.
    // The display create may still be in flight, so this counts as a failed
    // attempt (retryable) rather than dropping the payload.
    if survey_state.display_id.is_none() {
        return Err(WidgetError::MissingDisplay);
    }

    let input = ResponseInput {
        survey_id: survey_state.survey_id.clone(),
        user_id: survey_state.user_id.clone(),
        display_id: survey_state.display_id.clone(),
        finished: payload.finished,
        data: payload.data.clone(),
        ttc: payload.ttc.clone(),
    };

    match survey_state.response_id {
        Some(response_id) => match inner.backend.update_response(&response_id, &input).await {
            Ok(()) => {
                metrics::record_delivery("update", "success");
                Ok(response_id)
            }
            Err(e) => {
                metrics::record_delivery("update", "error");
                Err(e.into())
            }
        },
        None => match inner.backend.create_response(&input).await {
            Ok(response_id) => {
                metrics::record_delivery("create", "success");
                // Record immediately so retries of later payloads amend the
                // same record instead of creating a second one.
                inner
                    .state
                    .lock()
                    .survey_state
                    .response_id = Some(response_id.clone());
                Ok(response_id)
            }
            Err(e) => {
                metrics::record_delivery("create", "error");
                Err(e.into())
            }
        },
    }
}
