//! Scripted in-memory backend for tests and demos.
//!
//! Every call is recorded so tests can assert on the exact request
//! sequence; failures are injected as "fail the next N calls" counters,
//! which is enough to exercise the retry and halt paths deterministically.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BackendClient, FileUpload, ResponseInput, UploadParams};
use crate::errors::NetworkError;
use crate::state::{Product, StateSync};

#[derive(Default)]
struct MockState {
    sync_payload: Option<StateSync>,
    fail_syncs: usize,
    fail_displays: usize,
    fail_responses: usize,
    next_id: u64,
    sync_calls: usize,
    no_cache_syncs: usize,
    display_creates: Vec<(String, Option<String>)>,
    response_creates: Vec<ResponseInput>,
    response_updates: Vec<(String, ResponseInput)>,
    responded_displays: Vec<String>,
    uploads: Vec<String>,
}

pub struct MockBackend {
    state: Mutex<MockState>,
    /// Simulated network latency per call; lets tests overlap `add()` calls
    /// with an in-flight request.
    latency: Duration,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            latency: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            latency,
        }
    }

    pub fn set_sync_payload(&self, payload: StateSync) {
        self.state.lock().sync_payload = Some(payload);
    }

    pub fn fail_next_syncs(&self, n: usize) {
        self.state.lock().fail_syncs = n;
    }

    pub fn fail_next_displays(&self, n: usize) {
        self.state.lock().fail_displays = n;
    }

    pub fn fail_next_responses(&self, n: usize) {
        self.state.lock().fail_responses = n;
    }

    #[must_use]
    pub fn sync_calls(&self) -> usize {
        self.state.lock().sync_calls
    }

    #[must_use]
    pub fn no_cache_syncs(&self) -> usize {
        self.state.lock().no_cache_syncs
    }

    #[must_use]
    pub fn display_creates(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().display_creates.clone()
    }

    #[must_use]
    pub fn response_creates(&self) -> Vec<ResponseInput> {
        self.state.lock().response_creates.clone()
    }

    #[must_use]
    pub fn response_updates(&self) -> Vec<(String, ResponseInput)> {
        self.state.lock().response_updates.clone()
    }

    #[must_use]
    pub fn responded_displays(&self) -> Vec<String> {
        self.state.lock().responded_displays.clone()
    }

    #[must_use]
    pub fn uploads(&self) -> Vec<String> {
        self.state.lock().uploads.clone()
    }

    fn error(&self, url: &str, message: &str) -> NetworkError {
        NetworkError {
            status: 500,
            url: url.to_string(),
            message: message.to_string(),
            response_message: Some("simulated failure".to_string()),
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn fetch_state(
        &self,
        _user_id: Option<&str>,
        no_cache: bool,
    ) -> Result<StateSync, NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.sync_calls += 1;
        if no_cache {
            state.no_cache_syncs += 1;
        }
        if state.fail_syncs > 0 {
            state.fail_syncs -= 1;
            return Err(self.error("mock:/in-app/sync", "error syncing with backend"));
        }
        Ok(state.sync_payload.clone().unwrap_or(StateSync {
            surveys: vec![],
            no_code_action_classes: vec![],
            product: Product::default(),
            person: None,
        }))
    }

    async fn create_display(
        &self,
        survey_id: &str,
        user_id: Option<&str>,
    ) -> Result<String, NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.fail_displays > 0 {
            state.fail_displays -= 1;
            return Err(self.error("mock:/displays", "could not create display"));
        }
        state.next_id += 1;
        let id = format!("disp-{}", state.next_id);
        state
            .display_creates
            .push((survey_id.to_string(), user_id.map(str::to_string)));
        Ok(id)
    }

    async fn create_response(&self, input: &ResponseInput) -> Result<String, NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.fail_responses > 0 {
            state.fail_responses -= 1;
            return Err(self.error("mock:/responses", "could not create response"));
        }
        state.next_id += 1;
        let id = format!("resp-{}", state.next_id);
        state.response_creates.push(input.clone());
        Ok(id)
    }

    async fn update_response(
        &self,
        response_id: &str,
        input: &ResponseInput,
    ) -> Result<(), NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.fail_responses > 0 {
            state.fail_responses -= 1;
            return Err(self.error("mock:/responses", "could not update response"));
        }
        state
            .response_updates
            .push((response_id.to_string(), input.clone()));
        Ok(())
    }

    async fn mark_display_responded(&self, display_id: &str) -> Result<(), NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.responded_displays.push(display_id.to_string());
        Ok(())
    }

    async fn upload_file(
        &self,
        upload: &FileUpload,
        _params: &UploadParams,
    ) -> Result<String, NetworkError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let url = format!("mock://storage/{}", upload.file_name);
        state.uploads.push(upload.file_name.clone());
        Ok(url)
    }
}

/// Convenience payload builder shared by tests and the demo.
#[must_use]
pub fn sync_payload(surveys: Vec<crate::state::Survey>) -> StateSync {
    StateSync {
        surveys,
        no_code_action_classes: vec![],
        product: Product::default(),
        person: None,
    }
}
