//! Network client seam.
//!
//! [`BackendClient`] is the trait boundary between the widget core and the
//! survey backend. Everything behind it returns tagged
//! `Result<_, NetworkError>`; transport failures never panic and never
//! throw across this boundary. [`HttpBackend`] is the production
//! implementation; [`MockBackend`] is a scripted in-memory backend for the
//! demo and the test suites.

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::NetworkError;
use crate::state::StateSync;

/// A cumulative response payload sent to the backend.
///
/// `data` is the full answer state so far, not a delta; the create and
/// update calls carry the same shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInput {
    pub survey_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    pub finished: bool,
    pub data: HashMap<String, Value>,
    /// Per-question time-to-complete telemetry, seconds.
    pub ttc: HashMap<String, f64>,
}

/// A file attached to a response from within a survey question.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub file_type: String,
    pub bytes: Vec<u8>,
}

/// Upload configuration passed alongside the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadParams {
    pub survey_id: Option<String>,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Fetch the current environment state. `user_id` selects the
    /// identified endpoint variant; `no_cache` bypasses HTTP-level caching.
    async fn fetch_state(
        &self,
        user_id: Option<&str>,
        no_cache: bool,
    ) -> Result<StateSync, NetworkError>;

    /// Record an impression; returns the new display id.
    async fn create_display(
        &self,
        survey_id: &str,
        user_id: Option<&str>,
    ) -> Result<String, NetworkError>;

    /// Create the response record for a survey session; returns its id.
    async fn create_response(&self, input: &ResponseInput) -> Result<String, NetworkError>;

    /// Amend a previously created response record.
    async fn update_response(
        &self,
        response_id: &str,
        input: &ResponseInput,
    ) -> Result<(), NetworkError>;

    /// Flag a display as responded (legacy client endpoint).
    async fn mark_display_responded(&self, display_id: &str) -> Result<(), NetworkError>;

    /// Store a file and return its reference URL.
    async fn upload_file(
        &self,
        upload: &FileUpload,
        params: &UploadParams,
    ) -> Result<String, NetworkError>;
}
