// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP implementation of the backend client.
//!
//! Wire contract: 2xx responses wrap their payload in `{"data": ...}`;
//! error responses carry `{"message": ...}`, which is folded into the
//! returned [`NetworkError`] so the host sees the backend's own words.

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{BackendClient, FileUpload, ResponseInput, UploadParams};
use crate::errors::NetworkError;
use crate::state::StateSync;

pub struct HttpBackend {
    client: Client,
    api_host: String,
    environment_id: String,
    client_version: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Deserialize)]
struct StoredFile {
    url: String,
}

impl HttpBackend {
    #[must_use]
    pub fn new(
        api_host: impl Into<String>,
        environment_id: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        let api_host: String = api_host.into();
        Self {
            client: Client::new(),
            api_host: api_host.trim_end_matches('/').to_string(),
            environment_id: environment_id.into(),
            client_version: client_version.into(),
        }
    }

    fn client_url(&self, suffix: &str) -> String {
        format!("{}/api/v1/client/{}{}", self.api_host, self.environment_id, suffix)
    }

    fn sync_url(&self, user_id: Option<&str>) -> String {
        let base = self.client_url("/in-app/sync");
        match user_id {
            // Public endpoint variant for anonymous visitors.
            None => format!("{}?version={}", base, self.client_version),
            Some(user_id) => format!("{}/{}?version={}", base, user_id, self.client_version),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        url: &str,
        context: &str,
    ) -> Result<T, NetworkError> {
        let status = response.status();
        if !status.is_success() {
            let response_message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message);
            return Err(NetworkError {
                status: status.as_u16(),
                url: url.to_string(),
                message: context.to_string(),
                response_message,
            });
        }

        response
            .json::<DataEnvelope<T>>()
            .await
            .map(|envelope| envelope.data)
            .map_err(|e| NetworkError {
                status: status.as_u16(),
                url: url.to_string(),
                message: format!("{context}: malformed response body ({e})"),
                response_message: None,
            })
    }

    fn send_error(url: &str, context: &str, error: &reqwest::Error) -> NetworkError {
        NetworkError::transport(url, format!("{context}: {error}"))
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn fetch_state(
        &self,
        user_id: Option<&str>,
        no_cache: bool,
    ) -> Result<StateSync, NetworkError> {
        let url = self.sync_url(user_id);
        let mut request = self.client.get(&url);
        if no_cache {
            debug!("no-cache option set for sync");
            request = request.header(CACHE_CONTROL, "no-cache");
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "error syncing with backend", &e))?;
        Self::decode(response, &url, "error syncing with backend").await
    }

    async fn create_display(
        &self,
        survey_id: &str,
        user_id: Option<&str>,
    ) -> Result<String, NetworkError> {
        let url = self.client_url("/displays");
        let body = json!({ "surveyId": survey_id, "userId": user_id });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "could not create display", &e))?;
        let created: CreatedId = Self::decode(response, &url, "could not create display").await?;
        Ok(created.id)
    }

    async fn create_response(&self, input: &ResponseInput) -> Result<String, NetworkError> {
        let url = self.client_url("/responses");
        let response = self
            .client
            .post(&url)
            .json(input)
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "could not create response", &e))?;
        let created: CreatedId = Self::decode(response, &url, "could not create response").await?;
        Ok(created.id)
    }

    async fn update_response(
        &self,
        response_id: &str,
        input: &ResponseInput,
    ) -> Result<(), NetworkError> {
        let url = self.client_url(&format!("/responses/{response_id}"));
        let response = self
            .client
            .put(&url)
            .json(input)
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "could not update response", &e))?;
        let _: serde_json::Value = Self::decode(response, &url, "could not update response").await?;
        Ok(())
    }

    async fn mark_display_responded(&self, display_id: &str) -> Result<(), NetworkError> {
        let url = self.client_url(&format!("/displays/{display_id}/responded"));
        let response = self
            .client
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "could not mark display responded", &e))?;
        let _: serde_json::Value =
            Self::decode(response, &url, "could not mark display responded").await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        upload: &FileUpload,
        params: &UploadParams,
    ) -> Result<String, NetworkError> {
        let url = self.client_url("/storage");
        let body = json!({
            "fileName": upload.file_name,
            "fileType": upload.file_type,
            "surveyId": params.survey_id,
            "fileBase64": base64::encode(&upload.bytes),
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::send_error(&url, "could not upload file", &e))?;
        let stored: StoredFile = Self::decode(response, &url, "could not upload file").await?;
        Ok(stored.url)
    }
}
