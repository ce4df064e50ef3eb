//! HTTP client for the backend's creation and listing endpoints.
//!
//! Wraps `POST /{collection}` (one record per call, scoped by
//! `organization_id` in the body) and `GET /{collection}?org_id=` lookups
//! using [`reqwest`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use propimport_core::fields::ImportMode;
use propimport_core::submission::{BackendScope, ImportBackend, RecordError};
use propimport_core::transform::{ImportPayload, LookupEntry};
use propimport_core::types::RecordId;

use crate::config::{BackendConfig, LOOKUP_PAGE_SIZE};

/// JSON keys checked, in order, for a human-readable backend error.
const ERROR_MESSAGE_KEYS: &[&str] = &["detail", "error", "message"];

/// HTTP client for one backend deployment.
pub struct BackendApi {
    client: reqwest::Client,
    api_url: String,
    service_token: Option<String>,
}

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
}

impl From<BackendApiError> for RecordError {
    fn from(err: BackendApiError) -> Self {
        match err {
            BackendApiError::Request(e) if e.is_timeout() => RecordError::Timeout,
            BackendApiError::Request(e) => RecordError::Transport(e.to_string()),
            BackendApiError::ApiError { status, body } => RecordError::Rejected {
                status,
                message: extract_error_message(&body),
            },
        }
    }
}

/// Creation body: the typed payload plus the owning organization.
#[derive(Serialize)]
struct OrgScoped<'a> {
    organization_id: &'a str,
    #[serde(flatten)]
    payload: &'a ImportPayload,
}

/// Created record; only the id is of interest.
#[derive(Debug, Deserialize)]
struct CreatedRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// `{ "data": [...] }` list envelope.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

impl BackendApi {
    /// Create a client from configuration.
    ///
    /// The configured request timeout is applied at the client level too, so
    /// a stalled connection surfaces as [`RecordError::Timeout`].
    pub fn new(config: &BackendConfig) -> Result<Self, BackendApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(
            client,
            config.api_url.clone(),
            config.service_token.clone(),
        ))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        service_token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            service_token,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Create one record in the collection matching the payload's mode.
    ///
    /// Returns the created record's id when the response carries one.
    pub async fn create(
        &self,
        scope: &BackendScope,
        payload: &ImportPayload,
    ) -> Result<Option<RecordId>, BackendApiError> {
        let body = OrgScoped {
            organization_id: &scope.organization_id,
            payload,
        };

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/{}", self.api_url, payload.mode().as_str())),
                scope,
            )
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        // A 2xx with an unparseable body still counts as created.
        let created = response.json::<CreatedRecord>().await.ok();
        Ok(created.and_then(|c| c.id).and_then(|id| match id {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }

    /// List the organization's properties as lookup entries.
    pub async fn list_properties(
        &self,
        scope: &BackendScope,
    ) -> Result<Vec<LookupEntry>, BackendApiError> {
        self.list(ImportMode::Properties.as_str(), scope).await
    }

    /// List the organization's units as lookup entries (with `property_id`).
    pub async fn list_units(&self, scope: &BackendScope) -> Result<Vec<LookupEntry>, BackendApiError> {
        self.list(ImportMode::Units.as_str(), scope).await
    }

    // ---- private helpers ----

    async fn list(
        &self,
        collection: &str,
        scope: &BackendScope,
    ) -> Result<Vec<LookupEntry>, BackendApiError> {
        let limit = LOOKUP_PAGE_SIZE.to_string();
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/{}", self.api_url, collection))
                    .query(&[("org_id", scope.organization_id.as_str()), ("limit", limit.as_str())]),
                scope,
            )
            .send()
            .await?;

        let list: ListResponse<LookupEntry> = Self::parse_response(response).await?;
        tracing::debug!(collection, entries = list.data.len(), "Fetched lookup table");
        if hit_page_limit(list.data.len()) {
            tracing::warn!(
                collection,
                limit = LOOKUP_PAGE_SIZE,
                "Lookup table hit the page limit; later entries will not resolve"
            );
        }
        Ok(list.data)
    }

    /// Attach the caller's bearer token, else the service token.
    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        scope: &BackendScope,
    ) -> reqwest::RequestBuilder {
        match scope.bearer_token.as_deref().or(self.service_token.as_deref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BackendApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ImportBackend for BackendApi {
    async fn create_record(
        &self,
        scope: &BackendScope,
        payload: &ImportPayload,
    ) -> Result<Option<RecordId>, RecordError> {
        Ok(self.create(scope, payload).await?)
    }

    async fn fetch_lookup_table(
        &self,
        scope: &BackendScope,
        mode: ImportMode,
    ) -> Result<Vec<LookupEntry>, RecordError> {
        let entries = match mode {
            ImportMode::Properties => Vec::new(),
            ImportMode::Units => self.list_properties(scope).await?,
            ImportMode::Leases => self.list_units(scope).await?,
        };
        Ok(entries)
    }
}

/// Pull a readable message out of an error body: the first string among
/// `detail`, `error`, `message` in a JSON object, else the trimmed raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ERROR_MESSAGE_KEYS {
            match map.get(*key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return s.trim().to_string();
                }
                Some(serde_json::Value::Null) | None => {}
                Some(serde_json::Value::String(_)) => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    match body.trim() {
        "" => "Empty response body".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// A full page means the backend may hold more entries than were fetched.
fn hit_page_limit(entries: usize) -> bool {
    entries >= LOOKUP_PAGE_SIZE as usize
}
