use std::time::Duration;

use propimport_core::submission::{DEFAULT_MAX_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT};

/// Default backend base URL (local backend, `/v1` prefix).
pub const DEFAULT_BACKEND_API_URL: &str = "http://localhost:8000/v1";

/// Page size used when fetching lookup tables (backend maximum).
pub const LOOKUP_PAGE_SIZE: u32 = 500;

/// Backend connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL without trailing slash.
    pub api_url: String,
    /// Service token used when a request carries no caller token.
    pub service_token: Option<String>,
    /// Per-row request timeout.
    pub request_timeout: Duration,
    /// Creation requests in flight at once.
    pub max_concurrency: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BACKEND_API_URL.to_string(),
            service_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                    |
    /// |--------------------------------|----------------------------|
    /// | `BACKEND_API_URL`              | `http://localhost:8000/v1` |
    /// | `BACKEND_API_TOKEN`            | unset                      |
    /// | `BACKEND_REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `IMPORT_MAX_CONCURRENCY`       | `4`                        |
    pub fn from_env() -> Self {
        let api_url = std::env::var("BACKEND_API_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_API_URL.into())
            .trim_end_matches('/')
            .to_string();

        let service_token = std::env::var("BACKEND_API_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let request_timeout_secs: u64 = std::env::var("BACKEND_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT.as_secs().to_string())
            .parse()
            .expect("BACKEND_REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_concurrency: usize = std::env::var("IMPORT_MAX_CONCURRENCY")
            .unwrap_or_else(|_| DEFAULT_MAX_CONCURRENCY.to_string())
            .parse()
            .expect("IMPORT_MAX_CONCURRENCY must be a valid usize");

        Self {
            api_url,
            service_token,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_concurrency: max_concurrency.max(1),
        }
    }
}
