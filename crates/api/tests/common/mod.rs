#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use propimport_api::config::ServerConfig;
use propimport_api::router::build_app_router;
use propimport_api::sessions::SessionStore;
use propimport_api::state::AppState;
use propimport_core::fields::ImportMode;
use propimport_core::submission::{BackendScope, BatchOptions, ImportBackend, RecordError};
use propimport_core::transform::{ImportPayload, LookupEntry};
use propimport_core::types::RecordId;

pub const BOUNDARY: &str = "propimport-test-boundary";

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// In-memory backend. Rejects any payload whose serialized JSON contains
/// the string `"REJECT"`, and sleeps `delay` before answering each row.
/// When `lookup_gate` is set, lookup fetches wait for it to be notified.
#[derive(Default)]
pub struct MockBackend {
    pub created: Mutex<Vec<Value>>,
    pub scopes: Mutex<Vec<BackendScope>>,
    pub lookup: Vec<LookupEntry>,
    pub lookup_fetches: Mutex<usize>,
    pub fail_lookup: bool,
    pub delay: Option<Duration>,
    pub lookup_gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ImportBackend for MockBackend {
    async fn create_record(
        &self,
        scope: &BackendScope,
        payload: &ImportPayload,
    ) -> Result<Option<RecordId>, RecordError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let body = serde_json::to_value(payload).unwrap();
        self.scopes.lock().unwrap().push(scope.clone());
        if body.to_string().contains("REJECT") {
            return Err(RecordError::Rejected {
                status: 422,
                message: "row rejected".to_string(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push(body);
        Ok(Some(format!("rec-{}", created.len())))
    }

    async fn fetch_lookup_table(
        &self,
        _scope: &BackendScope,
        mode: ImportMode,
    ) -> Result<Vec<LookupEntry>, RecordError> {
        *self.lookup_fetches.lock().unwrap() += 1;
        if let Some(gate) = &self.lookup_gate {
            gate.notified().await;
        }
        if self.fail_lookup {
            return Err(RecordError::Transport("connection refused".to_string()));
        }
        Ok(match mode {
            ImportMode::Properties => Vec::new(),
            _ => self.lookup.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        session_idle_ttl_secs: 3600,
    }
}

/// Build the full application router around the given backend, using the
/// same middleware stack production uses.
pub fn build_test_app(backend: Arc<MockBackend>) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        backend,
        batch: BatchOptions {
            max_concurrency: 2,
            request_timeout: Duration::from_secs(5),
        },
        sessions: Arc::new(SessionStore::new()),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn send_json(app: Router, method: Method, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    app.oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Build a `multipart/form-data` body with a `mode` field and a `file` part.
pub fn multipart_body(mode: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"mode\"\r\n\r\n{mode}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn upload(app: Router, mode: &str, file_name: &str, contents: &[u8]) -> Response {
    let request = Request::post("/api/v1/imports")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(mode, file_name, contents)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Upload and return the new session's id, asserting 201.
pub async fn upload_ok(app: Router, mode: &str, file_name: &str, contents: &[u8]) -> String {
    let response = upload(app, mode, file_name, contents).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["id"].as_str().unwrap().to_string()
}

/// Poll the session until it reaches `status` (or give up after ~5 s).
pub async fn wait_for_status(app: Router, id: &str, status: &str) -> Value {
    for _ in 0..250 {
        let json = body_json(get(app.clone(), &format!("/api/v1/imports/{id}")).await).await;
        if json["data"]["status"] == status {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("import {id} never reached status {status}");
}
