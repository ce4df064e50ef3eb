use std::sync::Arc;

use propimport_core::submission::{BatchOptions, ImportBackend};

use crate::config::ServerConfig;
use crate::sessions::SessionStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Backend the imported records are created in.
    pub backend: Arc<dyn ImportBackend>,
    /// Concurrency and timeout policy for submissions.
    pub batch: BatchOptions,
    /// Live import sessions.
    pub sessions: Arc<SessionStore>,
}
