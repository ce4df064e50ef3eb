use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use propimport_backend::{BackendApi, BackendConfig};
use propimport_core::submission::BatchOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use propimport_api::background;
use propimport_api::config::ServerConfig;
use propimport_api::router::build_app_router;
use propimport_api::sessions::SessionStore;
use propimport_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "propimport_api=debug,propimport_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let backend_config = BackendConfig::from_env();
    tracing::info!(
        api_url = %backend_config.api_url,
        max_concurrency = backend_config.max_concurrency,
        request_timeout_secs = backend_config.request_timeout.as_secs(),
        "Loaded backend configuration"
    );

    // --- Backend client ---
    let backend = BackendApi::new(&backend_config).expect("Failed to build backend HTTP client");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        backend: Arc::new(backend),
        batch: BatchOptions {
            max_concurrency: backend_config.max_concurrency,
            request_timeout: backend_config.request_timeout,
        },
        sessions: Arc::new(SessionStore::new()),
    };

    // --- Background tasks ---
    let expiry_cancel = CancellationToken::new();
    let expiry_handle = tokio::spawn(background::session_expiry::run(
        Arc::clone(&state.sessions),
        Duration::from_secs(config.session_idle_ttl_secs),
        background::session_expiry::SWEEP_INTERVAL,
        expiry_cancel.clone(),
    ));

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    expiry_cancel.cancel();
    let _ = expiry_handle.await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
