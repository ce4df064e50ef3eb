//! Periodic expiry of idle import sessions.
//!
//! Every session keeps its decoded sheet in memory until it is deleted.
//! This task drops the ones nobody has looked at for the configured idle
//! period, so abandoned uploads do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sessions::SessionStore;

/// How often the sweep runs in production.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the expiry loop until `cancel` is triggered.
pub async fn run(
    sessions: Arc<SessionStore>,
    max_idle: Duration,
    sweep_every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        max_idle_secs = max_idle.as_secs(),
        interval_secs = sweep_every.as_secs(),
        "Session expiry job started"
    );

    let mut interval = tokio::time::interval(sweep_every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session expiry job stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = sessions.remove_idle(max_idle).await;
                if removed > 0 {
                    let remaining = sessions.len().await;
                    tracing::info!(removed, remaining, "Expired idle import sessions");
                } else {
                    tracing::debug!("Session expiry: nothing to expire");
                }
            }
        }
    }
}
