//! In-memory store of live import sessions.
//!
//! Sessions never outlive the process. Each one sits behind its own mutex so
//! a slow decode on one import does not hold up requests for another. Idle
//! sessions are dropped by [`SessionStore::remove_idle`], which the
//! expiry task in [`crate::background`] calls periodically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use propimport_core::error::CoreError;
use propimport_core::session::{ImportSession, SessionStatus};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type Timestamp = DateTime<Utc>;

/// One live import and its submission bookkeeping.
#[derive(Debug)]
pub struct ImportHandle {
    pub id: Uuid,
    pub created_at: Timestamp,
    pub session: Mutex<ImportSession>,
    /// Rows reconciled so far in the current submission.
    pub progress: AtomicUsize,
    /// Token for the current submission; replaced on each submit.
    cancel: Mutex<CancellationToken>,
    /// Unix millis of the last lookup through the store.
    last_seen_ms: AtomicI64,
}

impl ImportHandle {
    fn new(session: ImportSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session: Mutex::new(session),
            progress: AtomicUsize::new(0),
            cancel: Mutex::new(CancellationToken::new()),
            last_seen_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    fn touch(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Whether the session is mid-submission or locked by a request.
    fn is_busy(&self) -> bool {
        match self.session.try_lock() {
            Ok(session) => session.status() == SessionStatus::Submitting,
            Err(_) => true,
        }
    }

    pub fn processed_rows(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn reset_progress(&self) {
        self.progress.store(0, Ordering::Relaxed);
    }

    /// Reset progress and arm a fresh cancellation token for a submission.
    pub async fn start_submission(&self) -> CancellationToken {
        self.reset_progress();
        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();
        token
    }

    /// Signal the running submission, if any, to stop.
    pub async fn cancel_submission(&self) {
        self.cancel.lock().await.cancel();
    }
}

/// All live import sessions, keyed by id.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<ImportHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its handle.
    pub async fn insert(&self, session: ImportSession) -> Arc<ImportHandle> {
        let handle = Arc::new(ImportHandle::new(session));
        self.sessions
            .write()
            .await
            .insert(handle.id, Arc::clone(&handle));
        handle
    }

    /// Look up a session and mark it as recently used.
    pub async fn get(&self, id: Uuid) -> Result<Arc<ImportHandle>, CoreError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                entity: "ImportSession",
                id: id.to_string(),
            })?;
        handle.touch();
        Ok(handle)
    }

    /// Drop every session not looked up for at least `max_idle`. Sessions
    /// that are submitting or currently locked are kept. Returns the number
    /// removed.
    pub async fn remove_idle(&self, max_idle: Duration) -> usize {
        let max_idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = Utc::now().timestamp_millis().saturating_sub(max_idle_ms);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            handle.last_seen_ms.load(Ordering::Relaxed) > cutoff_ms || handle.is_busy()
        });
        before - sessions.len()
    }

    /// Drop a session, cancelling any submission it has running.
    pub async fn remove(&self, id: Uuid) -> Result<(), CoreError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "ImportSession",
                id: id.to_string(),
            })?;
        handle.cancel_submission().await;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use propimport_core::fields::ImportMode;

    #[tokio::test]
    async fn insert_get_remove() {
        let store = SessionStore::new();
        let handle = store.insert(ImportSession::new(ImportMode::Units)).await;
        assert_eq!(store.len().await, 1);

        let fetched = store.get(handle.id).await.unwrap();
        assert_eq!(fetched.session.lock().await.mode(), ImportMode::Units);

        store.remove(handle.id).await.unwrap();
        assert!(store.is_empty().await);
        assert_matches!(store.get(handle.id).await, Err(CoreError::NotFound { .. }));
    }

    fn submitting_session() -> ImportSession {
        let mut session = ImportSession::new(ImportMode::Properties);
        session
            .select_file("props.csv", b"name\nCasa Azul\n".to_vec())
            .unwrap();
        session.decode().unwrap();
        session.begin_submission().unwrap();
        session
    }

    #[tokio::test]
    async fn remove_idle_expires_untouched_sessions() {
        let store = SessionStore::new();
        store.insert(ImportSession::new(ImportMode::Units)).await;
        store.insert(ImportSession::new(ImportMode::Leases)).await;

        assert_eq!(store.remove_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.len().await, 2);

        assert_eq!(store.remove_idle(Duration::ZERO).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_idle_keeps_busy_sessions() {
        let store = SessionStore::new();
        let submitting = store.insert(submitting_session()).await;
        let locked = store.insert(ImportSession::new(ImportMode::Units)).await;
        let idle = store.insert(ImportSession::new(ImportMode::Units)).await;

        {
            let _guard = locked.session.lock().await;
            assert_eq!(store.remove_idle(Duration::ZERO).await, 1);
        }
        assert!(store.get(submitting.id).await.is_ok());
        assert!(store.get(locked.id).await.is_ok());
        assert_matches!(store.get(idle.id).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_reaches_the_latest_submission() {
        let store = SessionStore::new();
        let handle = store.insert(ImportSession::new(ImportMode::Units)).await;
        let first = handle.start_submission().await;
        handle.progress.fetch_add(5, Ordering::Relaxed);
        let second = handle.start_submission().await;
        assert_eq!(handle.processed_rows(), 0);

        handle.cancel_submission().await;
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[tokio::test]
    async fn remove_cancels_running_submission() {
        let store = SessionStore::new();
        let handle = store.insert(ImportSession::new(ImportMode::Leases)).await;
        let token = handle.start_submission().await;
        store.remove(handle.id).await.unwrap();
        assert!(token.is_cancelled());
    }
}
