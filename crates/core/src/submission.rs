//! Batch submission and per-row result reconciliation.
//!
//! Every payload is attempted, in order, whatever happened to the rows before
//! it. Requests may run concurrently (bounded), but results always come back
//! in input row order so they line up with the preview table.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::fields::ImportMode;
use crate::transform::{ImportPayload, LookupEntry};
use crate::types::RecordId;

// ── Constants ────────────────────────────────────────────────────────

/// Row error messages longer than this (in characters) are truncated.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Default number of creation requests in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default per-row request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Backend seam ─────────────────────────────────────────────────────

/// Why the backend did not create a row's record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The backend answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The request never got an answer (network, DNS, TLS, decode).
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,
}

/// Organization (and optional caller credentials) every request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendScope {
    pub organization_id: String,
    /// Bearer token forwarded from the caller, when there is one.
    pub bearer_token: Option<String>,
}

impl BackendScope {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

/// The REST backend the pipeline creates records in.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    /// Create one record; returns its id when the backend reports one.
    async fn create_record(
        &self,
        scope: &BackendScope,
        payload: &ImportPayload,
    ) -> Result<Option<RecordId>, RecordError>;

    /// Fetch the cross-reference table a mode resolves names against:
    /// properties for units, units for leases, nothing for properties.
    async fn fetch_lookup_table(
        &self,
        scope: &BackendScope,
        mode: ImportMode,
    ) -> Result<Vec<LookupEntry>, RecordError>;
}

// ── Results ──────────────────────────────────────────────────────────

/// Typed outcome of one creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Created { record_id: Option<RecordId> },
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Success,
    Failure,
}

/// Result for a single submitted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    /// 0-based position of the row among the decoded data rows.
    pub row_index: usize,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
}

impl RowResult {
    pub fn new(row_index: usize, outcome: SubmissionOutcome) -> Self {
        match outcome {
            SubmissionOutcome::Created { record_id } => Self {
                row_index,
                status: RowStatus::Success,
                error: None,
                record_id,
            },
            SubmissionOutcome::Failed { error } => Self {
                row_index,
                status: RowStatus::Failure,
                error: Some(truncate_message(&error)),
                record_id: None,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RowStatus::Success
    }
}

/// Aggregate of a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub succeeded_count: usize,
    /// Failures in row order.
    pub failed_results: Vec<RowResult>,
}

impl ImportSummary {
    pub fn from_results(results: &[RowResult]) -> Self {
        Self {
            total_rows: results.len(),
            succeeded_count: results.iter().filter(|r| r.is_success()).count(),
            failed_results: results.iter().filter(|r| !r.is_success()).cloned().collect(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed_results.len()
    }
}

/// Concurrency and timeout policy for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub request_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ── Batch ────────────────────────────────────────────────────────────

/// Submit every payload and summarize the per-row outcomes.
///
/// A failed or timed-out row never stops the rows after it. `progress`, when
/// given, is incremented as each row's result is collected. Cancelling the
/// token abandons the batch with [`CoreError::Cancelled`]; requests already
/// in flight are dropped and their results discarded.
pub async fn submit_batch(
    backend: &dyn ImportBackend,
    scope: &BackendScope,
    payloads: &[ImportPayload],
    options: &BatchOptions,
    cancel: &CancellationToken,
    progress: Option<&AtomicUsize>,
) -> Result<ImportSummary, CoreError> {
    let total = payloads.len();
    let request_timeout = options.request_timeout;
    tracing::info!(
        organization_id = %scope.organization_id,
        total,
        max_concurrency = options.max_concurrency,
        "Submitting import batch"
    );

    let mut attempts = futures::stream::iter(payloads.iter().enumerate())
        .map(|(row_index, payload)| async move {
            let outcome = match tokio::time::timeout(
                request_timeout,
                backend.create_record(scope, payload),
            )
            .await
            {
                Ok(Ok(record_id)) => SubmissionOutcome::Created { record_id },
                Ok(Err(e)) => SubmissionOutcome::Failed {
                    error: e.to_string(),
                },
                Err(_) => SubmissionOutcome::Failed {
                    error: RecordError::Timeout.to_string(),
                },
            };
            RowResult::new(row_index, outcome)
        })
        .buffered(options.max_concurrency.max(1))
        .boxed();

    let mut results: Vec<RowResult> = Vec::with_capacity(total);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(processed = results.len(), total, "Import batch cancelled");
                return Err(CoreError::Cancelled);
            }
            next = attempts.next() => match next {
                Some(result) => {
                    if let Some(error) = &result.error {
                        tracing::warn!(row_index = result.row_index, error = %error, "Import row failed");
                    }
                    results.push(result);
                    if let Some(counter) = progress {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            },
        }
    }

    let summary = ImportSummary::from_results(&results);
    tracing::info!(
        total = summary.total_rows,
        succeeded = summary.succeeded_count,
        failed = summary.failed_count(),
        "Import batch finished"
    );
    Ok(summary)
}

/// Cap a message at [`MAX_ERROR_MESSAGE_CHARS`] characters, marking the cut
/// with `...`.
pub fn truncate_message(message: &str) -> String {
    let message = message.trim();
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    let cut: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS - 3).collect();
    format!("{cut}...")
}

// ── Tests ────────────────────────────────────────────────────────────
