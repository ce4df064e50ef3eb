//! Handlers for spreadsheet imports.
//!
//! Provides endpoints for upload (multipart), workbook sheet choice, mapping
//! review, submission, cancellation, reset, and session retrieval. The batch
//! itself runs in a background task; clients poll the session for progress
//! and the final summary.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use propimport_core::error::CoreError;
use propimport_core::fields::{FieldDescriptor, ImportMode};
use propimport_core::mapping::ColumnMapping;
use propimport_core::session::{ImportSession, SessionStatus};
use propimport_core::submission::{submit_batch, BackendScope, ImportSummary};
use propimport_core::transform::{ImportPayload, LookupEntry};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::sessions::{ImportHandle, Timestamp};
use crate::state::AppState;

/// Decoded rows included in a session view.
pub const PREVIEW_ROWS: usize = 10;

// ── Session view ─────────────────────────────────────────────────────

/// Everything a client needs to render an import at its current step.
#[derive(Debug, Serialize)]
pub struct ImportView {
    pub id: Uuid,
    pub mode: ImportMode,
    pub status: SessionStatus,
    pub file_name: Option<String>,
    /// Offered sheets while the workbook waits for a choice.
    pub sheet_names: Vec<String>,
    pub sheet_name: Option<String>,
    pub headers: Vec<String>,
    pub mappings: Vec<ColumnMapping>,
    pub validation_errors: Vec<String>,
    pub row_count: usize,
    /// First rows, cells in header order.
    pub preview: Vec<Vec<String>>,
    pub processed_rows: usize,
    pub summary: Option<ImportSummary>,
    pub created_at: Timestamp,
}

impl ImportView {
    pub async fn build(handle: &ImportHandle) -> Self {
        let session = handle.session.lock().await;
        Self::from_session(handle, &session)
    }

    fn from_session(handle: &ImportHandle, session: &ImportSession) -> Self {
        let headers = session.headers().to_vec();
        let preview = session
            .preview(PREVIEW_ROWS)
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .map(|h| row.get(h).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            id: handle.id,
            mode: session.mode(),
            status: session.status(),
            file_name: session.file_name().map(String::from),
            sheet_names: session.sheet_names().to_vec(),
            sheet_name: session.sheet_name().map(String::from),
            headers,
            mappings: session.mappings().to_vec(),
            validation_errors: session.validation_errors().to_vec(),
            row_count: session.row_count(),
            preview,
            processed_rows: handle.processed_rows(),
            summary: session.summary().cloned(),
            created_at: handle.created_at,
        }
    }
}

// ── Fields ───────────────────────────────────────────────────────────

/// GET /api/v1/imports/fields/{mode}
pub async fn list_fields(
    Path(mode): Path<String>,
) -> AppResult<Json<DataResponse<Vec<FieldDescriptor>>>> {
    let mode = ImportMode::from_str_value(&mode).map_err(AppError::BadRequest)?;
    Ok(Json(DataResponse {
        data: mode.fields().to_vec(),
    }))
}

// ── Upload ───────────────────────────────────────────────────────────

/// POST /api/v1/imports
///
/// Accept a multipart upload with a `mode` text field and a `file` part,
/// decode it, and create a session with a proposed mapping. Multi-sheet
/// workbooks come back as `multi_sheet_pending` with the sheet names.
pub async fn upload_import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<ImportView>>)> {
    let mut mode: Option<ImportMode> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                mode = Some(ImportMode::from_str_value(&text).map_err(AppError::BadRequest)?);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((file_name, data.to_vec()));
            }
            _ => {}
        }
    }

    let mode =
        mode.ok_or_else(|| AppError::BadRequest("Missing 'mode' field in upload".to_string()))?;
    let (file_name, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' part in upload".to_string()))?;
    if bytes.is_empty() {
        return Err(CoreError::EmptyFile.into());
    }

    let mut session = ImportSession::new(mode);
    session.select_file(&file_name, bytes)?;

    let session = tokio::task::spawn_blocking(move || -> Result<ImportSession, CoreError> {
        session.decode()?;
        Ok(session)
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Decode task failed: {e}")))??;

    let handle = state.sessions.insert(session).await;
    tracing::info!(import_id = %handle.id, %mode, %file_name, "Import session created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ImportView::build(&handle).await,
        }),
    ))
}

// ── Session ──────────────────────────────────────────────────────────

/// GET /api/v1/imports/{id}
pub async fn get_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;
    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

/// DELETE /api/v1/imports/{id}
///
/// Discard the session; a running submission is cancelled.
pub async fn delete_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sessions.remove(import_id).await?;
    tracing::info!(%import_id, "Import session discarded");
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for sheet selection.
#[derive(Debug, Deserialize)]
pub struct ChooseSheetRequest {
    /// 1-based sheet index.
    pub sheet: usize,
}

/// POST /api/v1/imports/{id}/sheet
pub async fn choose_sheet(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
    Json(body): Json<ChooseSheetRequest>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;

    let worker = Arc::clone(&handle);
    tokio::task::spawn_blocking(move || {
        let mut session = worker.session.blocking_lock();
        session.choose_sheet(body.sheet)
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Decode task failed: {e}")))??;

    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

// ── Mappings ─────────────────────────────────────────────────────────

/// Request body for a full mapping replacement.
#[derive(Debug, Deserialize)]
pub struct ReplaceMappingsRequest {
    pub mappings: Vec<ColumnMapping>,
}

/// PUT /api/v1/imports/{id}/mappings
pub async fn replace_mappings(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
    Json(body): Json<ReplaceMappingsRequest>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;
    handle.session.lock().await.replace_mappings(body.mappings)?;

    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

/// Request body for a single-column mapping edit. A missing or blank
/// `target_field_key` skips the column.
#[derive(Debug, Deserialize)]
pub struct UpdateMappingRequest {
    pub source_header: String,
    #[serde(default)]
    pub target_field_key: Option<String>,
}

/// PATCH /api/v1/imports/{id}/mappings
pub async fn update_mapping(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
    Json(body): Json<UpdateMappingRequest>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;
    handle
        .session
        .lock()
        .await
        .assign_mapping(&body.source_header, body.target_field_key.as_deref())?;

    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

// ── Submit ───────────────────────────────────────────────────────────

/// Request body for submission.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub organization_id: String,
    /// Pre-fetched lookup table; fetched from the backend when absent.
    #[serde(default)]
    pub lookup: Option<Vec<LookupEntry>>,
}

/// POST /api/v1/imports/{id}/submit
///
/// Start the batch and return immediately with the session in `submitting`.
/// The caller's bearer token is forwarded to the backend.
pub async fn submit_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ImportView>>)> {
    let organization_id = body.organization_id.trim();
    if organization_id.is_empty() {
        return Err(AppError::BadRequest(
            "organization_id is required".to_string(),
        ));
    }

    let handle = state.sessions.get(import_id).await?;
    // The token is armed under the session lock, so a cancel that observes
    // `submitting` always cancels this submission's token.
    let (mode, cancel) = {
        let mut session = handle.session.lock().await;
        session.begin_submission()?;
        (session.mode(), handle.start_submission().await)
    };

    let scope = BackendScope::new(organization_id).with_bearer_token(bearer_token(&headers));

    let lookup = match body.lookup {
        Some(lookup) => lookup,
        None => match state.backend.fetch_lookup_table(&scope, mode).await {
            Ok(lookup) => lookup,
            Err(e) => {
                // Already cancelled sessions stay idle.
                handle.session.lock().await.abort_submission().ok();
                return Err(e.into());
            }
        },
    };

    // Fails with INVALID_STATE when the import was cancelled during the fetch.
    let payloads = handle.session.lock().await.build_payloads(&lookup)?;
    tracing::info!(
        %import_id,
        %mode,
        organization_id,
        rows = payloads.len(),
        lookup_entries = lookup.len(),
        "Starting import submission"
    );

    tokio::spawn(run_submission(
        state.clone(),
        Arc::clone(&handle),
        scope,
        payloads,
        cancel,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: ImportView::build(&handle).await,
        }),
    ))
}

/// Run the batch and record its summary on the session.
///
/// A batch cancelled or superseded while in flight leaves the session as
/// the cancel left it; its results are discarded.
async fn run_submission(
    state: AppState,
    handle: Arc<ImportHandle>,
    scope: BackendScope,
    payloads: Vec<ImportPayload>,
    cancel: tokio_util::sync::CancellationToken,
) {
    let result = submit_batch(
        state.backend.as_ref(),
        &scope,
        &payloads,
        &state.batch,
        &cancel,
        Some(&handle.progress),
    )
    .await;

    match result {
        Ok(summary) => {
            if let Err(e) = handle.session.lock().await.complete(summary) {
                tracing::info!(import_id = %handle.id, error = %e, "Discarding batch result");
            }
        }
        Err(e) => {
            tracing::info!(import_id = %handle.id, error = %e, "Import batch abandoned");
        }
    }
}

/// Bearer token from the `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ── Cancel / reset ───────────────────────────────────────────────────

/// POST /api/v1/imports/{id}/cancel
///
/// Abandon a pending sheet choice, mapping review, or running submission.
/// Requests already sent to the backend are not recalled.
pub async fn cancel_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;
    {
        // Token is cancelled under the session lock, same order as submit.
        let mut session = handle.session.lock().await;
        session.cancel()?;
        handle.cancel_submission().await;
        handle.reset_progress();
    }

    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

/// POST /api/v1/imports/{id}/reset
///
/// Start over from a finished or idle session.
pub async fn reset_import(
    State(state): State<AppState>,
    Path(import_id): Path<Uuid>,
) -> AppResult<Json<DataResponse<ImportView>>> {
    let handle = state.sessions.get(import_id).await?;
    handle.session.lock().await.reset()?;
    handle.reset_progress();

    Ok(Json(DataResponse {
        data: ImportView::build(&handle).await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
