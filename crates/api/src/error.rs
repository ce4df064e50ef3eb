use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use propimport_core::error::CoreError;
use propimport_core::submission::RecordError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for pipeline errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A pipeline error from `propimport_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The backend could not serve a request made on the caller's behalf
    /// (lookup table fetches; row failures never surface here).
    #[error("Backend error: {0}")]
    Backend(#[from] RecordError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Backend errors ---
            AppError::Backend(err) => {
                tracing::warn!(error = %err, "Backend request failed");
                (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", err.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a pipeline error into an HTTP status, error code, and message.
///
/// Decode errors keep distinct codes so clients can tell a password-protected
/// workbook from a corrupt one.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CoreError::UnsupportedFormat(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT", message)
        }
        CoreError::Parse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_ERROR", message),
        CoreError::EmptyFile => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_FILE", message),
        CoreError::EmptySheet(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_SHEET", message),
        CoreError::PasswordProtected => {
            (StatusCode::UNPROCESSABLE_ENTITY, "PASSWORD_PROTECTED", message)
        }
        CoreError::SheetOutOfRange { .. } => {
            (StatusCode::BAD_REQUEST, "SHEET_OUT_OF_RANGE", message)
        }
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_STATE", message),
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", message),
    }
}
