//! Route definitions for spreadsheet imports.
//!
//! Mounted at `/imports`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/imports`.
///
/// ```text
/// POST   /                     -> upload_import     (multipart: mode, file)
/// GET    /fields/{mode}        -> list_fields
/// GET    /{id}                 -> get_import
/// DELETE /{id}                 -> delete_import
/// POST   /{id}/sheet           -> choose_sheet
/// PUT    /{id}/mappings        -> replace_mappings
/// PATCH  /{id}/mappings        -> update_mapping
/// POST   /{id}/submit          -> submit_import
/// POST   /{id}/cancel          -> cancel_import
/// POST   /{id}/reset           -> reset_import
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(imports::upload_import))
        .route("/fields/{mode}", get(imports::list_fields))
        .route(
            "/{id}",
            get(imports::get_import).delete(imports::delete_import),
        )
        .route("/{id}/sheet", post(imports::choose_sheet))
        .route(
            "/{id}/mappings",
            axum::routing::put(imports::replace_mappings).patch(imports::update_mapping),
        )
        .route("/{id}/submit", post(imports::submit_import))
        .route("/{id}/cancel", post(imports::cancel_import))
        .route("/{id}/reset", post(imports::reset_import))
}
