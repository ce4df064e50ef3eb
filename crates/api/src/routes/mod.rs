pub mod health;
pub mod imports;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /imports                                  upload (POST, multipart)
/// /imports/fields/{mode}                    field registry for a mode (GET)
/// /imports/{id}                             session view (GET), discard (DELETE)
/// /imports/{id}/sheet                       choose workbook sheet (POST)
/// /imports/{id}/mappings                    replace (PUT), edit one column (PATCH)
/// /imports/{id}/submit                      start the batch (POST)
/// /imports/{id}/cancel                      abandon (POST)
/// /imports/{id}/reset                       start over (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/imports", imports::router())
}
