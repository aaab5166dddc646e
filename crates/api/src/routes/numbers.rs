//! Route definitions for the `/numbers` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::numbers;
use crate::state::AppState;

/// Routes mounted at `/numbers`.
///
/// ```text
/// GET  /{id}          -> get_number
/// POST /{id}/recheck  -> force_recheck
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(numbers::get_number))
        .route("/{id}/recheck", post(numbers::force_recheck))
}
