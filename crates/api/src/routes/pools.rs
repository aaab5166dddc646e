//! Route definitions for `/pools` and `/sub-pools`.

use axum::routing::post;
use axum::Router;

use crate::handlers::pools;
use crate::state::AppState;

/// Routes mounted at `/pools`.
///
/// ```text
/// POST /{id}/rotate      -> rotate
/// POST /{id}/deactivate  -> deactivate
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/rotate", post(pools::rotate))
        .route("/{id}/deactivate", post(pools::deactivate))
}

/// Routes mounted at `/sub-pools`.
pub fn sub_pool_router() -> Router<AppState> {
    Router::new().route("/{id}/activate", post(pools::activate_sub_pool))
}
