pub mod health;
pub mod numbers;
pub mod pools;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /numbers/{id}                  number with lifecycle state (GET)
/// /numbers/{id}/recheck          queue forced recheck (POST)
///
/// /pools/{id}/rotate             queue manual rotation (POST)
/// /pools/{id}/deactivate         queue pool deactivation (POST)
/// /sub-pools/{id}/activate       queue sub-pool activation (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/numbers", numbers::router())
        .nest("/pools", pools::router())
        .nest("/sub-pools", pools::sub_pool_router())
}
