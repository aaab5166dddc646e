//! Handlers for pool and sub-pool activation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use numguard_core::types::DbId;
use numguard_worker::manual::ManualAction;

use super::{enqueue, ensure_id};
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

type Accepted = AppResult<(StatusCode, Json<DataResponse<ManualAction>>)>;

/// POST /api/v1/pools/{id}/rotate
///
/// Advance to the next eligible sub-pool even if the current one is still
/// eligible.
pub async fn rotate(State(state): State<AppState>, Path(id): Path<DbId>) -> Accepted {
    ensure_id(id)?;
    enqueue(&state, ManualAction::RotatePool { pool_id: id })
}

/// POST /api/v1/pools/{id}/deactivate
///
/// Turn rotation off and deactivate every sub-pool of the pool.
pub async fn deactivate(State(state): State<AppState>, Path(id): Path<DbId>) -> Accepted {
    ensure_id(id)?;
    enqueue(&state, ManualAction::DeactivatePool { pool_id: id })
}

/// POST /api/v1/sub-pools/{id}/activate
pub async fn activate_sub_pool(State(state): State<AppState>, Path(id): Path<DbId>) -> Accepted {
    ensure_id(id)?;
    enqueue(&state, ManualAction::ActivateSubPool { sub_pool_id: id })
}
