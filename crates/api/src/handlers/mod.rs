pub mod numbers;
pub mod pools;

use axum::http::StatusCode;
use axum::Json;
use numguard_core::error::CoreError;
use numguard_core::types::DbId;
use numguard_worker::manual::ManualAction;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Reject non-positive path ids before they reach the engine.
fn ensure_id(id: DbId) -> AppResult<()> {
    if id <= 0 {
        return Err(AppError::Core(CoreError::Validation(format!(
            "id must be positive, got {id}"
        ))));
    }
    Ok(())
}

/// Hand an action to the engine. The engine applies it asynchronously, so
/// success only means the action was queued.
fn enqueue(
    state: &AppState,
    action: ManualAction,
) -> AppResult<(StatusCode, Json<DataResponse<ManualAction>>)> {
    state.manual.try_enqueue(action)?;
    tracing::info!(?action, "Manual action queued");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: action })))
}
