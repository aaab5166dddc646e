//! Handlers for the `/numbers` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use numguard_core::error::CoreError;
use numguard_core::lifecycle::NumberState;
use numguard_core::types::DbId;
use numguard_db::models::number::Number;
use numguard_db::repositories::NumberRepo;
use numguard_worker::manual::ManualAction;
use serde::Serialize;

use super::{enqueue, ensure_id};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A number row with its derived lifecycle state.
#[derive(Debug, Serialize)]
pub struct NumberView {
    #[serde(flatten)]
    pub number: Number,
    pub state: NumberState,
}

impl From<Number> for NumberView {
    fn from(number: Number) -> Self {
        let state = number.state();
        Self { number, state }
    }
}

/// GET /api/v1/numbers/{id}
pub async fn get_number(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<NumberView>>> {
    ensure_id(id)?;
    let number = NumberRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Number",
            id,
        }))?;
    Ok(Json(DataResponse {
        data: number.into(),
    }))
}

/// POST /api/v1/numbers/{id}/recheck
///
/// Queue a forced recheck. Unknown ids are reported by the engine, not here.
pub async fn force_recheck(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<ManualAction>>)> {
    ensure_id(id)?;
    enqueue(&state, ManualAction::ForceRecheck { number_id: id })
}
