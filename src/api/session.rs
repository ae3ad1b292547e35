//! Execution lookup and control endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::AppState;
use crate::engine::session::ExecutionSnapshot;
use crate::types::ApiResult;

/// GET /api/swaps - All executions, oldest first
pub async fn list_executions(State(state): State<AppState>) -> Json<Vec<ExecutionSnapshot>> {
    Json(state.manager.list().await)
}

/// GET /api/swap/:id - Current state of an execution
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExecutionSnapshot>> {
    let execution = state.manager.get(&id).await?;
    Ok(Json(execution.snapshot()))
}

/// POST /api/swap/:id/reset - Back to idle; an in-flight step's result is dropped
pub async fn reset_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExecutionSnapshot>> {
    Ok(Json(state.manager.reset(&id).await?))
}

/// POST /api/swap/:id/retry - Reset and run the stored request again;
/// 409 while a step is in flight
pub async fn retry_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExecutionSnapshot>> {
    Ok(Json(state.manager.retry(&id).await?))
}
