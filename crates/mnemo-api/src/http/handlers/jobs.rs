//! Maintenance job listing.

use axum::extract::State;
use axum::Json;

use mnemo_types::maintenance::MaintenanceJob;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/jobs - Persisted maintenance jobs (pending, retrying, abandoned).
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MaintenanceJob>>>, AppError> {
    let timer = RequestTimer::start();
    let jobs = state.queue().persisted().await?;
    Ok(Json(timer.finish(jobs)))
}
