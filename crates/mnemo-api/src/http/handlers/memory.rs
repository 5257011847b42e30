//! Memory handlers: similarity search, profile and summary.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use mnemo_types::profile::UserProfile;
use mnemo_types::summary::ConversationSummary;
use mnemo_types::turn::SimilarityResult;

use super::thread_id;
use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Upper bound for `k`.
const MAX_K: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Defaults to the configured recall limit.
    #[serde(default)]
    pub k: Option<usize>,
}

/// POST /api/v1/threads/{id}/search - Similar turns in one thread.
pub async fn search(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<ApiResponse<Vec<SimilarityResult>>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;
    let k = body.k.unwrap_or(state.config.memory.recall_limit);
    if k > MAX_K {
        return Err(AppError::Validation(format!("k must be at most {MAX_K}")));
    }
    if body.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".to_string()));
    }

    let results = state.memory().search_text(&thread, &body.query, k).await?;

    Ok(Json(timer.finish(results)))
}

/// GET /api/v1/threads/{id}/profile - Extracted user profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;
    let profile = state.memory().profile(&thread).await?;
    Ok(Json(timer.finish(profile)))
}

/// GET /api/v1/threads/{id}/summary - Running summary (`data: null` if none).
pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Option<ConversationSummary>>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;
    let summary = state.memory().summary(&thread).await?;
    Ok(Json(timer.finish(summary)))
}
