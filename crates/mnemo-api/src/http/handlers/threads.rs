//! Thread and turn handlers: listing, respond, record, history.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use mnemo_core::conversation::engine::{RecordedTurn, Reply};
use mnemo_types::turn::{ConversationTurn, ThreadStats, TurnRole};

use super::thread_id;
use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Upper bound for `limit` on turn listings.
const MAX_TURN_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordTurnRequest {
    pub content: String,
    #[serde(default)]
    pub role: Option<TurnRole>,
}

#[derive(Debug, Deserialize)]
pub struct TurnListQuery {
    /// Include turns folded into the summary.
    #[serde(default)]
    pub all: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/v1/threads - List threads with turn counts.
pub async fn list_threads(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ThreadStats>>>, AppError> {
    let timer = RequestTimer::start();
    let threads = state.memory().threads().await?;
    Ok(Json(timer.finish(threads).with_link("self", "/api/v1/threads")))
}

/// POST /api/v1/threads/{id}/respond - Generate a reply.
///
/// Returns as soon as the reply is recorded; maintenance runs afterwards.
pub async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> Result<Json<ApiResponse<Reply>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;

    let reply = state.engine.respond(&thread, &body.message).await?;

    Ok(Json(
        timer
            .finish(reply)
            .with_link("turns", &format!("/api/v1/threads/{thread}/turns"))
            .with_link("profile", &format!("/api/v1/threads/{thread}/profile")),
    ))
}

/// POST /api/v1/threads/{id}/turns - Record a turn without a reply.
pub async fn record_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RecordTurnRequest>,
) -> Result<Json<ApiResponse<RecordedTurn>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;
    let role = body.role.unwrap_or(TurnRole::User);

    let recorded = state.engine.record(&thread, role, &body.content).await?;

    Ok(Json(timer.finish(recorded)))
}

/// GET /api/v1/threads/{id}/turns - Turn history, oldest first.
pub async fn list_turns(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TurnListQuery>,
) -> Result<Json<ApiResponse<Vec<ConversationTurn>>>, AppError> {
    let timer = RequestTimer::start();
    let thread = thread_id(id)?;
    if query.limit == 0 || query.limit > MAX_TURN_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_TURN_LIMIT}"
        )));
    }

    let turns = state.memory().history(&thread, query.all, query.limit).await?;

    Ok(Json(
        timer
            .finish(turns)
            .with_link("self", &format!("/api/v1/threads/{thread}/turns")),
    ))
}
