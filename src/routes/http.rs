//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; prompt text is logged by length only.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<NewSessionIn>>,
) -> impl IntoResponse {
  let player = body.and_then(|Json(b)| b.player);
  let (session_id, view) = new_session(&state, player).await;
  info!(target: "prompt_ninja", session = %session_id, "HTTP session created");
  Json(SessionOut { session_id, state: view })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  let view = session_state(&state, &session_id).await?;
  Ok(Json(SessionOut { session_id, state: view }))
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id, text_len = body.text.len()))]
pub async fn http_post_prompt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PromptIn>,
) -> Result<Json<FeedbackOut>, ApiError> {
  let (message, view) = submit_prompt(&state, &body.session_id, &body.text).await?;
  info!(target: "prompt_ninja", session = %body.session_id, score = view.score, level = view.level, "HTTP prompt handled");
  Ok(Json(FeedbackOut { message, state: view }))
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<Json<SessionOut>, ApiError> {
  let view = reset_session(&state, &body.session_id).await?;
  Ok(Json(SessionOut { session_id: body.session_id, state: view }))
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id))]
pub async fn http_post_api_key(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ApiKeyIn>,
) -> Result<Json<ApiKeyOut>, ApiError> {
  let has_key = set_api_key(&state, &body.session_id, body.api_key).await?;
  Ok(Json(ApiKeyOut { has_key }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_leaderboard(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LeaderboardQuery>,
) -> impl IntoResponse {
  let entries = leaderboard_top(&state, q.limit).await;
  Json(LeaderboardOut { entries })
}
