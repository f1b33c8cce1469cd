//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::{IntoResponse, Response}};
use tracing::{instrument, warn};

use crate::domain::{ContentKind, ContentRecord};
use crate::error::PipelineError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

/// A pipeline failure rendered as `500 {error, code}`.
#[derive(Debug)]
pub struct ApiError {
  kind: ContentKind,
  source: PipelineError,
}

impl ApiError {
  fn new(kind: ContentKind, source: PipelineError) -> Self {
    Self { kind, source }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let error = match self.kind {
      ContentKind::Story => "Failed to generate story content",
      ContentKind::Challenge => "Failed to generate challenge content",
      ContentKind::Feedback => "Failed to generate feedback",
    };
    warn!(target: "codequest_backend", kind = %self.kind, code = self.source.code(), "Responding with error");
    let body = ErrorOut { error: error.to_string(), code: self.source.code() };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { status: "ok", message: "Code Quest Adventure backend is running" })
}

#[instrument(level = "info", skip(state), fields(level = ?q.level))]
pub async fn http_get_story(
  State(state): State<Arc<AppState>>,
  Query(q): Query<StoryQuery>,
) -> Result<Json<ContentRecord>, ApiError> {
  let record = serve_story(&state, q.into_params()).await.map_err(|e| ApiError::new(ContentKind::Story, e))?;
  Ok(Json(record))
}

#[instrument(level = "info", skip(state), fields(level = ?q.level, language = ?q.language, challenge_type = ?q.challenge_type))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ChallengeQuery>,
) -> Result<Json<ContentRecord>, ApiError> {
  let record = serve_challenge(&state, q.into_params())
    .await
    .map_err(|e| ApiError::new(ContentKind::Challenge, e))?;
  Ok(Json(record))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len(), question_len = body.question.len()))]
pub async fn http_post_feedback(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FeedbackIn>,
) -> Result<Json<ContentRecord>, ApiError> {
  let record = evaluate_feedback(&state, body.into_params())
    .await
    .map_err(|e| ApiError::new(ContentKind::Feedback, e))?;
  Ok(Json(record))
}
