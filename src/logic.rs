//! Core behaviors behind the HTTP handlers: turn request parameters into a
//! `GenerationRequest`, run the pipeline, and log where the record came from.

use tracing::{error, info, instrument};

use crate::domain::{ContentKind, ContentRecord, GenerationRequest, RequestParams};
use crate::error::PipelineError;
use crate::pipeline::Delivery;
use crate::state::AppState;

fn request_for(state: &AppState, kind: ContentKind, params: RequestParams) -> GenerationRequest {
  let token_budget = state.config.pipeline.token_budget.for_kind(kind);
  GenerationRequest { kind, params, token_budget }
}

fn log_delivery(delivery: &Delivery) {
  info!(
    target: "codequest_backend",
    kind = %delivery.record.kind(),
    source = delivery.source.as_str(),
    attempts = delivery.attempts,
    "Content delivered"
  );
}

/// Stories always resolve: generated, or a fallback.
#[instrument(level = "info", skip(state, params), fields(level = ?params.level))]
pub async fn serve_story(state: &AppState, params: RequestParams) -> Result<ContentRecord, PipelineError> {
  let req = request_for(state, ContentKind::Story, params);
  let delivery = state.pipeline.run(&req).await?;
  log_delivery(&delivery);
  Ok(delivery.record)
}

#[instrument(level = "info", skip(state, params), fields(level = ?params.level, language = ?params.language, challenge_type = ?params.challenge_type))]
pub async fn serve_challenge(state: &AppState, params: RequestParams) -> Result<ContentRecord, PipelineError> {
  let req = request_for(state, ContentKind::Challenge, params);
  let delivery = state.pipeline.run(&req).await?;
  log_delivery(&delivery);
  Ok(delivery.record)
}

/// Feedback has no fallback; exhaustion is returned to the caller.
#[instrument(level = "info", skip(state, params), fields(answer_len = params.answer.as_deref().map_or(0, str::len)))]
pub async fn evaluate_feedback(state: &AppState, params: RequestParams) -> Result<ContentRecord, PipelineError> {
  let req = request_for(state, ContentKind::Feedback, params);
  match state.pipeline.run(&req).await {
    Ok(delivery) => {
      log_delivery(&delivery);
      Ok(delivery.record)
    }
    Err(e) => {
      error!(target: "codequest_backend", code = e.code(), error = %e, "Feedback generation failed");
      Err(e)
    }
  }
}
