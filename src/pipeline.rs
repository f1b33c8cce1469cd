//! Retry orchestrator: drives generate → extract → repair → post-process →
//! validate until a record comes out or the attempt budget is spent.
//!
//! Attempts are independent and strictly sequential. Nothing learned from a
//! failed attempt is carried into the next one; the same prompt is sent again.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::{PipelineSettings, Prompts};
use crate::domain::{ContentRecord, GenerationRequest};
use crate::error::PipelineError;
use crate::extract::extract_json_region;
use crate::generator::Generator;
use crate::postprocess::{post_process, PostContext};
use crate::prompts::build_prompt;
use crate::repair::repair;
use crate::seeds::FallbackTable;
use crate::util::trunc_for_log;
use crate::validate::into_record;

/// Where a delivered record came from.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
  Generated,
  Fallback,
}

impl RecordSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      RecordSource::Generated => "generated",
      RecordSource::Fallback => "fallback",
    }
  }
}

/// Result of one pipeline run.
#[derive(Clone, Debug)]
pub struct Delivery {
  pub record: ContentRecord,
  pub source: RecordSource,
  /// Generator calls made for this request.
  pub attempts: u32,
}

/// Orchestrator states.
#[derive(Debug)]
pub enum AttemptState {
  Attempting(u32),
  Succeeded(ContentRecord),
  Exhausted(PipelineError),
}

impl AttemptState {
  /// Transition after attempt `n` finished with `outcome`.
  pub fn next(n: u32, max_attempts: u32, outcome: Result<ContentRecord, PipelineError>) -> Self {
    match outcome {
      Ok(record) => AttemptState::Succeeded(record),
      Err(e) if n >= max_attempts => AttemptState::Exhausted(e),
      Err(_) => AttemptState::Attempting(n + 1),
    }
  }
}

pub struct Pipeline {
  generator: Arc<dyn Generator>,
  settings: PipelineSettings,
  prompts: Prompts,
  fallbacks: FallbackTable,
}

impl Pipeline {
  pub fn new(
    generator: Arc<dyn Generator>,
    settings: PipelineSettings,
    prompts: Prompts,
    fallbacks: FallbackTable,
  ) -> Self {
    Self { generator, settings, prompts, fallbacks }
  }

  pub fn generator_name(&self) -> &'static str {
    self.generator.name()
  }

  /// Produce a record for `req`. Errors only when every attempt failed and
  /// the kind has no fallback.
  pub async fn run(&self, req: &GenerationRequest) -> Result<Delivery, PipelineError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
      target: "pipeline",
      "pipeline_run",
      %request_id,
      kind = %req.kind,
      level = req.level(),
      generator = self.generator.name()
    );
    self.run_attempts(req).instrument(span).await
  }

  async fn run_attempts(&self, req: &GenerationRequest) -> Result<Delivery, PipelineError> {
    let max_attempts = self.settings.max_attempts.for_kind(req.kind);
    let prompt = build_prompt(&self.prompts, req);
    debug!(target: "pipeline", prompt_len = prompt.len(), max_attempts, "Starting generation");

    let mut tried = 0;
    let mut state = AttemptState::Attempting(1);
    loop {
      match state {
        AttemptState::Attempting(n) => {
          tried = n;
          let outcome = self.attempt(n, &prompt, req).await;
          if let Err(e) = &outcome {
            warn!(target: "pipeline", attempt = n, max_attempts, code = e.code(), error = %e, "Attempt failed");
          }
          state = AttemptState::next(n, max_attempts, outcome);
        }
        AttemptState::Succeeded(record) => {
          info!(target: "pipeline", attempts = tried, "Record generated");
          return Ok(Delivery { record, source: RecordSource::Generated, attempts: tried });
        }
        AttemptState::Exhausted(last) => return self.exhausted(req, tried, last),
      }
    }
  }

  fn exhausted(&self, req: &GenerationRequest, attempts: u32, last: PipelineError) -> Result<Delivery, PipelineError> {
    match self.fallbacks.lookup(req) {
      Some(record) => {
        warn!(target: "pipeline", attempts, last_code = last.code(), "Attempts exhausted; serving fallback");
        Ok(Delivery { record, source: RecordSource::Fallback, attempts })
      }
      None => {
        error!(target: "pipeline", attempts, last_code = last.code(), "Attempts exhausted; no fallback for this kind");
        Err(PipelineError::AttemptsExhausted { kind: req.kind, attempts, last: Box::new(last) })
      }
    }
  }

  #[instrument(level = "debug", target = "pipeline", skip(self, prompt, req))]
  async fn attempt(&self, n: u32, prompt: &str, req: &GenerationRequest) -> Result<ContentRecord, PipelineError> {
    let raw = self.generator.generate(prompt, req.token_budget).await?;
    debug!(target: "pipeline", raw = %trunc_for_log(&raw, 200), "Generator output");
    process_raw(&raw, req, &self.settings)
  }
}

/// Turn one raw generator reply into a record, or report the first stage that failed.
pub fn process_raw(raw: &str, req: &GenerationRequest, settings: &PipelineSettings) -> Result<ContentRecord, PipelineError> {
  let region = extract_json_region(raw).ok_or(PipelineError::ExtractionFailure)?;
  let repaired = repair(region).ok_or(PipelineError::RepairFailure)?;
  debug!(target: "pipeline", plan = repaired.plan, "Parsed generator JSON");
  let ctx = PostContext { settings, language: req.language(), level: req.level() };
  let map = post_process(repaired.value, req.kind, &ctx)?;
  into_record(req.kind, map)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ChallengeType, ContentKind, RequestParams};
  use crate::generator::testing::ScriptedGenerator;

  fn pipeline(generator: Arc<ScriptedGenerator>) -> Pipeline {
    Pipeline::new(generator, PipelineSettings::default(), Prompts::default(), FallbackTable::default())
  }

  fn request(kind: ContentKind, params: RequestParams) -> GenerationRequest {
    let token_budget = PipelineSettings::default().token_budget.for_kind(kind);
    GenerationRequest { kind, params, token_budget }
  }

  #[test]
  fn state_transitions() {
    assert!(matches!(AttemptState::next(1, 3, Err(PipelineError::RepairFailure)), AttemptState::Attempting(2)));
    assert!(matches!(AttemptState::next(3, 3, Err(PipelineError::RepairFailure)), AttemptState::Exhausted(_)));
  }

  #[tokio::test]
  async fn chatty_story_reply_is_recovered() {
    let reply = "Here you go:\n{title: 'Level 1 Quest', story: \"Explore the cave\", objective: \"Find the key\"}\nEnjoy!";
    let generator = Arc::new(ScriptedGenerator::always(reply));
    let delivery = pipeline(generator.clone())
      .run(&request(ContentKind::Story, RequestParams::default()))
      .await
      .expect("story delivered");

    assert_eq!(delivery.source, RecordSource::Generated);
    assert_eq!(delivery.attempts, 1);
    match delivery.record {
      ContentRecord::Story(s) => {
        assert_eq!(s.title, "Level 1 Quest");
        assert_eq!(s.story, "Explore the cave");
        assert_eq!(s.objective, "Find the key");
        assert!(s.setting.is_none());
      }
      other => panic!("unexpected record {other:?}"),
    }
  }

  #[tokio::test]
  async fn garbage_generator_is_called_max_attempts_then_fallback() {
    let generator = Arc::new(ScriptedGenerator::always("I'm sorry, I can't do that."));
    let p = pipeline(generator.clone());
    let params = RequestParams { level: Some(2), challenge_type: Some(ChallengeType::FillInBlank), ..Default::default() };
    let delivery = p.run(&request(ContentKind::Challenge, params)).await.expect("fallback delivered");

    assert_eq!(generator.calls(), 5);
    assert_eq!(delivery.attempts, 5);
    assert_eq!(delivery.source, RecordSource::Fallback);
    match delivery.record {
      ContentRecord::Challenge(c) => assert_eq!(c.challenge_type, ChallengeType::FillInBlank),
      other => panic!("unexpected record {other:?}"),
    }
  }

  #[tokio::test]
  async fn feedback_exhaustion_is_an_error() {
    let generator = Arc::new(ScriptedGenerator::new(
      vec![Err(PipelineError::GenerationUnavailable("down".into()))],
      "{\"is_correct\": \"perhaps\", \"feedback\": \"?\"}",
    ));
    let params = RequestParams {
      answer: Some("print(1)".into()),
      correct_answer: Some("print(2)".into()),
      question: Some("Print two".into()),
      ..Default::default()
    };
    let err = pipeline(generator.clone()).run(&request(ContentKind::Feedback, params)).await.unwrap_err();

    assert_eq!(generator.calls(), 3);
    match err {
      PipelineError::AttemptsExhausted { kind, attempts, last } => {
        assert_eq!(kind, ContentKind::Feedback);
        assert_eq!(attempts, 3);
        assert_eq!(last.code(), "schema_violation");
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[tokio::test]
  async fn second_attempt_can_succeed() {
    let generator = Arc::new(ScriptedGenerator::new(
      vec![Ok("no braces here".into())],
      r#"{"question": "What prints?", "type": "multiple-choice", "options": ["1", "2", "3", "4"],
          "code": "print(1 + 1)", "answer": "2", "hint": "Add", "explanation": "1 + 1 is 2"}"#,
    ));
    let delivery = pipeline(generator.clone())
      .run(&request(ContentKind::Challenge, RequestParams::default()))
      .await
      .expect("delivered");

    assert_eq!(generator.calls(), 2);
    assert_eq!(delivery.attempts, 2);
    assert_eq!(delivery.source, RecordSource::Generated);
    let prompts = generator.prompts();
    assert_eq!(prompts[0], prompts[1]);
  }

  #[test]
  fn process_raw_reports_the_failing_stage() {
    let settings = PipelineSettings::default();
    let req = request(ContentKind::Story, RequestParams::default());
    assert_eq!(process_raw("nothing", &req, &settings).unwrap_err().code(), "extraction_failure");
    assert_eq!(process_raw("{not json at all}", &req, &settings).unwrap_err().code(), "repair_failure");
    assert_eq!(process_raw(r#"{"title": "T"}"#, &req, &settings).unwrap_err().code(), "schema_violation");
  }
}
