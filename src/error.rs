//! Error taxonomy of the content pipeline.
//!
//! Every stage reports into `PipelineError`; the orchestrator turns all of them
//! into a retry decision. Only `AttemptsExhausted` ever reaches a caller, and
//! only for content kinds without a fallback record.

use thiserror::Error;

use crate::domain::ContentKind;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("generator unavailable: {0}")]
  GenerationUnavailable(String),

  #[error("no JSON object region in generator output")]
  ExtractionFailure,

  #[error("no repair strategy produced parseable JSON")]
  RepairFailure,

  #[error("schema violation: {0}")]
  SchemaViolation(String),

  #[error("{kind}: all {attempts} attempts failed (last: {last})")]
  AttemptsExhausted {
    kind: ContentKind,
    attempts: u32,
    last: Box<PipelineError>,
  },
}

impl PipelineError {
  pub fn schema(msg: impl Into<String>) -> Self {
    PipelineError::SchemaViolation(msg.into())
  }

  /// Stable tag for logs and API error bodies.
  pub fn code(&self) -> &'static str {
    match self {
      PipelineError::GenerationUnavailable(_) => "generation_unavailable",
      PipelineError::ExtractionFailure => "extraction_failure",
      PipelineError::RepairFailure => "repair_failure",
      PipelineError::SchemaViolation(_) => "schema_violation",
      PipelineError::AttemptsExhausted { .. } => "attempts_exhausted",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exhausted_message_names_last_failure() {
    let e = PipelineError::AttemptsExhausted {
      kind: ContentKind::Feedback,
      attempts: 3,
      last: Box::new(PipelineError::RepairFailure),
    };
    assert_eq!(e.code(), "attempts_exhausted");
    let msg = e.to_string();
    assert!(msg.contains("feedback"), "{msg}");
    assert!(msg.contains("no repair strategy"), "{msg}");
  }
}
