//! Required-field checks and conversion into typed records.

use serde_json::{Map, Value};

use crate::domain::{ChallengeRecord, ChallengeType, ContentKind, ContentRecord, FeedbackRecord, StoryRecord};
use crate::error::PipelineError;

const STORY_REQUIRED: &[&str] = &["title", "story", "objective"];
const FEEDBACK_REQUIRED: &[&str] = &["is_correct", "feedback"];
const CHALLENGE_REQUIRED: &[&str] = &["question", "type", "answer", "hint", "explanation", "difficulty", "xp_reward"];

/// Fields that must be present for `kind`; challenges add one per type.
pub fn required_fields(kind: ContentKind, map: &Map<String, Value>) -> Vec<&'static str> {
  match kind {
    ContentKind::Story => STORY_REQUIRED.to_vec(),
    ContentKind::Feedback => FEEDBACK_REQUIRED.to_vec(),
    ContentKind::Challenge => {
      let mut fields = CHALLENGE_REQUIRED.to_vec();
      match map.get("type").and_then(Value::as_str).and_then(ChallengeType::parse_loose) {
        Some(ChallengeType::MultipleChoice) => fields.push("options"),
        Some(ChallengeType::FillInBlank) => fields.push("template"),
        None => {}
      }
      fields
    }
  }
}

pub fn validate(map: &Map<String, Value>, required: &[&str]) -> Result<(), PipelineError> {
  let missing: Vec<&str> = required.iter().copied().filter(|f| is_empty(map.get(*f))).collect();
  if missing.is_empty() {
    Ok(())
  } else {
    Err(PipelineError::schema(format!("missing or empty: {}", missing.join(", "))))
  }
}

fn is_empty(v: Option<&Value>) -> bool {
  match v {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.trim().is_empty(),
    Some(Value::Array(a)) => a.is_empty(),
    Some(_) => false,
  }
}

/// Validate and type a post-processed mapping.
pub fn into_record(kind: ContentKind, map: Map<String, Value>) -> Result<ContentRecord, PipelineError> {
  validate(&map, &required_fields(kind, &map))?;
  let value = Value::Object(map);
  let typed = match kind {
    ContentKind::Story => serde_json::from_value::<StoryRecord>(value).map(ContentRecord::Story),
    ContentKind::Challenge => serde_json::from_value::<ChallengeRecord>(value).map(ContentRecord::Challenge),
    ContentKind::Feedback => serde_json::from_value::<FeedbackRecord>(value).map(ContentRecord::Feedback),
  };
  typed.map_err(|e| PipelineError::schema(format!("{kind} record: {e}")))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn obj(v: Value) -> Map<String, Value> {
    match v {
      Value::Object(m) => m,
      _ => panic!("expected object"),
    }
  }

  #[test]
  fn blank_and_null_fields_fail() {
    let map = obj(json!({"title": "  ", "story": null, "objective": "o"}));
    let err = validate(&map, STORY_REQUIRED).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("title") && msg.contains("story"), "{msg}");
    assert!(!msg.contains("objective"), "{msg}");
  }

  #[test]
  fn challenge_requirements_follow_type() {
    let mc = obj(json!({"type": "multiple-choice"}));
    assert!(required_fields(ContentKind::Challenge, &mc).contains(&"options"));
    let fib = obj(json!({"type": "fill-in-blank"}));
    assert!(required_fields(ContentKind::Challenge, &fib).contains(&"template"));
  }

  #[test]
  fn empty_options_fail() {
    let map = obj(json!({"options": []}));
    assert!(validate(&map, &["options"]).is_err());
  }

  #[test]
  fn story_becomes_typed_record() {
    let map = obj(json!({"title": "T", "story": "S", "objective": "O"}));
    let rec = into_record(ContentKind::Story, map).expect("valid story");
    assert_eq!(rec.kind(), ContentKind::Story);
  }

  #[test]
  fn wrong_value_type_is_schema_violation() {
    let map = obj(json!({"is_correct": "yes", "feedback": "f"}));
    let err = into_record(ContentKind::Feedback, map).unwrap_err();
    assert_eq!(err.code(), "schema_violation");
  }
}
