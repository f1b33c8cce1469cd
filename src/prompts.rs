//! Building generator prompts from the configured templates.

use crate::config::Prompts;
use crate::domain::{ContentKind, GenerationRequest};
use crate::util::{clamp_chars, fill_template};

/// Caps applied to user-supplied feedback inputs before they reach a prompt.
const FEEDBACK_ANSWER_CAP: usize = 1000;
const FEEDBACK_QUESTION_CAP: usize = 500;

pub fn build_prompt(prompts: &Prompts, req: &GenerationRequest) -> String {
  let level = req.level().to_string();
  let params = &req.params;

  let body = match req.kind {
    ContentKind::Story => fill_template(
      &prompts.story_template,
      &[("level", &level), ("context_clause", &context_clause(req))],
    ),
    ContentKind::Challenge => {
      let (type_value, type_clause) = match params.challenge_type {
        Some(t) => (t.as_str().to_string(), format!("\nThe challenge type must be \"{}\".", t.as_str())),
        None => ("fill-in-blank OR multiple-choice".to_string(), String::new()),
      };
      fill_template(
        &prompts.challenge_template,
        &[
          ("level", &level),
          ("language", req.language()),
          ("type_value", &type_value),
          ("type_clause", &type_clause),
          ("context_clause", &context_clause(req)),
        ],
      )
    }
    ContentKind::Feedback => {
      let answer = clamp_chars(params.answer.as_deref().unwrap_or_default().trim(), FEEDBACK_ANSWER_CAP);
      let correct = clamp_chars(params.correct_answer.as_deref().unwrap_or_default().trim(), FEEDBACK_ANSWER_CAP);
      let question = clamp_chars(params.question.as_deref().unwrap_or_default().trim(), FEEDBACK_QUESTION_CAP);
      fill_template(
        &prompts.feedback_template,
        &[("question", &question), ("correct_answer", &correct), ("answer", &answer)],
      )
    }
  };

  let suffix = fill_template(&prompts.length_limit_suffix, &[("max_tokens", &req.token_budget.to_string())]);
  format!("{body}{suffix}")
}

fn context_clause(req: &GenerationRequest) -> String {
  let mut clause = String::new();
  if let Some(objective) = req.params.objective.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    clause.push_str(&format!("\nThe player's current objective: {objective}"));
  }
  if let Some(story) = req.params.story_context.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    clause.push_str(&format!("\nStory so far: {story}"));
  }
  clause
}
