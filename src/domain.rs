//! Domain models: content kinds, the generation request, and the typed records
//! handed to the game client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of content a request asks for.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
  Story,
  Challenge,
  Feedback,
}

impl ContentKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ContentKind::Story => "story",
      ContentKind::Challenge => "challenge",
      ContentKind::Feedback => "feedback",
    }
  }
}

impl fmt::Display for ContentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Interaction style of a coding challenge.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChallengeType {
  #[serde(rename = "multiple-choice")]
  MultipleChoice,
  #[serde(rename = "fill-in-blank")]
  FillInBlank,
}

impl ChallengeType {
  pub const ALL: [ChallengeType; 2] = [ChallengeType::MultipleChoice, ChallengeType::FillInBlank];

  pub fn as_str(&self) -> &'static str {
    match self {
      ChallengeType::MultipleChoice => "multiple-choice",
      ChallengeType::FillInBlank => "fill-in-blank",
    }
  }

  /// Lenient parse of the spellings generators and clients actually send:
  /// `multiple choice`, `Multiple_Choice`, `fill-in-the-blank`, `fill_in_blank`...
  pub fn parse_loose(raw: &str) -> Option<Self> {
    let norm: String = raw
      .trim()
      .to_lowercase()
      .chars()
      .map(|c| if c == '_' || c.is_whitespace() { '-' } else { c })
      .collect();
    match norm.as_str() {
      "multiple-choice" | "multiplechoice" | "mcq" | "choice" => Some(ChallengeType::MultipleChoice),
      "fill-in-blank" | "fill-in-the-blank" | "fill-in-blanks" | "fill-in-the-blanks" | "fill-blank" | "blank" => {
        Some(ChallengeType::FillInBlank)
      }
      _ => None,
    }
  }
}

impl fmt::Display for ChallengeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  pub fn parse_loose(raw: &str) -> Option<Self> {
    match raw.trim().to_lowercase().as_str() {
      "easy" | "beginner" => Some(Difficulty::Easy),
      "medium" | "intermediate" => Some(Difficulty::Medium),
      "hard" | "advanced" => Some(Difficulty::Hard),
      _ => None,
    }
  }
}

/// Optional knobs a caller can pass along with a request.
/// Feedback requests use `answer`/`correct_answer`/`question`; the rest shape
/// stories and challenges.
#[derive(Clone, Debug, Default)]
pub struct RequestParams {
  pub level: Option<u8>,
  pub language: Option<String>,
  pub objective: Option<String>,
  pub story_context: Option<String>,
  pub challenge_type: Option<ChallengeType>,
  pub answer: Option<String>,
  pub correct_answer: Option<String>,
  pub question: Option<String>,
}

/// One inbound ask for content. Built per API call and never mutated.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub kind: ContentKind,
  pub params: RequestParams,
  pub token_budget: u32,
}

impl GenerationRequest {
  pub fn level(&self) -> u8 {
    self.params.level.unwrap_or(1).max(1)
  }

  pub fn language(&self) -> &str {
    self.params.language.as_deref().filter(|l| !l.trim().is_empty()).unwrap_or("python")
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoryRecord {
  pub title: String,
  pub story: String,
  pub objective: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub setting: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub character: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChallengeRecord {
  pub question: String,
  #[serde(rename = "type")]
  pub challenge_type: ChallengeType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  pub answer: String,
  pub hint: String,
  pub explanation: String,
  pub difficulty: Difficulty,
  pub xp_reward: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
  pub is_correct: bool,
  pub feedback: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_hint: Option<String>,
}

/// A finished record, serialized untagged so the client sees the plain object.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ContentRecord {
  Story(StoryRecord),
  Challenge(ChallengeRecord),
  Feedback(FeedbackRecord),
}

impl ContentRecord {
  pub fn kind(&self) -> ContentKind {
    match self {
      ContentRecord::Story(_) => ContentKind::Story,
      ContentRecord::Challenge(_) => ContentKind::Challenge,
      ContentRecord::Feedback(_) => ContentKind::Feedback,
    }
  }
}
