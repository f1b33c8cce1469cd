//! Loading application configuration (prompts, pipeline tuning, generator
//! command, extra fallback records) from TOML.
//!
//! Every section has defaults, so an empty file, or no file at all, yields a
//! working setup. The loaded value is immutable and shared behind `Arc`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::{ContentKind, Difficulty};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config TOML: {0}")]
  Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub pipeline: PipelineSettings,
  #[serde(default)]
  pub generator: GeneratorSettings,
  #[serde(default)]
  pub fallbacks: FallbackCfg,
}

impl AppConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str::<AppConfig>(s)?)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_toml_str(&raw)
  }

  /// Env overrides that win over the file: GENERATOR_COMMAND, GENERATOR_TIMEOUT_SECS.
  fn apply_env_overrides(&mut self) {
    if let Ok(cmd) = std::env::var("GENERATOR_COMMAND") {
      let mut parts = cmd.split_whitespace().map(str::to_string);
      if let Some(program) = parts.next() {
        self.generator.command = program;
        self.generator.args = parts.collect();
      }
    }
    if let Ok(raw) = std::env::var("GENERATOR_TIMEOUT_SECS") {
      match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => self.generator.timeout_secs = secs,
        _ => warn!(target: "codequest_backend", %raw, "Ignoring invalid GENERATOR_TIMEOUT_SECS"),
      }
    }
  }
}

/// Load `AppConfig` from CODEQUEST_CONFIG_PATH, falling back to defaults on
/// a missing variable or any IO/parse error.
pub fn load_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("CODEQUEST_CONFIG_PATH") {
    Ok(path) => match AppConfig::from_path(&path) {
      Ok(cfg) => {
        info!(target: "codequest_backend", %path, "Loaded config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "codequest_backend", %path, error = %e, "Config unusable; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  cfg.apply_env_overrides();
  cfg
}

/// Knobs of the recovery pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
  pub max_attempts: AttemptBudget,
  pub token_budget: TokenBudget,
  pub caps: FieldCaps,
  pub levels: Vec<LevelDefaults>,
  pub xp_range: XpRange,
  /// Filler used when a multiple-choice question comes back with fewer than four options.
  pub placeholder_options: Vec<String>,
}

impl Default for PipelineSettings {
  fn default() -> Self {
    Self {
      max_attempts: AttemptBudget::default(),
      token_budget: TokenBudget::default(),
      caps: FieldCaps::default(),
      levels: vec![
        LevelDefaults { level: 1, difficulty: Difficulty::Easy, xp_reward: 10 },
        LevelDefaults { level: 2, difficulty: Difficulty::Medium, xp_reward: 20 },
        LevelDefaults { level: 3, difficulty: Difficulty::Hard, xp_reward: 30 },
      ],
      xp_range: XpRange::default(),
      placeholder_options: vec![
        "None of the above".into(),
        "All of the above".into(),
        "It raises an error".into(),
        "It depends on the input".into(),
      ],
    }
  }
}

impl PipelineSettings {
  /// Defaults for `level`: the highest table entry not above it, else the lowest entry.
  pub fn level_defaults(&self, level: u8) -> LevelDefaults {
    let best_below = self.levels.iter().filter(|l| l.level <= level).max_by_key(|l| l.level);
    best_below
      .or_else(|| self.levels.iter().min_by_key(|l| l.level))
      .copied()
      .unwrap_or(LevelDefaults { level: 1, difficulty: Difficulty::Easy, xp_reward: 10 })
  }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AttemptBudget {
  pub story: u32,
  pub challenge: u32,
  pub feedback: u32,
}

impl Default for AttemptBudget {
  fn default() -> Self {
    Self { story: 3, challenge: 5, feedback: 3 }
  }
}

impl AttemptBudget {
  /// Never below one attempt.
  pub fn for_kind(&self, kind: ContentKind) -> u32 {
    let n = match kind {
      ContentKind::Story => self.story,
      ContentKind::Challenge => self.challenge,
      ContentKind::Feedback => self.feedback,
    };
    n.max(1)
  }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TokenBudget {
  pub story: u32,
  pub challenge: u32,
  pub feedback: u32,
}

impl Default for TokenBudget {
  fn default() -> Self {
    Self { story: 300, challenge: 400, feedback: 200 }
  }
}

impl TokenBudget {
  pub fn for_kind(&self, kind: ContentKind) -> u32 {
    match kind {
      ContentKind::Story => self.story,
      ContentKind::Challenge => self.challenge,
      ContentKind::Feedback => self.feedback,
    }
  }
}

/// Character caps per field. For challenges the `options` entry caps each option.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FieldCaps {
  pub story: BTreeMap<String, usize>,
  pub challenge: BTreeMap<String, usize>,
  pub feedback: BTreeMap<String, usize>,
}

impl Default for FieldCaps {
  fn default() -> Self {
    fn caps(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
      pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
    Self {
      story: caps(&[("title", 100), ("story", 800), ("setting", 250), ("character", 250), ("objective", 250)]),
      challenge: caps(&[
        ("question", 500),
        ("answer", 800),
        ("hint", 250),
        ("explanation", 500),
        ("template", 800),
        ("code", 800),
        ("options", 200),
      ]),
      feedback: caps(&[("feedback", 500), ("next_hint", 250)]),
    }
  }
}

impl FieldCaps {
  pub fn for_kind(&self, kind: ContentKind) -> &BTreeMap<String, usize> {
    match kind {
      ContentKind::Story => &self.story,
      ContentKind::Challenge => &self.challenge,
      ContentKind::Feedback => &self.feedback,
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct LevelDefaults {
  pub level: u8,
  pub difficulty: Difficulty,
  pub xp_reward: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct XpRange {
  pub min: u32,
  pub max: u32,
}

impl Default for XpRange {
  fn default() -> Self {
    Self { min: 10, max: 50 }
  }
}

impl XpRange {
  pub fn clamp(&self, xp: u32) -> u32 {
    xp.clamp(self.min, self.max.max(self.min))
  }
}

/// External generator process. The prompt is appended as the last argument.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
  pub command: String,
  pub args: Vec<String>,
  pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
  fn default() -> Self {
    Self {
      command: "q".into(),
      args: vec!["chat".into(), "--no-interactive".into()],
      timeout_secs: 30,
    }
  }
}

/// Extra fallback records supplied by configuration. They go through the same
/// post-processing and validation as generated content before being accepted.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct FallbackCfg {
  #[serde(default)]
  pub stories: Vec<FallbackEntryCfg>,
  #[serde(default)]
  pub challenges: Vec<FallbackEntryCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FallbackEntryCfg {
  pub level: u8,
  #[serde(default)]
  pub language: Option<String>,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

/// Prompt templates. Placeholders: `{level}`, `{language}`, `{type_value}`,
/// `{type_clause}`, `{context_clause}`, `{question}`, `{correct_answer}`,
/// `{answer}`, `{max_tokens}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub story_template: String,
  pub challenge_template: String,
  pub feedback_template: String,
  pub length_limit_suffix: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "You write content for the coding adventure game \"Code Quest Adventure\". Reply with a single JSON object and nothing else.".into(),
      story_template: r#"Generate a short adventure story introduction for a coding game called "Code Quest Adventure" for level {level}.
The story should be exciting and set up a scenario where the player needs to solve coding challenges.{context_clause}
Format the response as JSON with the following structure:
{
    "title": "Level {level} title",
    "story": "Story text here (keep under 70 words)",
    "setting": "Brief description of the setting (under 30 words)",
    "character": "Brief description of the character or enemy (under 30 words)",
    "objective": "What the player needs to accomplish (under 30 words)"
}"#
        .into(),
      challenge_template: r#"Generate a coding challenge for level {level} in {language} for a game called "Code Quest Adventure".
Make it appropriate for beginners but challenging.{context_clause}{type_clause}
Keep code out of the question text; put it in "template" or "code".
Format the response as JSON with the following structure:
{
    "question": "The question text (keep under 100 words)",
    "type": "{type_value}",
    "options": ["Option 1", "Option 2", "Option 3", "Option 4"] (for multiple-choice only),
    "template": "Code template with _____ for each blank, at least two blanks" (for fill-in-blank only),
    "code": "Code the question refers to" (optional, for multiple-choice),
    "answer": "The correct answer; for fill-in-blank one value per blank, comma-separated",
    "hint": "A helpful hint (under 50 words)",
    "explanation": "Explanation of the solution (under 100 words)",
    "difficulty": "easy/medium/hard",
    "xp_reward": number between 10-50
}"#
        .into(),
      feedback_template: r#"Evaluate this answer for a coding game:
Question: {question}
Correct answer: {correct_answer}
User answer: {answer}

Format the response as JSON with the following structure:
{
    "is_correct": true/false,
    "feedback": "Detailed feedback on the answer (under 100 words)",
    "next_hint": "A hint if they got it wrong (under 50 words)"
}"#
        .into(),
      length_limit_suffix: "\n\nIMPORTANT: Keep your response concise and under {max_tokens} tokens. Focus on essential information only.".into(),
    }
  }
}
