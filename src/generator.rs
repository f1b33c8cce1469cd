//! Text generators: the seam between the pipeline and whatever model backend
//! produces raw text.
//!
//! A generator is single-shot. It returns whatever text it got, and any
//! failure (spawn error, timeout, non-zero exit, HTTP error) is reported as
//! `GenerationUnavailable` so the orchestrator can count it as one attempt.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, instrument, warn};

use crate::config::GeneratorSettings;
use crate::error::PipelineError;
use crate::util::{trunc_for_log, ELLIPSIS};

#[async_trait]
pub trait Generator: Send + Sync {
  async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError>;

  /// Short label for logs.
  fn name(&self) -> &'static str;
}

/// Runs an external command with the prompt as its last argument and takes
/// its stdout as the reply.
#[derive(Clone, Debug)]
pub struct CliGenerator {
  pub command: String,
  pub args: Vec<String>,
  pub timeout: Duration,
}

impl CliGenerator {
  pub fn from_settings(settings: &GeneratorSettings) -> Self {
    Self {
      command: settings.command.clone(),
      args: settings.args.clone(),
      timeout: Duration::from_secs(settings.timeout_secs.max(1)),
    }
  }
}

#[async_trait]
impl Generator for CliGenerator {
  #[instrument(level = "info", target = "generator", skip(self, prompt),
               fields(command = %self.command, prompt_len = prompt.len()))]
  async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError> {
    let mut cmd = Command::new(&self.command);
    cmd
      .args(&self.args)
      .arg(prompt)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let start = Instant::now();
    let child = cmd.spawn().map_err(|e| {
      error!(target: "generator", error = %e, "Failed to spawn generator command");
      PipelineError::GenerationUnavailable(format!("spawn {}: {e}", self.command))
    })?;

    // Dropping the future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
      Ok(Ok(output)) => output,
      Ok(Err(e)) => {
        error!(target: "generator", error = %e, "Generator process IO failed");
        return Err(PipelineError::GenerationUnavailable(format!("io: {e}")));
      }
      Err(_) => {
        warn!(target: "generator", timeout = ?self.timeout, "Generator timed out");
        return Err(PipelineError::GenerationUnavailable(format!(
          "timed out after {}s",
          self.timeout.as_secs_f32()
        )));
      }
    };
    let elapsed = start.elapsed();

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      warn!(target: "generator", status = %output.status, ?elapsed, stderr = %trunc_for_log(&stderr, 200), "Generator exited with failure");
      return Err(PipelineError::GenerationUnavailable(format!("exit {}: {stderr}", output.status)));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(target: "generator", ?elapsed, bytes = text.len(), preview = %trunc_for_log(&text, 120), "Generator replied");
    Ok(limit_words(&text, max_tokens))
  }

  fn name(&self) -> &'static str {
    "cli"
  }
}

/// Word-level guard against runaway output: text with more than
/// `1.5 * max_tokens` words is cut to `max_tokens` words plus an ellipsis.
pub fn limit_words(text: &str, max_tokens: u32) -> String {
  let words: Vec<&str> = text.split_whitespace().collect();
  let limit = max_tokens as usize;
  if (words.len() as f64) <= limit as f64 * 1.5 {
    return text.to_string();
  }
  debug!(target: "generator", words = words.len(), limit, "Truncating oversized generator output");
  format!("{}{ELLIPSIS}", words[..limit].join(" "))
}

#[cfg(test)]
pub mod testing {
  //! In-memory generator replaying canned replies.

  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, PipelineError>>>,
    fallback: String,
    calls: Mutex<Vec<String>>,
  }

  impl ScriptedGenerator {
    /// Replays `replies` in order, then answers `fallback` forever.
    pub fn new(replies: Vec<Result<String, PipelineError>>, fallback: &str) -> Self {
      Self { replies: Mutex::new(replies.into()), fallback: fallback.to_string(), calls: Mutex::new(Vec::new()) }
    }

    pub fn always(reply: &str) -> Self {
      Self::new(Vec::new(), reply)
    }

    pub fn calls(&self) -> usize {
      self.calls.lock().expect("calls lock").len()
    }

    pub fn prompts(&self) -> Vec<String> {
      self.calls.lock().expect("calls lock").clone()
    }
  }

  #[async_trait]
  impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String, PipelineError> {
      self.calls.lock().expect("calls lock").push(prompt.to_string());
      let next = self.replies.lock().expect("replies lock").pop_front();
      next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn name(&self) -> &'static str {
      "scripted"
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn limit_words_only_cuts_runaway_output() {
    let short = "one two three";
    assert_eq!(limit_words(short, 2), short);

    let long = vec!["w"; 40].join(" ");
    let cut = limit_words(&long, 10);
    assert_eq!(cut, format!("{}...", vec!["w"; 10].join(" ")));
  }

  #[cfg(unix)]
  fn cli(command: &str, args: &[&str], timeout: Duration) -> CliGenerator {
    CliGenerator { command: command.into(), args: args.iter().map(|s| s.to_string()).collect(), timeout }
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn cli_generator_returns_stdout() {
    let g = cli("echo", &[], Duration::from_secs(5));
    let out = g.generate("{\"a\": 1}", 100).await.expect("echo works");
    assert_eq!(out, "{\"a\": 1}");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn cli_generator_reports_non_zero_exit() {
    let g = cli("false", &[], Duration::from_secs(5));
    let err = g.generate("ignored", 100).await.unwrap_err();
    assert_eq!(err.code(), "generation_unavailable");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn cli_generator_times_out() {
    let g = cli("sh", &["-c", "sleep 5", "--"], Duration::from_millis(100));
    let started = Instant::now();
    let err = g.generate("ignored", 100).await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(started.elapsed() < Duration::from_secs(4));
  }

  #[tokio::test]
  async fn missing_command_is_unavailable() {
    let g = CliGenerator {
      command: "definitely-not-a-real-generator-binary".into(),
      args: Vec::new(),
      timeout: Duration::from_secs(1),
    };
    let err = g.generate("x", 10).await.unwrap_err();
    assert!(matches!(err, PipelineError::GenerationUnavailable(_)));
  }
}
