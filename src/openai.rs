//! OpenAI chat-completions backend for the `Generator` trait.
//!
//! Only plain-text completions are requested: the reply goes through the same
//! extraction and repair chain as the CLI generator, so no JSON mode is used.
//! Calls log model name, latency and token usage (never contents or the key).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::PipelineError;
use crate::generator::Generator;

#[derive(Clone)]
pub struct OpenAiGenerator {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub system: String,
  pub temperature: f32,
}

impl OpenAiGenerator {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(system: &str, timeout: Duration) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let temperature = std::env::var("OPENAI_TEMPERATURE")
      .ok()
      .and_then(|t| t.parse::<f32>().ok())
      .unwrap_or(0.7);

    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;

    Some(Self { client, api_key, base_url, model, system: system.to_string(), temperature })
  }

  async fn chat_plain(&self, user: &str, max_tokens: u32) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: self.system.clone() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      max_tokens: Some(max_tokens),
    };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "codequest-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(target: "generator", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();

    Ok(text)
  }
}

#[async_trait]
impl Generator for OpenAiGenerator {
  #[instrument(level = "info", target = "generator", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, PipelineError> {
    let start = Instant::now();
    let result = self.chat_plain(prompt, max_tokens).await;
    let elapsed = start.elapsed();
    match result {
      Ok(text) => {
        info!(target: "generator", ?elapsed, bytes = text.len(), "Model response received");
        Ok(text)
      }
      Err(e) => {
        error!(target: "generator", ?elapsed, error = %e, "Model call failed");
        Err(PipelineError::GenerationUnavailable(e))
      }
    }
  }

  fn name(&self) -> &'static str {
    "openai"
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_body_message_is_extracted() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn request_carries_token_cap() {
    let req = ChatCompletionRequest {
      model: "m".into(),
      messages: vec![ChatMessageReq { role: "user".into(), content: "hi".into() }],
      temperature: 0.7,
      max_tokens: Some(300),
    };
    let v = serde_json::to_value(&req).expect("serialize");
    assert_eq!(v["max_tokens"], 300);
    assert_eq!(v["messages"][0]["role"], "user");
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_unavailable() {
    let g = OpenAiGenerator {
      client: reqwest::Client::builder().timeout(Duration::from_secs(2)).build().expect("client"),
      api_key: "test".into(),
      base_url: "http://127.0.0.1:9".into(),
      model: "m".into(),
      system: "s".into(),
      temperature: 0.0,
    };
    let err = g.generate("hello", 10).await.unwrap_err();
    assert_eq!(err.code(), "generation_unavailable");
  }
}
