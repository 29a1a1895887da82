//! LLM grader: asks a chat-completions model whether a prompt meets the
//! scenario's criteria and reads back "PASS" or "FAIL: reason".
//!
//! Calls are instrumented and log model names, latencies and response sizes,
//! never prompt contents.
//!
//! NOTE: We never log the API key. The key is per session and travels with
//! each call; the client itself holds none.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::Prompts;
use crate::error::EvaluationError;
use crate::util::{fill_template, trunc_for_log};

/// What the grader decided about one prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradeVerdict {
  pub success: bool,
  pub feedback: String,
}

#[async_trait]
pub trait Grader: Send + Sync {
  async fn grade(&self, prompt: &str, criteria: &str, api_key: &str) -> Result<GradeVerdict, EvaluationError>;
}

/// Grader plus the per-session inputs it needs.
#[derive(Clone)]
pub struct GradingContext {
  pub grader: Arc<dyn Grader>,
  pub credential: Option<String>,
  pub timeout: Duration,
}

impl GradingContext {
  /// Bounded call: missing key and elapsed timeout both surface as errors.
  pub async fn grade(&self, prompt: &str, criteria: &str) -> Result<GradeVerdict, EvaluationError> {
    let key = self
      .credential
      .as_deref()
      .filter(|k| !k.trim().is_empty())
      .ok_or(EvaluationError::MissingCredential)?;
    match tokio::time::timeout(self.timeout, self.grader.grade(prompt, criteria, key)).await {
      Ok(result) => result,
      Err(_) => Err(EvaluationError::Timeout(self.timeout)),
    }
  }
}

#[derive(Clone)]
pub struct OpenAiGrader {
  client: reqwest::Client,
  base_url: String,
  model: String,
  prompts: Prompts,
}

impl OpenAiGrader {
  pub fn new(
    base_url: impl Into<String>,
    model: impl Into<String>,
    prompts: Prompts,
    timeout: Duration,
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into(), model: model.into(), prompts })
  }

  /// Endpoint and model from OPENAI_BASE_URL / OPENAI_MODEL. The key is not read here.
  pub fn from_env(prompts: Prompts, timeout: Duration) -> Option<Self> {
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    match Self::new(base_url, model, prompts, timeout) {
      Ok(g) => Some(g),
      Err(e) => {
        warn!(target: "grader", error = %e, "Failed to build HTTP client; LLM grading disabled");
        None
      }
    }
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, api_key, system, user), fields(model = %self.model))]
  async fn chat_plain(
    &self,
    api_key: &str,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<String, EvaluationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      max_tokens: Some(max_tokens),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "prompt-ninja-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", api_key))
      .json(&req).send().await.map_err(|e| EvaluationError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(EvaluationError::Http { status: status.as_u16(), message });
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| EvaluationError::MalformedResponse(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(target: "grader", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    body.choices.first()
      .and_then(|c| c.message.content.as_deref())
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
      .ok_or_else(|| EvaluationError::MalformedResponse("empty completion".into()))
  }
}

#[async_trait]
impl Grader for OpenAiGrader {
  #[instrument(level = "info", skip_all, fields(prompt_len = prompt.len(), criteria_len = criteria.len()))]
  async fn grade(&self, prompt: &str, criteria: &str, api_key: &str) -> Result<GradeVerdict, EvaluationError> {
    let user = fill_template(&self.prompts.grader_user_template, &[("criteria", criteria), ("prompt", prompt)]);
    let start = Instant::now();
    let reply = self.chat_plain(api_key, &self.prompts.grader_system, &user, 0.1, 50).await;
    let elapsed = start.elapsed();
    match &reply {
      Ok(text) => info!(target: "grader", ?elapsed, reply_len = text.len(), "Grader reply received"),
      Err(e) => warn!(target: "grader", ?elapsed, error = %e, "Grader call failed"),
    }
    parse_verdict(&reply?)
  }
}

/// "PASS" or "FAIL: reason", case-insensitive. Anything else is unclear.
pub fn parse_verdict(reply: &str) -> Result<GradeVerdict, EvaluationError> {
  let text = reply.trim();
  if text.trim_end_matches('.').eq_ignore_ascii_case("pass") {
    return Ok(GradeVerdict { success: true, feedback: "LLM evaluation passed.".into() });
  }
  if text.get(..4).is_some_and(|head| head.eq_ignore_ascii_case("fail")) {
    let reason = text[4..].trim_start_matches(':').trim();
    let reason = if reason.is_empty() { "Criteria not met." } else { reason };
    return Ok(GradeVerdict { success: false, feedback: format!("LLM Evaluation: {reason}") });
  }
  Err(EvaluationError::MalformedResponse(trunc_for_log(text, 60)))
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
