//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Prompt handling with a grader takes the session lock twice: once to take
//! the submission out of the engine and once to apply the result. Grading
//! runs in between with no lock held, on its own task, so a dropped request
//! still clears the pending submission.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::engine::EngineView;
use crate::error::ApiError;
use crate::leaderboard::{LeaderboardEntry, PlayerIdentity};
use crate::state::{AppState, SharedEngine};

async fn session_or_404(state: &AppState, session_id: &str) -> Result<SharedEngine, ApiError> {
  state.session(session_id).await.ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))
}

pub async fn new_session(state: &AppState, player: Option<PlayerIdentity>) -> (String, EngineView) {
  let (id, engine) = state.create_session(player).await;
  let view = engine.lock().await.render();
  (id, view)
}

#[instrument(level = "info", skip(state, text), fields(%session_id, text_len = text.len()))]
pub async fn submit_prompt(state: &AppState, session_id: &str, text: &str) -> Result<(String, EngineView), ApiError> {
  let engine = session_or_404(state, session_id).await?;

  let pending = {
    let mut e = engine.lock().await;
    if !e.has_grader() {
      // Heuristic-only evaluation never suspends, so one lock covers it.
      let message = e.handle_prompt(text).await;
      return Ok((message, e.render()));
    }
    match e.begin_prompt(text) {
      Ok(p) => p,
      Err(err) => {
        let message = e.reject(&err);
        return Ok((message, e.render()));
      }
    }
  };

  let shared = Arc::clone(&engine);
  let leg = tokio::spawn(async move {
    let evaluation = pending.evaluate().await;
    info!(target: "prompt_ninja", technique = pending.technique().slug(), score = evaluation.score,
          passed = evaluation.passed, source = ?evaluation.source, "Prompt evaluated");

    let mut e = shared.lock().await;
    let message = e.complete_prompt(&pending, &evaluation);
    (message, e.render())
  });

  leg.await.map_err(|e| {
    error!(target: "prompt_ninja", error = %e, "Evaluation task failed");
    ApiError::EvaluationAborted(e.to_string())
  })
}

pub async fn reset_session(state: &AppState, session_id: &str) -> Result<EngineView, ApiError> {
  let engine = session_or_404(state, session_id).await?;
  let mut e = engine.lock().await;
  e.reset();
  Ok(e.render())
}

pub async fn session_state(state: &AppState, session_id: &str) -> Result<EngineView, ApiError> {
  let engine = session_or_404(state, session_id).await?;
  let view = engine.lock().await.render();
  Ok(view)
}

/// Per-session key for LLM grading; `None` or blank falls back to the server default.
#[instrument(level = "info", skip(state, api_key), fields(%session_id, provided = api_key.is_some()))]
pub async fn set_api_key(state: &AppState, session_id: &str, api_key: Option<String>) -> Result<bool, ApiError> {
  let engine = session_or_404(state, session_id).await?;
  let mut e = engine.lock().await;
  let key = api_key.filter(|k| !k.trim().is_empty()).or_else(|| state.default_credential.clone());
  e.set_credential(key);
  Ok(e.has_credential())
}

pub async fn leaderboard_top(state: &AppState, limit: Option<usize>) -> Vec<LeaderboardEntry> {
  state.leaderboard.top(limit.unwrap_or(10).min(100)).await
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::{EvaluationLogic, LogicKind, Scenario, Technique};
  use crate::engine::LevelTable;
  use crate::error::{EvaluationError, StateError};
  use crate::grader::{GradeVerdict, Grader};
  use crate::leaderboard::MemoryLeaderboard;
  use crate::scenarios::MemorySource;

  struct SlowVeto;

  #[async_trait]
  impl Grader for SlowVeto {
    async fn grade(&self, _p: &str, _c: &str, _k: &str) -> Result<GradeVerdict, EvaluationError> {
      tokio::time::sleep(Duration::from_millis(200)).await;
      Ok(GradeVerdict { success: false, feedback: "LLM Evaluation: too vague".into() })
    }
  }

  fn graded_state() -> AppState {
    let scenario = Scenario {
      task: Some("How many panels?".into()),
      evaluation_logic: Some(EvaluationLogic {
        kind: LogicKind::LlmEvaluation,
        keywords: vec!["panels".into()],
        ..EvaluationLogic::default()
      }),
      ..Scenario::new("cot-1", "Panels", "Reason it out.")
    };
    AppState::from_parts(
      Arc::new(MemorySource::new().with(Technique::ChainOfThought, vec![scenario])),
      Some(Arc::new(SlowVeto)),
      Some("sk-test".into()),
      Duration::from_secs(5),
      LevelTable::new(vec![Technique::ChainOfThought]).unwrap(),
      Arc::new(MemoryLeaderboard::new()),
    )
  }

  #[tokio::test]
  async fn dropped_request_still_clears_the_pending_prompt() {
    let state = graded_state();
    let (id, _) = new_session(&state, None).await;
    let text = "How many panels? Think step by step.";

    let cancelled = tokio::time::timeout(Duration::from_millis(20), submit_prompt(&state, &id, text)).await;
    assert!(cancelled.is_err());
    assert!(session_state(&state, &id).await.unwrap().module.unwrap().pending);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let view = session_state(&state, &id).await.unwrap();
    assert!(!view.module.unwrap().pending);
    assert_eq!(view.score, 10);

    let (message, view) = submit_prompt(&state, &id, text).await.unwrap();
    assert_ne!(message, StateError::EvaluationPending.to_string());
    assert!(message.contains("too vague"));
    assert_eq!(view.score, 20);
  }
}
