//! Error taxonomy. None of these are fatal to a session: load errors are
//! replaced by a fallback scenario, evaluation errors by the heuristic verdict
//! and state errors by a status message.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::domain::Technique;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("scenario source unreachable at {path}: {source}")]
  Unreachable {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("scenario data for {technique} is malformed: {source}")]
  Malformed {
    technique: Technique,
    #[source]
    source: serde_json::Error,
  },
  #[error("scenario data for {0} is empty")]
  Empty(Technique),
  #[error("scenario data for {technique} is invalid: {reason}")]
  Invalid { technique: Technique, reason: String },
  #[error("no scenario data for {0}")]
  Missing(Technique),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
  #[error("no API key available for LLM evaluation")]
  MissingCredential,
  #[error("LLM request failed: {0}")]
  Transport(String),
  #[error("LLM HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("LLM response was unclear: {0}")]
  MalformedResponse(String),
  #[error("LLM evaluation timed out after {0:?}")]
  Timeout(std::time::Duration),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateError {
  #[error("scenarios for {0} are not loaded yet")]
  NotLoaded(Technique),
  #[error("{0} has no scenarios")]
  NoScenarios(Technique),
  #[error("{0} is already complete")]
  ModuleCompleted(Technique),
  #[error("still evaluating the previous prompt")]
  EvaluationPending,
  #[error("no active module for level {0}")]
  NoActiveModule(u32),
  #[error("all modules are complete; reset to play again")]
  GameComplete,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LevelTableError {
  #[error("level table is empty")]
  Empty,
  #[error("{0} appears more than once in the level table")]
  Duplicate(Technique),
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("prompt evaluation aborted: {0}")]
  EvaluationAborted(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match self {
      ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
      ApiError::EvaluationAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
