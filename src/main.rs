//! Prompt Ninja · prompt-engineering training game backend
//!
//! - Axum HTTP + WebSocket API over per-session progression engines
//! - Optional LLM grading through an OpenAI-compatible endpoint
//! - Static frontend fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : default grading key for new sessions (players may set their own)
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4o-mini"
//!   GRADER_TIMEOUT_SECS : default 20
//!   SESSION_TTL_SECS    : idle sessions older than this are dropped (default 3600)
//!   SCENARIO_DIR        : directory of <technique>.json files (default: bundled set)
//!   GAME_CONFIG_PATH    : path to TOML config (grader prompts, scenario_dir, levels)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod energy;
mod seeds;
mod scenarios;
mod evaluator;
mod grader;
mod module;
mod engine;
mod leaderboard;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Sessions, scenario source, grader and leaderboard.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], Settings::from_env().port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "prompt_ninja", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "prompt_ninja", "Shutdown signal received");
      }
    })
    .await?;
  Ok(())
}
