//! Loading game configuration (grader prompts, scenario location, level order)
//! from TOML, plus the environment settings the server reads at startup.
//!
//! See `GameConfig` and `Prompts` for expected schema. Every field is optional;
//! an absent or unreadable file means built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Technique;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GameConfig {
  #[serde(default)]
  pub prompts: Prompts,
  /// Directory holding `<slug>.json` scenario files. `SCENARIO_DIR` wins over this.
  #[serde(default)]
  pub scenario_dir: Option<PathBuf>,
  /// Level order by technique slug, level 1 first.
  #[serde(default)]
  pub levels: Option<Vec<Technique>>,
}

/// Prompts used by the LLM grader. Override them in TOML to tune strictness.
///
/// `grader_user_template` accepts `{criteria}` and `{prompt}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub grader_system: String,
  pub grader_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      grader_system: "You are an expert evaluator for a prompt engineering training game. \
Analyze the user's prompt based EXCLUSIVELY on the provided criteria. \
Respond ONLY with the word \"PASS\" if the prompt meets all criteria, or \"FAIL: [Brief reason]\" if it does not. \
Do not add any explanations unless it's a FAIL reason. Be strict."
        .into(),
      grader_user_template: "Criteria: {criteria}\n\nUser Prompt: \"{prompt}\"".into(),
    }
  }
}

/// Process-level settings read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub api_key: Option<String>,
  pub grader_timeout: Duration,
  pub scenario_dir: Option<PathBuf>,
  /// Sessions idle for longer than this are dropped.
  pub session_ttl: Duration,
}

impl Settings {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(3000);
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
    let grader_timeout = std::env::var("GRADER_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse().ok())
      .map(Duration::from_secs)
      .unwrap_or(Duration::from_secs(20));
    let scenario_dir = std::env::var("SCENARIO_DIR").ok().filter(|d| !d.trim().is_empty()).map(PathBuf::from);
    let session_ttl = std::env::var("SESSION_TTL_SECS")
      .ok()
      .and_then(|s| s.parse().ok())
      .map(Duration::from_secs)
      .unwrap_or(Duration::from_secs(60 * 60));
    Self { port, api_key, grader_timeout, scenario_dir, session_ttl }
  }
}

/// Attempt to load `GameConfig` from GAME_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_game_config_from_env() -> Option<GameConfig> {
  let path = std::env::var("GAME_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_game_config(&s) {
      Ok(cfg) => {
        info!(target: "prompt_ninja", %path, "Loaded game config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "prompt_ninja", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "prompt_ninja", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_game_config(text: &str) -> Result<GameConfig, toml::de::Error> {
  toml::from_str(text)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse_game_config("").unwrap();
    assert!(cfg.prompts.grader_system.contains("PASS"));
    assert!(cfg.levels.is_none());
    assert!(cfg.scenario_dir.is_none());
  }

  #[test]
  fn partial_prompts_keep_remaining_defaults() {
    let cfg = parse_game_config(
      r#"
      scenario_dir = "/srv/scenarios"
      levels = ["role_prompting", "zero_shot"]

      [prompts]
      grader_system = "Be lenient."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.grader_system, "Be lenient.");
    assert!(cfg.prompts.grader_user_template.contains("{criteria}"));
    assert_eq!(cfg.levels, Some(vec![Technique::RolePrompting, Technique::ZeroShot]));
    assert_eq!(cfg.scenario_dir, Some(PathBuf::from("/srv/scenarios")));
  }

  #[test]
  fn unknown_level_slug_is_an_error() {
    assert!(parse_game_config(r#"levels = ["telepathy"]"#).is_err());
  }
}
