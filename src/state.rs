//! Application state: game sessions, the scenario source, the optional grader
//! and the leaderboard.
//!
//! This module owns:
//!   - the session map (session id -> engine behind an async mutex), pruned of
//!     sessions idle for longer than `session_ttl` whenever a new one is created
//!   - the scenario source every new session loads from
//!   - the grader, default credential and level table handed to new engines
//!
//! Scenarios come from SCENARIO_DIR (or `scenario_dir` in the TOML config) when
//! set, otherwise from the set compiled into the binary.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::{load_game_config_from_env, Settings};
use crate::engine::{Engine, LevelTable};
use crate::grader::{Grader, OpenAiGrader};
use crate::leaderboard::{Leaderboard, LeaderboardEntry, MemoryLeaderboard, PlayerIdentity};
use crate::scenarios::{BundledSource, DirectorySource, ScenarioSource};

pub type SharedEngine = Arc<Mutex<Engine>>;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// A session's engine plus the last time a request reached it.
pub struct Session {
    pub engine: SharedEngine,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub session_ttl: Duration,
    pub source: Arc<dyn ScenarioSource>,
    pub grader: Option<Arc<dyn Grader>>,
    pub default_credential: Option<String>,
    pub grader_timeout: Duration,
    pub levels: LevelTable,
    pub leaderboard: Arc<dyn Leaderboard>,
}

impl AppState {
    /// Build state from env: load config, pick the scenario source, init the grader.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let settings = Settings::from_env();
        let cfg = load_game_config_from_env().unwrap_or_default();

        let source: Arc<dyn ScenarioSource> = match settings.scenario_dir.clone().or(cfg.scenario_dir.clone()) {
            Some(dir) => {
                info!(target: "prompt_ninja", dir = %dir.display(), "Loading scenarios from directory");
                Arc::new(DirectorySource::new(dir))
            }
            None => {
                info!(target: "prompt_ninja", "Using bundled scenarios");
                Arc::new(BundledSource)
            }
        };

        let levels = match cfg.levels.clone().map(LevelTable::new) {
            Some(Ok(table)) => table,
            Some(Err(e)) => {
                error!(target: "prompt_ninja", error = %e, "Invalid level table in config; using canonical order");
                LevelTable::canonical()
            }
            None => LevelTable::canonical(),
        };

        let grader = OpenAiGrader::from_env(cfg.prompts.clone(), settings.grader_timeout);
        if let Some(g) = &grader {
            info!(target: "prompt_ninja", model = %g.model(), has_default_key = settings.api_key.is_some(), "LLM grading available");
        } else {
            info!(target: "prompt_ninja", "LLM grading disabled. Using heuristic checks only.");
        }

        Self::from_parts(
            source,
            grader.map(|g| Arc::new(g) as Arc<dyn Grader>),
            settings.api_key,
            settings.grader_timeout,
            levels,
            Arc::new(MemoryLeaderboard::new()),
        )
        .with_session_ttl(settings.session_ttl)
    }

    pub fn from_parts(
        source: Arc<dyn ScenarioSource>,
        grader: Option<Arc<dyn Grader>>,
        default_credential: Option<String>,
        grader_timeout: Duration,
        levels: LevelTable,
        leaderboard: Arc<dyn Leaderboard>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
            source,
            grader,
            default_credential,
            grader_timeout,
            levels,
            leaderboard,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Fresh engine with every module loaded. Finished games are posted to the
    /// leaderboard when `player` is known.
    #[instrument(level = "info", skip(self, player), fields(has_player = player.is_some()))]
    pub async fn create_session(&self, player: Option<PlayerIdentity>) -> (String, SharedEngine) {
        let mut engine = Engine::new(self.levels.clone());
        if let Some(g) = &self.grader {
            engine = engine.with_grader(Arc::clone(g), self.grader_timeout);
        }
        engine.set_credential(self.default_credential.clone());
        engine.load_modules(self.source.as_ref());

        let id = Uuid::new_v4().to_string();
        let board = Arc::clone(&self.leaderboard);
        let session_id = id.clone();
        engine.set_game_over_hook(Box::new(move |score| match &player {
            Some(p) => {
                let entry = LeaderboardEntry::now(p, score);
                let board = Arc::clone(&board);
                tokio::spawn(async move { board.submit(entry).await });
            }
            None => info!(target: "prompt_ninja", session = %session_id, score, "Game complete (anonymous, not ranked)"),
        }));

        let shared = Arc::new(Mutex::new(engine));
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() < self.session_ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(target: "prompt_ninja", pruned, remaining = sessions.len(), "Dropped idle sessions");
        }
        sessions.insert(id.clone(), Session { engine: Arc::clone(&shared), last_seen: Instant::now() });
        info!(target: "prompt_ninja", session = %id, "Session created");
        (id, shared)
    }

    /// Look up a session and mark it as used.
    pub async fn session(&self, id: &str) -> Option<SharedEngine> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.last_seen = Instant::now();
        Some(Arc::clone(&session.engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(ttl: Duration) -> AppState {
        AppState::from_parts(
            Arc::new(BundledSource),
            None,
            None,
            Duration::from_secs(1),
            LevelTable::canonical(),
            Arc::new(MemoryLeaderboard::new()),
        )
        .with_session_ttl(ttl)
    }

    #[tokio::test]
    async fn idle_sessions_are_dropped_on_create() {
        let state = state(Duration::from_millis(300));
        let (kept, _) = state.create_session(None).await;
        let (idle, _) = state.create_session(None).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(state.session(&kept).await.is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (fresh, _) = state.create_session(None).await;
        assert!(state.session(&idle).await.is_none());
        assert!(state.session(&kept).await.is_some());
        assert!(state.session(&fresh).await.is_some());
        assert_eq!(state.sessions.read().await.len(), 2);
    }

    #[tokio::test]
    async fn active_sessions_survive() {
        let state = state(Duration::from_secs(60));
        let (first, _) = state.create_session(None).await;
        state.create_session(None).await;
        assert!(state.session(&first).await.is_some());
        assert_eq!(state.sessions.read().await.len(), 2);
    }
}
