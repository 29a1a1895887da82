//! Finished-game scores. Submission is fire-and-forget: nothing in the game
//! waits for it and a failed write never reaches the player.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// Who is playing. Sessions without one never submit scores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
  pub user_id: String,
  pub user_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
  pub user_id: String,
  pub user_name: String,
  pub score: u64,
  /// Seconds since the Unix epoch.
  pub recorded_at: u64,
}

impl LeaderboardEntry {
  pub fn now(player: &PlayerIdentity, score: u64) -> Self {
    let recorded_at = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    Self { user_id: player.user_id.clone(), user_name: player.user_name.clone(), score, recorded_at }
  }
}

#[async_trait]
pub trait Leaderboard: Send + Sync {
  async fn submit(&self, entry: LeaderboardEntry);
  /// Highest scores first.
  async fn top(&self, n: usize) -> Vec<LeaderboardEntry>;
}

#[derive(Default)]
pub struct MemoryLeaderboard {
  entries: RwLock<Vec<LeaderboardEntry>>,
}

impl MemoryLeaderboard {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Leaderboard for MemoryLeaderboard {
  async fn submit(&self, entry: LeaderboardEntry) {
    info!(target: "prompt_ninja", user_id = %entry.user_id, score = entry.score, "Leaderboard entry recorded");
    let mut entries = self.entries.write().await;
    // Equal scores keep submission order.
    let at = entries.partition_point(|e| e.score >= entry.score);
    entries.insert(at, entry);
  }

  async fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
    self.entries.read().await.iter().take(n).cloned().collect()
  }
}
