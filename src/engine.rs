//! Progression controller: score, current level, completed techniques and the
//! level -> technique table that decides which module is active.
//!
//! The engine is driven through `begin_prompt` / `complete_prompt` so the
//! caller can release its session lock while `PendingPrompt::evaluate` awaits
//! the grader. `handle_prompt` runs a whole submission through the active
//! module while holding the engine, which suits engines without a grader.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{Evaluation, Technique};
use crate::error::{LevelTableError, StateError};
use crate::evaluator::evaluate;
use crate::grader::{Grader, GradingContext};
use crate::module::{Module, ModuleView, ProgressSink, Submission};
use crate::scenarios::ScenarioSource;

/// Called with the final score when every level is complete.
pub type GameOverHook = Box<dyn FnMut(u64) + Send>;

/// Level n is played with entry n-1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelTable(Vec<Technique>);

impl LevelTable {
  pub fn new(levels: Vec<Technique>) -> Result<Self, LevelTableError> {
    if levels.is_empty() {
      return Err(LevelTableError::Empty);
    }
    let mut seen = HashSet::new();
    if let Some(dup) = levels.iter().find(|t| !seen.insert(**t)) {
      return Err(LevelTableError::Duplicate(*dup));
    }
    Ok(Self(levels))
  }

  /// One level per technique in canonical order.
  pub fn canonical() -> Self {
    Self(Technique::ALL.to_vec())
  }

  pub fn technique_for(&self, level: u32) -> Option<Technique> {
    let idx = usize::try_from(level).ok()?.checked_sub(1)?;
    self.0.get(idx).copied()
  }

  pub fn techniques(&self) -> &[Technique] {
    &self.0
  }

}

impl Default for LevelTable {
  fn default() -> Self {
    Self::canonical()
  }
}

/// Score, level and completion bookkeeping. Modules see it only as a `ProgressSink`.
struct Progress {
  score: u64,
  level: u32,
  completed: BTreeSet<Technique>,
  terminal: bool,
  game_over_fired: bool,
  table: LevelTable,
  hook: Option<GameOverHook>,
}

impl Progress {
  fn new(table: LevelTable) -> Self {
    Self {
      score: 0,
      level: 1,
      completed: BTreeSet::new(),
      terminal: false,
      game_over_fired: false,
      table,
      hook: None,
    }
  }

  fn active(&self) -> Option<Technique> {
    if self.terminal { None } else { self.table.technique_for(self.level) }
  }

  fn all_completed(&self) -> bool {
    self.table.techniques().iter().all(|t| self.completed.contains(t))
  }

  fn fire_game_over(&mut self) {
    if self.game_over_fired {
      return;
    }
    self.game_over_fired = true;
    info!(target: "engine", score = self.score, "All modules complete");
    if let Some(hook) = self.hook.as_mut() {
      hook(self.score);
    }
  }
}

impl ProgressSink for Progress {
  fn add_score(&mut self, points: u32) {
    self.score = self.score.saturating_add(u64::from(points));
  }

  fn module_completed(&mut self, technique: Technique) {
    let expected = self.active();
    if expected != Some(technique) {
      warn!(target: "engine", reported = technique.slug(), expected = ?expected.map(Technique::slug), level = self.level,
            "Ignoring unexpected module completion");
      return;
    }
    self.completed.insert(technique);
    self.level += 1;
    info!(target: "engine", technique = technique.slug(), level = self.level, "Level up");

    if self.table.technique_for(self.level).is_none() && self.all_completed() {
      self.terminal = true;
      self.fire_game_over();
    }
  }
}

/// A submission taken out of the engine for evaluation.
pub struct PendingPrompt {
  submission: Submission,
  text: String,
  grading: Option<GradingContext>,
}

impl PendingPrompt {
  pub fn technique(&self) -> Technique {
    self.submission.technique
  }

  /// Heuristics plus optional grading; holds no engine state.
  pub async fn evaluate(&self) -> Evaluation {
    evaluate(
      self.submission.technique,
      &self.text,
      Some(self.submission.scenario.as_ref()),
      self.grading.as_ref(),
    )
    .await
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct LevelView {
  pub level: u32,
  pub technique: Technique,
  pub name: &'static str,
  pub completed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct EngineView {
  pub score: u64,
  pub level: u32,
  pub active: Option<Technique>,
  pub complete: bool,
  pub completed: Vec<Technique>,
  pub levels: Vec<LevelView>,
  pub module: Option<ModuleView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
}

pub struct Engine {
  modules: BTreeMap<Technique, Module>,
  progress: Progress,
  status: Option<String>,
  grader: Option<Arc<dyn Grader>>,
  credential: Option<String>,
  grader_timeout: Duration,
}

impl Engine {
  /// One unloaded module per table entry.
  pub fn new(table: LevelTable) -> Self {
    let modules = table.techniques().iter().map(|t| (*t, Module::new(*t))).collect();
    Self {
      modules,
      progress: Progress::new(table),
      status: None,
      grader: None,
      credential: None,
      grader_timeout: Duration::from_secs(20),
    }
  }

  pub fn with_grader(mut self, grader: Arc<dyn Grader>, timeout: Duration) -> Self {
    self.grader = Some(grader);
    self.grader_timeout = timeout;
    self
  }

  pub fn set_game_over_hook(&mut self, hook: GameOverHook) {
    self.progress.hook = Some(hook);
  }

  pub fn set_credential(&mut self, credential: Option<String>) {
    self.credential = credential.filter(|k| !k.trim().is_empty());
  }

  pub fn has_credential(&self) -> bool {
    self.credential.is_some()
  }

  pub fn has_grader(&self) -> bool {
    self.grader.is_some()
  }

  #[instrument(level = "info", skip_all)]
  pub fn load_modules(&mut self, source: &dyn ScenarioSource) {
    for module in self.modules.values_mut() {
      module.load(source);
    }
  }

  pub fn score(&self) -> u64 {
    self.progress.score
  }

  pub fn level(&self) -> u32 {
    self.progress.level
  }

  pub fn completed(&self) -> &BTreeSet<Technique> {
    &self.progress.completed
  }

  pub fn active_technique(&self) -> Option<Technique> {
    self.progress.active()
  }

  pub fn is_complete(&self) -> bool {
    self.progress.terminal
  }

  fn grading_context(&self) -> Option<GradingContext> {
    self.grader.as_ref().map(|g| GradingContext {
      grader: Arc::clone(g),
      credential: self.credential.clone(),
      timeout: self.grader_timeout,
    })
  }

  /// Take a submission out of the active module.
  pub fn begin_prompt(&mut self, text: &str) -> Result<PendingPrompt, StateError> {
    if self.progress.terminal {
      return Err(StateError::GameComplete);
    }
    let level = self.progress.level;
    let technique = self.progress.active().ok_or(StateError::NoActiveModule(level))?;
    let module = self.modules.get_mut(&technique).ok_or(StateError::NoActiveModule(level))?;
    let submission = module.begin_submission()?;
    Ok(PendingPrompt { submission, text: text.to_string(), grading: self.grading_context() })
  }

  /// Apply an evaluation produced from `pending`.
  pub fn complete_prompt(&mut self, pending: &PendingPrompt, evaluation: &Evaluation) -> String {
    let technique = pending.submission.technique;
    let level_before = self.progress.level;
    let Some(module) = self.modules.get_mut(&technique) else {
      return StateError::NoActiveModule(level_before).to_string();
    };
    let message = module.complete_submission(pending.submission.ticket, evaluation, &mut self.progress);
    self.announce(message, level_before)
  }

  /// Forward `text` to the active module and return the player feedback.
  /// The engine stays borrowed until grading finishes.
  #[instrument(level = "info", skip_all, fields(level = self.progress.level, text_len = text.len()))]
  pub async fn handle_prompt(&mut self, text: &str) -> String {
    let level_before = self.progress.level;
    if self.progress.terminal {
      return self.reject(&StateError::GameComplete);
    }
    let grading = self.grading_context();
    let module = match self.progress.active().and_then(|t| self.modules.get_mut(&t)) {
      Some(m) => m,
      None => return self.reject(&StateError::NoActiveModule(level_before)),
    };
    match module.process_prompt(text, grading.as_ref(), &mut self.progress).await {
      Ok(message) => self.announce(message, level_before),
      Err(e) => self.reject(&e),
    }
  }

  /// Append level-up or game-over news to a module's feedback.
  fn announce(&mut self, mut message: String, level_before: u32) -> String {
    if self.progress.terminal {
      message.push_str(&format!(" | All modules complete! Final score: {}", self.progress.score));
    } else if self.progress.level > level_before {
      if let Some(next) = self.progress.active() {
        message.push_str(&format!(" | Level {}: {}", self.progress.level, next.display_name()));
      }
    }
    self.status = None;
    message
  }

  /// Record a refused prompt as the visible status and return its message.
  pub fn reject(&mut self, error: &StateError) -> String {
    warn!(target: "engine", error = %error, level = self.progress.level, "Prompt not accepted");
    let msg = error.to_string();
    self.status = Some(msg.clone());
    msg
  }

  pub fn add_score(&mut self, points: u32) {
    self.progress.add_score(points);
  }

  pub fn module_completed(&mut self, technique: Technique) {
    self.progress.module_completed(technique);
  }

  /// Back to level 1 with nothing scored; modules keep their loaded scenarios.
  pub fn reset(&mut self) {
    let p = &mut self.progress;
    p.score = 0;
    p.level = 1;
    p.completed.clear();
    p.terminal = false;
    p.game_over_fired = false;
    self.status = None;
    for module in self.modules.values_mut() {
      module.reset();
    }
    info!(target: "engine", "Engine reset");
  }

  pub fn render(&self) -> EngineView {
    let levels = self
      .progress
      .table
      .techniques()
      .iter()
      .zip(1u32..)
      .map(|(t, level)| LevelView {
        level,
        technique: *t,
        name: t.display_name(),
        completed: self.progress.completed.contains(t),
      })
      .collect();
    EngineView {
      score: self.progress.score,
      level: self.progress.level,
      active: self.progress.active(),
      complete: self.progress.terminal,
      completed: self.completed().iter().copied().collect(),
      levels,
      module: self.progress.active().and_then(|t| self.modules.get(&t)).map(Module::render),
      status: self.status.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::{EvaluationLogic, GradeSource, LogicKind, Scenario};
  use crate::error::EvaluationError;
  use crate::grader::GradeVerdict;
  use crate::scenarios::{BundledSource, MemorySource};

  fn recorder() -> (Arc<Mutex<Vec<u64>>>, GameOverHook) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    (calls, Box::new(move |score| sink.lock().unwrap().push(score)))
  }

  fn two_level_engine() -> Engine {
    let table = LevelTable::new(vec![Technique::RolePrompting, Technique::SelfConsistency]).unwrap();
    let source = MemorySource::new()
      .with(Technique::RolePrompting, vec![Scenario {
        required_role: Some("Energy Expert".into()),
        task_input: Some("Explain solar power.".into()),
        ..Scenario::new("role-1", "Role", "Play a role.")
      }])
      .with(Technique::SelfConsistency, vec![Scenario {
        task_input: Some("Classify complex text.".into()),
        ..Scenario::new("sc-1", "Majority", "Sample several answers.")
      }]);
    let mut engine = Engine::new(table);
    engine.load_modules(&source);
    engine
  }

  #[test]
  fn level_table_rejects_duplicates_and_empty() {
    assert_eq!(LevelTable::new(vec![]), Err(LevelTableError::Empty));
    assert_eq!(
      LevelTable::new(vec![Technique::Ape, Technique::ZeroShot, Technique::Ape]),
      Err(LevelTableError::Duplicate(Technique::Ape))
    );
    let t = LevelTable::canonical();
    assert_eq!(t.technique_for(1), Some(Technique::ZeroShot));
    assert_eq!(t.technique_for(11), Some(Technique::CodePrompting));
    assert_eq!(t.technique_for(0), None);
    assert_eq!(t.technique_for(12), None);
  }

  #[test]
  fn matching_completions_advance_one_level_each() {
    let mut engine = Engine::new(LevelTable::canonical());
    engine.module_completed(Technique::FewShot);
    assert_eq!(engine.level(), 1);
    for (i, t) in Technique::ALL.iter().take(4).enumerate() {
      engine.module_completed(*t);
      assert_eq!(engine.level(), i as u32 + 2);
      engine.module_completed(*t);
      assert_eq!(engine.level(), i as u32 + 2);
    }
    assert_eq!(engine.active_technique(), Some(Technique::Contextual));
    assert_eq!(engine.completed().len(), 4);
  }

  #[test]
  fn game_over_fires_once_with_the_accumulated_score() {
    let (calls, hook) = recorder();
    let mut engine = Engine::new(LevelTable::canonical());
    engine.set_game_over_hook(hook);
    engine.add_score(42);
    for t in Technique::ALL {
      engine.module_completed(t);
    }
    assert!(engine.is_complete());
    assert_eq!(engine.active_technique(), None);
    engine.module_completed(Technique::CodePrompting);
    engine.add_score(1);
    assert_eq!(*calls.lock().unwrap(), vec![42]);
  }

  #[tokio::test]
  async fn terminal_state_ignores_prompts_until_reset() {
    let (calls, hook) = recorder();
    let mut engine = two_level_engine();
    engine.set_game_over_hook(hook);

    engine.handle_prompt("Act as Energy Expert. Explain solar power.").await;
    assert_eq!(engine.active_technique(), Some(Technique::SelfConsistency));
    let last = engine.handle_prompt("Explain why, step by step, and take the majority of several answers.").await;
    assert!(last.contains("All modules complete!"));
    assert!(engine.is_complete());
    let score = engine.score();
    assert_eq!(*calls.lock().unwrap(), vec![score]);

    assert_eq!(engine.begin_prompt("again").err(), Some(StateError::GameComplete));
    engine.handle_prompt("Act as Energy Expert. Explain solar power.").await;
    assert_eq!(engine.score(), score);

    engine.reset();
    assert_eq!((engine.score(), engine.level(), engine.is_complete()), (0, 1, false));
    assert!(engine.completed().is_empty());
    engine.handle_prompt("Act as Energy Expert. Explain solar power.").await;
    engine.handle_prompt("Explain why, step by step, and take the majority of several answers.").await;
    assert_eq!(calls.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn passing_prompts_add_their_score() {
    let mut engine = two_level_engine();
    engine.handle_prompt("Tell me about solar power").await;
    assert_eq!(engine.score(), 3);
    assert_eq!(engine.level(), 1);
    let msg = engine.handle_prompt("Act as Energy Expert. Explain solar power.").await;
    assert_eq!(engine.score(), 11);
    assert_eq!(engine.level(), 2);
    assert!(msg.contains("Level 2: Self-Consistency"));
  }

  #[tokio::test]
  async fn unloaded_engine_reports_state_error() {
    let mut engine = Engine::new(LevelTable::canonical());
    let msg = engine.handle_prompt("anything").await;
    assert_eq!(msg, StateError::NotLoaded(Technique::ZeroShot).to_string());
    assert_eq!(engine.score(), 0);
    assert_eq!(engine.render().status.as_deref(), Some(msg.as_str()));
  }

  #[tokio::test]
  async fn reset_while_evaluating_discards_the_result() {
    let mut engine = two_level_engine();
    let pending = engine.begin_prompt("Act as Energy Expert. Explain solar power.").unwrap();
    assert_eq!(engine.begin_prompt("again").err(), Some(StateError::EvaluationPending));
    let evaluation = pending.evaluate().await;
    engine.reset();
    engine.complete_prompt(&pending, &evaluation);
    assert_eq!((engine.score(), engine.level()), (0, 1));
  }

  struct Veto;

  #[async_trait]
  impl Grader for Veto {
    async fn grade(&self, _p: &str, _c: &str, _k: &str) -> Result<GradeVerdict, EvaluationError> {
      Ok(GradeVerdict { success: false, feedback: "LLM Evaluation: too vague".into() })
    }
  }

  #[tokio::test]
  async fn grader_runs_only_with_a_credential() {
    let table = LevelTable::new(vec![Technique::ChainOfThought]).unwrap();
    let scenario = Scenario {
      task: Some("How many panels?".into()),
      evaluation_logic: Some(EvaluationLogic {
        kind: LogicKind::LlmEvaluation,
        keywords: vec!["panels".into()],
        ..EvaluationLogic::default()
      }),
      ..Scenario::new("cot-1", "Panels", "Reason it out.")
    };
    let mut engine = Engine::new(table).with_grader(Arc::new(Veto), Duration::from_secs(1));
    engine.load_modules(&MemorySource::new().with(Technique::ChainOfThought, vec![scenario]));

    let pending = engine.begin_prompt("How many panels? Think step by step.").unwrap();
    let without_key = pending.evaluate().await;
    assert_eq!(without_key.source, GradeSource::HeuristicFallback);
    engine.complete_prompt(&pending, &without_key);
    assert!(engine.is_complete());

    engine.reset();
    engine.set_credential(Some("sk-test".into()));
    let msg = engine.handle_prompt("How many panels? Think step by step.").await;
    assert!(msg.contains("too vague"));
    assert!(!engine.is_complete());
  }

  #[test]
  fn render_reflects_the_active_module() {
    let mut engine = Engine::new(LevelTable::canonical());
    engine.load_modules(&BundledSource);
    let view = engine.render();
    assert_eq!(view.active, Some(Technique::ZeroShot));
    assert_eq!(view.levels.len(), 11);
    assert_eq!(view.module.map(|m| m.technique), Some(Technique::ZeroShot));
  }
}
