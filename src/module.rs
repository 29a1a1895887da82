//! One technique's playthrough: its ordered scenarios, the current position
//! and the last feedback shown to the player.
//!
//! A submission is split in two so callers can release locks while grading:
//! `begin_submission` marks the module pending and hands out a ticket,
//! `complete_submission` applies the evaluation. While a ticket is out, new
//! submissions are rejected; `reset` invalidates outstanding tickets.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Evaluation, Scenario, Technique};
use crate::error::StateError;
use crate::evaluator::evaluate;
use crate::grader::GradingContext;
use crate::scenarios::ScenarioSource;
use crate::seeds::fallback_scenario;

/// Narrow view of the engine a module reports into.
pub trait ProgressSink: Send {
  fn add_score(&mut self, points: u32);
  fn module_completed(&mut self, technique: Technique);
}

/// Identifies one in-flight submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
  epoch: u64,
  index: usize,
}

/// Everything needed to evaluate a submission away from the module.
#[derive(Clone, Debug)]
pub struct Submission {
  pub ticket: Ticket,
  pub technique: Technique,
  pub scenario: Arc<Scenario>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScenarioView {
  pub id: String,
  pub title: String,
  pub description: String,
  /// Technique-specific lines such as "Required role: ...".
  pub details: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleView {
  pub technique: Technique,
  pub name: &'static str,
  pub scenario_index: usize,
  pub scenario_count: usize,
  pub scenario: Option<ScenarioView>,
  pub feedback: String,
  pub completed: bool,
  pub pending: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
}

#[derive(Debug)]
pub struct Module {
  technique: Technique,
  scenarios: Vec<Arc<Scenario>>,
  idx: usize,
  loaded: bool,
  pending: bool,
  epoch: u64,
  feedback: String,
  status: Option<String>,
}

impl Module {
  /// Unloaded module; submissions are rejected until `load`.
  pub fn new(technique: Technique) -> Self {
    Self {
      technique,
      scenarios: Vec::new(),
      idx: 0,
      loaded: false,
      pending: false,
      epoch: 0,
      feedback: technique.ready_message(),
      status: None,
    }
  }

  /// Loaded module over the given scenarios, which may be empty.
  #[cfg(test)]
  pub fn with_scenarios(technique: Technique, scenarios: Vec<Scenario>) -> Self {
    let mut m = Self::new(technique);
    m.scenarios = scenarios.into_iter().map(Arc::new).collect();
    m.loaded = true;
    m
  }

  /// Fetch scenarios from `source`; on failure substitute the built-in one.
  #[instrument(level = "debug", skip(self, source), fields(technique = self.technique.slug()))]
  pub fn load(&mut self, source: &dyn ScenarioSource) {
    let scenarios = match source.load(self.technique) {
      Ok(list) => {
        info!(target: "scenarios", technique = self.technique.slug(), count = list.len(), "Scenarios loaded");
        self.status = None;
        list
      }
      Err(e) => {
        warn!(target: "scenarios", technique = self.technique.slug(), error = %e, "Scenario load failed; using built-in fallback");
        self.status = Some(format!("Could not load scenarios ({e}); using a built-in challenge."));
        vec![fallback_scenario(self.technique)]
      }
    };
    self.scenarios = scenarios.into_iter().map(Arc::new).collect();
    self.loaded = true;
    self.reset();
  }

  pub fn current_index(&self) -> usize {
    self.idx
  }

  pub fn len(&self) -> usize {
    self.scenarios.len()
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  pub fn is_completed(&self) -> bool {
    self.loaded && !self.scenarios.is_empty() && self.idx >= self.scenarios.len()
  }

  pub fn current_scenario(&self) -> Option<&Arc<Scenario>> {
    self.scenarios.get(self.idx)
  }

  pub fn feedback(&self) -> &str {
    &self.feedback
  }

  pub fn begin_submission(&mut self) -> Result<Submission, StateError> {
    if !self.is_loaded() {
      return Err(StateError::NotLoaded(self.technique));
    }
    if self.scenarios.is_empty() {
      return Err(StateError::NoScenarios(self.technique));
    }
    if self.pending {
      return Err(StateError::EvaluationPending);
    }
    let scenario = match self.scenarios.get(self.idx) {
      Some(s) => Arc::clone(s),
      None => return Err(StateError::ModuleCompleted(self.technique)),
    };
    self.pending = true;
    Ok(Submission {
      ticket: Ticket { epoch: self.epoch, index: self.idx },
      technique: self.technique,
      scenario,
    })
  }

  /// Apply an evaluation; returns the feedback line for the player.
  pub fn complete_submission(&mut self, ticket: Ticket, evaluation: &Evaluation, sink: &mut dyn ProgressSink) -> String {
    if ticket.epoch != self.epoch || !self.pending || ticket.index != self.idx {
      debug!(target: "engine", technique = self.technique.slug(), "Discarding stale evaluation result");
      return "Previous result discarded.".into();
    }
    self.pending = false;

    if evaluation.score > 0 {
      sink.add_score(evaluation.score);
    }

    let scenario = self.scenarios.get(self.idx).cloned();
    let mut parts = vec![format!("Score: {}/10", evaluation.score)];
    parts.extend(evaluation.feedback.iter().cloned());

    if evaluation.passed {
      self.idx += 1;
      if self.idx >= self.scenarios.len() {
        info!(target: "engine", technique = self.technique.slug(), "Module complete");
        self.feedback = format!("{} Module Complete!", self.technique.display_name());
        sink.module_completed(self.technique);
        return self.feedback.clone();
      }
      let success = scenario
        .as_ref()
        .and_then(|s| s.success_message.clone())
        .unwrap_or_else(|| "Correct!".into());
      parts.push(format!("{success} Advancing to the next scenario."));
    } else {
      parts.push("Not quite, try again.".into());
      if let Some(hint) = scenario.as_ref().and_then(|s| s.hints.choose(&mut rand::thread_rng())) {
        parts.push(format!("Hint: {hint}"));
      }
    }
    if let Some(note) = &evaluation.note {
      parts.push(note.clone());
    }
    self.feedback = parts.join(" | ");
    self.feedback.clone()
  }

  /// Evaluate `text` against the current scenario and apply the result.
  /// Holds `&mut self` across the evaluation; callers that share the module
  /// between tasks use the begin/complete pair instead.
  pub async fn process_prompt(
    &mut self,
    text: &str,
    grading: Option<&GradingContext>,
    sink: &mut dyn ProgressSink,
  ) -> Result<String, StateError> {
    let submission = self.begin_submission().map_err(|e| {
      debug!(target: "engine", technique = self.technique.slug(), error = %e, "Submission ignored");
      e
    })?;
    let evaluation = evaluate(self.technique, text, Some(submission.scenario.as_ref()), grading).await;
    Ok(self.complete_submission(submission.ticket, &evaluation, sink))
  }

  /// Back to the first scenario. Idempotent.
  pub fn reset(&mut self) {
    self.idx = 0;
    self.feedback = self.technique.ready_message();
    if self.pending {
      self.pending = false;
      self.epoch += 1;
    }
  }

  pub fn render(&self) -> ModuleView {
    ModuleView {
      technique: self.technique,
      name: self.technique.display_name(),
      scenario_index: self.current_index(),
      scenario_count: self.len(),
      scenario: self.current_scenario().map(|s| scenario_view(s.as_ref())),
      feedback: self.feedback().to_string(),
      completed: self.is_completed(),
      pending: self.is_pending(),
      status: self.status.clone(),
    }
  }
}

fn scenario_view(s: &Scenario) -> ScenarioView {
  let mut details = Vec::new();
  push_detail(&mut details, "Required role", s.required_role.as_deref());
  push_detail(&mut details, "System constraint", s.system_constraint.as_deref());
  push_detail(&mut details, "Context", s.context.as_deref());
  push_detail(&mut details, "Step-back hint", s.step_back_question_hint.as_deref());
  push_detail(&mut details, "Specific task", s.specific_task.as_deref());
  for e in &s.examples {
    details.push(format!("Example: {} -> {}", e.input, e.output));
  }
  push_detail(&mut details, "Input", s.task_input.as_deref());
  push_detail(&mut details, "Task", s.task.as_deref());
  push_detail(&mut details, "Target unit", s.target_unit.as_deref());
  push_detail(&mut details, "Template", s.prompt_template.as_deref());
  ScenarioView { id: s.id.clone(), title: s.title.clone(), description: s.description.clone(), details }
}

fn push_detail(out: &mut Vec<String>, label: &str, value: Option<&str>) {
  if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
    out.push(format!("{label}: {v}"));
  }
}
