//! Domain models: prompting techniques, scenarios and evaluation results.

use serde::{Deserialize, Serialize};

/// One prompting technique. Each technique owns exactly one level in the
/// canonical progression and one scenario file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
  ZeroShot,
  FewShot,
  RolePrompting,
  SystemPrompting,
  Contextual,
  StepBack,
  ChainOfThought,
  SelfConsistency,
  TreeOfThoughts,
  Ape,
  CodePrompting,
}

impl Technique {
  /// Canonical level order.
  pub const ALL: [Technique; 11] = [
    Technique::ZeroShot,
    Technique::FewShot,
    Technique::RolePrompting,
    Technique::SystemPrompting,
    Technique::Contextual,
    Technique::StepBack,
    Technique::ChainOfThought,
    Technique::SelfConsistency,
    Technique::TreeOfThoughts,
    Technique::Ape,
    Technique::CodePrompting,
  ];

  /// Snake-case name; also the stem of the scenario file.
  pub fn slug(self) -> &'static str {
    match self {
      Technique::ZeroShot => "zero_shot",
      Technique::FewShot => "few_shot",
      Technique::RolePrompting => "role_prompting",
      Technique::SystemPrompting => "system_prompting",
      Technique::Contextual => "contextual",
      Technique::StepBack => "step_back",
      Technique::ChainOfThought => "chain_of_thought",
      Technique::SelfConsistency => "self_consistency",
      Technique::TreeOfThoughts => "tree_of_thoughts",
      Technique::Ape => "ape",
      Technique::CodePrompting => "code_prompting",
    }
  }

  /// Identifier reported on completion and kept in the completed set.
  pub fn module_name(self) -> &'static str {
    match self {
      Technique::ZeroShot => "EnergyConversionModule",
      Technique::FewShot => "FewShotModule",
      Technique::RolePrompting => "RolePromptingModule",
      Technique::SystemPrompting => "SystemPromptingModule",
      Technique::Contextual => "ContextualPromptingModule",
      Technique::StepBack => "StepBackPromptingModule",
      Technique::ChainOfThought => "CoTPromptingModule",
      Technique::SelfConsistency => "SelfConsistencyPromptingModule",
      Technique::TreeOfThoughts => "ToTPromptingModule",
      Technique::Ape => "APEModule",
      Technique::CodePrompting => "CodePromptingModule",
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      Technique::ZeroShot => "Zero-Shot Prompting",
      Technique::FewShot => "Few-Shot Prompting",
      Technique::RolePrompting => "Role Prompting",
      Technique::SystemPrompting => "System Prompting",
      Technique::Contextual => "Contextual Prompting",
      Technique::StepBack => "Step-Back Prompting",
      Technique::ChainOfThought => "Chain of Thought",
      Technique::SelfConsistency => "Self-Consistency",
      Technique::TreeOfThoughts => "Tree of Thoughts",
      Technique::Ape => "Automatic Prompt Engineering",
      Technique::CodePrompting => "Code Prompting",
    }
  }

  /// Minimum heuristic score (out of 10) for a submission to pass.
  pub fn pass_threshold(self) -> u32 {
    match self {
      Technique::ZeroShot | Technique::SelfConsistency => 5,
      Technique::FewShot | Technique::RolePrompting | Technique::ChainOfThought => 7,
      Technique::SystemPrompting
      | Technique::Contextual
      | Technique::StepBack
      | Technique::TreeOfThoughts
      | Technique::Ape
      | Technique::CodePrompting => 8,
    }
  }

  /// Grading criteria used when a scenario asks for LLM evaluation without its own.
  pub fn default_criteria(self) -> &'static str {
    match self {
      Technique::ZeroShot => "The prompt states the value, its unit, the conversion to perform and the target unit, with no examples.",
      Technique::FewShot => "The prompt gives at least one input/output example and then the new input to process.",
      Technique::RolePrompting => "The prompt assigns the model the required role and states the task for that role.",
      Technique::SystemPrompting => "The prompt sets the required system constraint as a standing instruction and states the task.",
      Technique::Contextual => "The prompt supplies the given context and asks the question that depends on it.",
      Technique::StepBack => "The prompt first asks a general, higher-level question and then applies it to the specific task.",
      Technique::ChainOfThought => "Evaluate if the prompt effectively asks for step-by-step reasoning towards the task solution.",
      Technique::SelfConsistency => "The prompt asks for reasoning that can be sampled several times and compared for a majority answer.",
      Technique::TreeOfThoughts => "The prompt asks for several distinct solution paths for the task and for those paths to be evaluated.",
      Technique::Ape => "The prompt asks the model to generate several alternative prompts for the task and pick the best one.",
      Technique::CodePrompting => "The prompt states the coding goal, the concrete task details and the programming language.",
    }
  }

  /// Feedback shown before the first submission.
  pub fn ready_message(self) -> String {
    format!("Ready for the {} challenge!", self.display_name())
  }

  #[cfg(test)]
  pub fn from_slug(slug: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.slug() == slug)
  }
}

impl std::fmt::Display for Technique {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.module_name())
  }
}

/// How a scenario wants to be graded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicKind {
  #[default]
  KeywordCheck,
  LlmEvaluation,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvaluationLogic {
  #[serde(default, rename = "type")]
  pub kind: LogicKind,
  #[serde(default)] pub criteria: Option<String>,
  #[serde(default)] pub keywords: Vec<String>,
  #[serde(default)] pub requires_language: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Example {
  pub input: String,
  pub output: String,
}

/// One challenge. Immutable once loaded; modules hold it behind an `Arc`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
  pub id: String,
  pub title: String,
  pub description: String,

  #[serde(default)] pub level: Option<u32>,
  #[serde(default)] pub domain: Option<String>,
  #[serde(default)] pub task: Option<String>,
  #[serde(default)] pub task_input: Option<String>,
  #[serde(default)] pub target_unit: Option<String>,

  // Technique-specific
  #[serde(default)] pub required_role: Option<String>,
  #[serde(default)] pub system_constraint: Option<String>,
  #[serde(default)] pub context: Option<String>,
  #[serde(default)] pub step_back_question_hint: Option<String>,
  #[serde(default)] pub specific_task: Option<String>,
  #[serde(default)] pub examples: Vec<Example>,
  #[serde(default)] pub evaluation_keywords: Vec<String>,

  #[serde(default)] pub hints: Vec<String>,
  #[serde(default)] pub success_message: Option<String>,
  #[serde(default)] pub prompt_template: Option<String>,
  #[serde(default)] pub evaluation_logic: Option<EvaluationLogic>,
}

impl Scenario {
  /// Minimal scenario with only the required fields set.
  pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      description: description.into(),
      level: None,
      domain: None,
      task: None,
      task_input: None,
      target_unit: None,
      required_role: None,
      system_constraint: None,
      context: None,
      step_back_question_hint: None,
      specific_task: None,
      examples: Vec::new(),
      evaluation_keywords: Vec::new(),
      hints: Vec::new(),
      success_message: None,
      prompt_template: None,
      evaluation_logic: None,
    }
  }

  /// Keywords the prompt must mention: logic keywords win over the flat list.
  pub fn keywords(&self) -> &[String] {
    match &self.evaluation_logic {
      Some(logic) if !logic.keywords.is_empty() => &logic.keywords,
      _ => &self.evaluation_keywords,
    }
  }

  /// The text describing what the prompt should get done, most specific first.
  pub fn task_text(&self) -> Option<&str> {
    self.task_input.as_deref()
      .or(self.specific_task.as_deref())
      .or(self.task.as_deref())
      .filter(|s| !s.trim().is_empty())
  }

  /// Whether the scenario carries anything a prompt can be judged against.
  /// Title and description alone are not criteria.
  pub fn has_criteria(&self) -> bool {
    let present = |f: &Option<String>| f.as_deref().is_some_and(|v| !v.trim().is_empty());
    [
      &self.task,
      &self.task_input,
      &self.target_unit,
      &self.required_role,
      &self.system_constraint,
      &self.context,
      &self.step_back_question_hint,
      &self.specific_task,
    ]
    .into_iter()
    .any(present)
      || !self.examples.is_empty()
      || !self.evaluation_keywords.is_empty()
      || self.evaluation_logic.is_some()
  }

  pub fn wants_llm(&self) -> bool {
    matches!(&self.evaluation_logic, Some(l) if l.kind == LogicKind::LlmEvaluation)
  }

  pub fn requires_language(&self) -> bool {
    self.evaluation_logic.as_ref().map(|l| l.requires_language).unwrap_or(false)
  }
}

/// Who decided the final verdict of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
  Heuristic,
  Llm,
  /// Grading was requested but failed; the heuristic verdict stands.
  HeuristicFallback,
}

/// Result record of scoring one submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
  pub score: u32,
  pub passed: bool,
  pub feedback: Vec<String>,
  pub source: GradeSource,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

impl Evaluation {
  pub fn no_criteria() -> Self {
    Self {
      score: 0,
      passed: false,
      feedback: vec!["no criteria defined".into()],
      source: GradeSource::Heuristic,
      note: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugs_round_trip_and_are_unique() {
    for t in Technique::ALL {
      assert_eq!(Technique::from_slug(t.slug()), Some(t));
    }
    let mut names: Vec<_> = Technique::ALL.iter().map(|t| t.module_name()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), Technique::ALL.len());
  }

  #[test]
  fn scenario_parses_with_only_required_fields() {
    let s: Scenario = serde_json::from_str(r#"{"id":"a","title":"T","description":"D","unknown":1}"#).unwrap();
    assert_eq!(s.id, "a");
    assert!(s.keywords().is_empty());
    assert!(!s.wants_llm());
    assert!(!s.has_criteria());
  }

  #[test]
  fn blank_fields_are_not_criteria() {
    let blank = Scenario { task: Some("  ".into()), ..Scenario::new("a", "T", "D") };
    assert!(!blank.has_criteria());
    let role = Scenario { required_role: Some("Energy Expert".into()), ..Scenario::new("a", "T", "D") };
    assert!(role.has_criteria());
    let logic = Scenario { evaluation_logic: Some(EvaluationLogic::default()), ..Scenario::new("a", "T", "D") };
    assert!(logic.has_criteria());
  }

  #[test]
  fn logic_keywords_take_precedence() {
    let s: Scenario = serde_json::from_str(
      r#"{"id":"a","title":"T","description":"D",
          "evaluation_keywords":["flat"],
          "evaluation_logic":{"type":"llm_evaluation","keywords":["logic"]}}"#,
    ).unwrap();
    assert_eq!(s.keywords(), ["logic".to_string()]);
    assert!(s.wants_llm());
  }
}
