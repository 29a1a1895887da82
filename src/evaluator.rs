//! Prompt evaluation: deterministic keyword heuristics per technique, plus an
//! optional LLM verdict for scenarios that ask for one.
//!
//! Every check is a case-insensitive substring test against the trimmed,
//! lower-cased prompt. Points are additive on a 10-point scale and a
//! submission passes when it reaches `Technique::pass_threshold`.
//!
//! `evaluate` is the only async entry point. It always computes the heuristic
//! verdict first; the grader can only veto or confirm a passing heuristic,
//! and any grading failure leaves the heuristic verdict untouched.

use tracing::{debug, instrument, warn};

use crate::domain::{Evaluation, GradeSource, Scenario, Technique};
use crate::energy::{convert, extract_energy_values, format_value, EnergyUnit};
use crate::grader::GradingContext;
use crate::util::{contains_all, contains_any, coverage, normalize, significant_words};

const ROLE_PHRASES: &[&str] = &[
  "act as", "you are ", "you're ", "role:", "persona:", "take on the role", "play the role", "pretend to be",
];
const AUDIENCE_CUES: &[&str] = &[
  "audience", "for a ", "to a ", "format", "tone", "bullet", "in simple terms", "concise", "beginner", "student",
];
const ACTION_WORDS: &[&str] = &["convert", "calculate", "what is", "how many", "compute", "express"];
const DIRECTIVE_CUES: &[&str] = &["must", "always", "never", "only", "do not", "don't", "system:", "rule"];
const STEP_BACK_CUES: &[&str] = &["step back", "general principles", "fundamentals", "in general", "before we", "first, what"];
const COT_CUES: &[&str] = &[
  "step-by-step", "step by step", "think step", "reasoning", "show your work", "explain each step", "walk through",
];
const SC_REASONING_CUES: &[&str] = &["step by step", "step-by-step", "explain why", "reasoning", "think through"];
const SC_SAMPLING_CUES: &[&str] = &[
  "multiple", "several", "majority", "consistent", "compare", "different ways", "times", "most common", "vote",
];
const TOT_OPTION_CUES: &[&str] = &[
  "options", "paths", "branches", "ways", "different approaches", "strategies", "explore", "several", "multiple", "alternatives",
];
const TOT_EVALUATE_CUES: &[&str] = &["evaluate", "compare", "pros and cons", "best", "backtrack", "rank", "assess"];
const APE_VARIATION_CUES: &[&str] = &[
  "variation", "different ways", "rephrase", "alternative prompt", "alternatives", "ways to ask", "versions",
];
const APE_SELECT_CUES: &[&str] = &["best", "rank", "score", "evaluate", "select", "choose", "pick"];
const CODE_INTENT_CUES: &[&str] = &[
  "generate", "write", "function", "script", "code", "explain", "debug", "fix", "implement", "refactor", "what does",
];
const LANGUAGES: &[&str] = &[
  "javascript", "typescript", "python", "java", "c#", "c++", "rust", "golang", "php", "ruby", "swift", "kotlin",
];
const COUNT_WORDS: &[&str] = &["two", "three", "four", "five", "six", "ten", "several", "multiple"];

/// Accumulates points and feedback lines for one submission.
struct Scorecard {
  score: u32,
  feedback: Vec<String>,
}

impl Scorecard {
  fn new() -> Self {
    Self { score: 0, feedback: Vec::new() }
  }

  fn check(&mut self, ok: bool, points: u32, pass: impl Into<String>, fail: impl Into<String>) {
    if ok {
      self.award(points, pass);
    } else {
      let fail: String = fail.into();
      self.feedback.push(format!("{fail} ✘"));
    }
  }

  fn award(&mut self, points: u32, line: impl Into<String>) {
    let line: String = line.into();
    self.score += points;
    self.feedback.push(format!("{line} ✔"));
  }

  fn finish(self, technique: Technique) -> Evaluation {
    Evaluation {
      passed: self.score >= technique.pass_threshold(),
      score: self.score,
      feedback: self.feedback,
      source: GradeSource::Heuristic,
      note: None,
    }
  }
}

/// Synchronous heuristic verdict. Pure: same input, same output.
pub fn evaluate_heuristic(technique: Technique, text: &str, scenario: Option<&Scenario>) -> Evaluation {
  let Some(s) = scenario.filter(|s| s.has_criteria()) else {
    return Evaluation::no_criteria();
  };
  let p = normalize(text);
  let card = match technique {
    Technique::ZeroShot => zero_shot(&p, s),
    Technique::FewShot => few_shot(&p, s),
    Technique::RolePrompting => role(&p, s),
    Technique::SystemPrompting => system(&p, s),
    Technique::Contextual => contextual(&p, s),
    Technique::StepBack => step_back(&p, s),
    Technique::ChainOfThought => chain_of_thought(&p, s),
    Technique::SelfConsistency => self_consistency(&p, s),
    Technique::TreeOfThoughts => tree_of_thoughts(&p, s),
    Technique::Ape => ape(&p, s),
    Technique::CodePrompting => code(&p, s),
  };
  card.finish(technique)
}

/// Full evaluation: heuristics, then the grader when the scenario wants one
/// and the heuristic already passed.
#[instrument(level = "info", skip_all,
             fields(technique = technique.slug(), scenario = scenario.map(|s| s.id.as_str()), text_len = text.len()))]
pub async fn evaluate(
  technique: Technique,
  text: &str,
  scenario: Option<&Scenario>,
  grading: Option<&GradingContext>,
) -> Evaluation {
  let heuristic = evaluate_heuristic(technique, text, scenario);
  let Some(s) = scenario else { return heuristic };
  if !heuristic.passed || !s.wants_llm() {
    return heuristic;
  }

  let Some(ctx) = grading else {
    debug!(target: "grader", scenario = %s.id, "LLM evaluation requested but no grader configured");
    return Evaluation {
      source: GradeSource::HeuristicFallback,
      note: Some("LLM check skipped: no grader configured.".into()),
      ..heuristic
    };
  };

  let criteria = s
    .evaluation_logic
    .as_ref()
    .and_then(|l| l.criteria.as_deref())
    .unwrap_or_else(|| technique.default_criteria());

  match ctx.grade(text, criteria).await {
    Ok(verdict) => {
      let mut out = heuristic;
      out.source = GradeSource::Llm;
      out.passed = verdict.success;
      out.feedback.push(verdict.feedback);
      out
    }
    Err(e) => {
      warn!(target: "grader", scenario = %s.id, error = %e, "LLM evaluation failed; keeping heuristic verdict");
      Evaluation {
        source: GradeSource::HeuristicFallback,
        note: Some(format!("LLM check skipped: {e}")),
        ..heuristic
      }
    }
  }
}

// -------- Per-technique heuristics --------

fn zero_shot(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  match extract_energy_values(&s.description).first() {
    Some(v) => {
      let value = format_value(v.value);
      card.check(mentions_number(p, &value), 3, format!("Includes input value ({value})"), format!("Missing input value ({value})"));
      card.check(
        v.unit.mentioned_in(p),
        3,
        format!("Includes input unit ({})", v.unit),
        format!("Missing input unit ({})", v.unit),
      );
    }
    None => {
      let words = s.task_text().map(significant_words).unwrap_or_else(|| significant_words(&s.description));
      card.check(covers_half(p, &words), 6, "Describes the task", "Describe what should be computed");
    }
  }
  card.check(contains_any(p, ACTION_WORDS), 2, "Specifies the action", "Say what to do (e.g. 'convert')");

  let target = s.target_unit.as_deref().unwrap_or("J");
  let named = match EnergyUnit::parse(target) {
    Some(unit) => unit.mentioned_in(p),
    None => p.contains(&target.to_lowercase()),
  };
  card.check(named, 2, format!("Specifies target unit ({target})"), format!("Name the target unit ({target})"));

  if let Some(v) = extract_energy_values(&s.description).first() {
    if let Ok(expected) = convert(v.value, v.unit.symbol(), target) {
      card.feedback.push(format!("Reference: {} = {} {target}", v.raw, format_value(expected)));
    }
  }
  card
}

fn few_shot(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  let shows_example = contains_any(p, &["example", "e.g."])
    || (p.contains("input:") && p.contains("output:"))
    || s.examples.iter().any(|e| p.contains(&normalize(&e.output)));
  card.check(shows_example, 5, "Includes examples", "Include at least one example (Input/Output pair)");

  match s.task_input.as_deref() {
    Some(ti) => {
      let words = significant_words(ti);
      let present = p.contains(&normalize(ti)) || coverage(p, &words) == Some(1.0);
      card.check(present, 5, "Includes task input", format!("Missing task input ('{ti}')"));
    }
    None => card.award(5, "No specific task input required"),
  }
  card
}

fn role(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  let assigns = contains_any(p, ROLE_PHRASES);
  match s.required_role.as_deref() {
    Some(required) => {
      let named = p.contains(&normalize(required));
      if assigns && named {
        card.award(5, format!("Role declared: {required}"));
      } else if assigns {
        card.score += 2;
        card.feedback.push(format!("Declare the role explicitly, e.g. 'Act as {required}' ✘"));
      } else {
        card.feedback.push(format!("Assign the role '{required}' (e.g. 'Act as {required}') ✘"));
      }
    }
    None => card.check(assigns, 5, "Role assigned", "Assign a role (e.g. 'Act as a...')"),
  }

  check_task(&mut card, p, s, 3);
  card.check(contains_any(p, AUDIENCE_CUES), 2, "Sets audience or format", "Consider naming the audience or format");
  card
}

fn system(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  match s.system_constraint.as_deref() {
    Some(c) => {
      let verbatim = p.contains(normalize(c).trim_end_matches('.'));
      let cov = coverage(p, &significant_words(c)).unwrap_or(0.0);
      if verbatim || cov >= 1.0 {
        card.award(6, "System constraint included");
      } else if cov >= 0.5 {
        card.score += 3;
        card.feedback.push(format!("Constraint only partly included ('{c}') ✘"));
      } else {
        card.feedback.push(format!("Include the system constraint ('{c}') ✘"));
      }
    }
    None => card.award(6, "No specific constraint required"),
  }
  card.check(contains_any(p, DIRECTIVE_CUES), 2, "Phrased as a standing rule", "Phrase the constraint as a rule ('You must...')");
  check_task(&mut card, p, s, 2);
  card
}

fn contextual(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  let (context, task) = resolve_context(s);

  match context.as_deref() {
    Some(c) => {
      let first: Vec<String> = significant_words(c).into_iter().take(5).collect();
      let lead = normalize(c);
      let by_words = !first.is_empty() && contains_all(p, &first);
      let by_lead = lead.chars().count() > 20 && p.contains(&lead.chars().take(20).collect::<String>());
      card.check(by_words || by_lead, 5, "Context included", "Include or reference the provided context");
    }
    None => card.award(5, "No context required"),
  }

  match task.as_deref() {
    Some(t) => {
      let first: Vec<String> = significant_words(t).into_iter().take(5).collect();
      let cov = coverage(p, &first).unwrap_or(1.0);
      if cov >= 1.0 {
        card.award(5, "Main question stated");
      } else if cov >= 0.5 {
        card.score += 2;
        card.feedback.push("Main question only partly stated ✘".into());
      } else {
        card.feedback.push("State the main question or task clearly ✘".into());
      }
    }
    None => card.award(5, "No specific question required"),
  }
  card
}

fn step_back(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  let asks_general = p.contains('?') || contains_any(p, STEP_BACK_CUES);
  let hint = s.step_back_question_hint.as_deref();
  let on_topic = hint.map(|h| covers_half(p, &significant_words(h))).unwrap_or(true);
  card.check(
    asks_general && on_topic,
    5,
    "Asks a general step-back question",
    format!("First ask a general question about '{}'", hint.unwrap_or("the underlying principles")),
  );

  match s.specific_task.as_deref().or(s.task_text()) {
    Some(t) => {
      let first: Vec<String> = significant_words(t).into_iter().take(3).collect();
      card.check(covers_half(p, &first), 5, "Applies it to the specific task", format!("Then ask for the specific task ('{t}')"));
    }
    None => card.award(5, "No specific task required"),
  }
  card
}

fn chain_of_thought(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  card.check(contains_any(p, COT_CUES), 5, "Asks for step-by-step reasoning", "Ask the model to show its reasoning step by step");
  check_keywords_or_task(&mut card, p, s, 5);
  card
}

fn self_consistency(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  card.check(
    contains_any(p, SC_REASONING_CUES),
    5,
    "Asks for reasoning suited to sampling",
    "Ask for reasoning (e.g. 'step by step' or 'explain why')",
  );
  card.check(
    contains_any(p, SC_SAMPLING_CUES),
    3,
    "Mentions sampling several answers",
    "Consider asking for several answers and the majority",
  );
  check_task(&mut card, p, s, 2);
  card
}

fn tree_of_thoughts(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  card.check(contains_any(p, TOT_OPTION_CUES), 5, "Asks for multiple paths", "Ask for multiple options, paths or branches");
  check_keywords_or_task(&mut card, p, s, 3);
  card.check(contains_any(p, TOT_EVALUATE_CUES), 2, "Asks to evaluate the branches", "Ask the model to compare the options");
  card
}

fn ape(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  let variations = contains_any(p, APE_VARIATION_CUES) || asks_generate_n(p);
  card.check(variations, 5, "Asks for prompt variations", "Ask to generate several variations (e.g. 'generate 5 variations')");
  check_keywords_or_task(&mut card, p, s, 3);
  card.check(contains_any(p, APE_SELECT_CUES), 2, "Asks to pick the best", "Ask the model to rank or pick the best variation");
  card
}

fn code(p: &str, s: &Scenario) -> Scorecard {
  let mut card = Scorecard::new();
  card.check(contains_any(p, CODE_INTENT_CUES), 2, "Coding goal stated", "State the coding goal (generate, explain, debug...)");
  check_keywords_or_task(&mut card, p, s, 5);
  if s.requires_language() {
    card.check(names_language(p), 3, "Programming language specified", "Specify the programming language");
  } else {
    card.award(3, "No language requirement");
  }
  card
}

// -------- Shared checks --------

/// Task coverage of at least half its significant words; keywords win when present.
fn check_task(card: &mut Scorecard, p: &str, s: &Scenario, points: u32) {
  let words: Vec<String> = if s.keywords().is_empty() {
    s.task_text().map(significant_words).unwrap_or_default()
  } else {
    s.keywords().iter().map(|k| k.to_lowercase()).collect()
  };
  if words.is_empty() {
    card.award(points, "No specific task required");
  } else {
    card.check(covers_half(p, &words), points, "Task included", "Include the task itself in the prompt");
  }
}

/// All keywords must be present; without keywords fall back to task coverage.
fn check_keywords_or_task(card: &mut Scorecard, p: &str, s: &Scenario, points: u32) {
  let keywords = s.keywords();
  if keywords.is_empty() {
    return check_task(card, p, s, points);
  }
  let missing: Vec<&str> = keywords
    .iter()
    .filter(|k| !p.contains(&k.to_lowercase()))
    .map(String::as_str)
    .collect();
  card.check(
    missing.is_empty(),
    points,
    "Key task details included",
    format!("Missing key concepts: {}", missing.join(", ")),
  );
}

fn covers_half(p: &str, words: &[String]) -> bool {
  coverage(p, words).map(|c| c >= 0.5).unwrap_or(true)
}

/// "100" matches "100", "100kwh" or "100." but not "1000".
fn mentions_number(p: &str, value: &str) -> bool {
  p.split(|c: char| !(c.is_alphanumeric() || c == '.'))
    .map(|t| t.trim_end_matches('.'))
    .any(|t| match t.strip_prefix(value) {
      Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit() || c == '.'),
      None => false,
    })
}

fn asks_generate_n(p: &str) -> bool {
  let words: Vec<&str> = p.split_whitespace().collect();
  words.windows(2).any(|w| {
    w[0] == "generate" && (w[1].chars().all(|c| c.is_ascii_digit()) || COUNT_WORDS.contains(&w[1]))
  })
}

/// "go" alone is an ordinary verb; it only counts next to a language cue.
fn names_language(p: &str) -> bool {
  let tokens: Vec<&str> = p
    .split(|c: char| c.is_whitespace() || ",.;:!?()'\"".contains(c))
    .filter(|t| !t.is_empty())
    .collect();
  tokens.iter().any(|t| LANGUAGES.contains(t))
    || tokens.windows(2).any(|w| match (w[0], w[1]) {
      ("in" | "using", "go") => true,
      ("go", next) => matches!(next, "language" | "code" | "program" | "programming"),
      _ => false,
    })
}

/// Context and question, taken from dedicated fields or from a task written
/// as "Context: ... Question: ...".
fn resolve_context(s: &Scenario) -> (Option<String>, Option<String>) {
  if let Some(c) = s.context.as_deref().filter(|c| !c.trim().is_empty()) {
    return (Some(c.to_string()), s.task_text().map(str::to_string));
  }
  match s.task.as_deref() {
    Some(t) => split_context(t),
    None => (None, s.task_text().map(str::to_string)),
  }
}

pub fn split_context(task: &str) -> (Option<String>, Option<String>) {
  const CONTEXT: &str = "Context:";
  let Some(ctx_at) = task.find(CONTEXT) else {
    return (None, Some(strip_task_marker(task)));
  };
  let after = &task[ctx_at + CONTEXT.len()..];
  let marker = ["Question:", "Your Task:"]
    .iter()
    .filter_map(|m| after.find(m).map(|idx| (idx, *m)))
    .min_by_key(|(idx, _)| *idx);
  match marker {
    Some((idx, m)) => {
      let context = after[..idx].trim().to_string();
      let question = after[idx + m.len()..].trim().to_string();
      (Some(context), (!question.is_empty()).then_some(question))
    }
    None => (Some(after.trim().to_string()), None),
  }
}

fn strip_task_marker(task: &str) -> String {
  let t = task.trim();
  for m in ["Question:", "Your Task:"] {
    if let Some(rest) = t.strip_prefix(m) {
      return rest.trim().to_string();
    }
  }
  t.to_string()
}
