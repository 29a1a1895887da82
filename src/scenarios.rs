//! Scenario store: where each technique's ordered scenario list comes from.
//!
//! Sources only read; scenarios are immutable after load. A failed load is
//! reported as `LoadError` and the caller substitutes `seeds::fallback_scenario`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::domain::{Scenario, Technique};
use crate::error::LoadError;

pub trait ScenarioSource: Send + Sync {
  /// Ordered scenarios for `technique`; order is difficulty order.
  fn load(&self, technique: Technique) -> Result<Vec<Scenario>, LoadError>;
}

/// Reads `<dir>/<slug>.json`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
  dir: PathBuf,
}

impl DirectorySource {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn path_for(&self, technique: Technique) -> PathBuf {
    self.dir.join(format!("{}.json", technique.slug()))
  }
}

impl ScenarioSource for DirectorySource {
  #[instrument(level = "debug", skip(self), fields(technique = technique.slug()))]
  fn load(&self, technique: Technique) -> Result<Vec<Scenario>, LoadError> {
    let path = self.path_for(technique);
    let text = std::fs::read_to_string(&path)
      .map_err(|source| LoadError::Unreachable { path: path.clone(), source })?;
    let scenarios = parse_scenarios(technique, &text)?;
    debug!(target: "scenarios", path = %path.display(), count = scenarios.len(), "Loaded scenario file");
    Ok(scenarios)
  }
}

/// Scenario set compiled into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundledSource;

impl BundledSource {
  fn raw(technique: Technique) -> &'static str {
    match technique {
      Technique::ZeroShot => include_str!("../data/scenarios/zero_shot.json"),
      Technique::FewShot => include_str!("../data/scenarios/few_shot.json"),
      Technique::RolePrompting => include_str!("../data/scenarios/role_prompting.json"),
      Technique::SystemPrompting => include_str!("../data/scenarios/system_prompting.json"),
      Technique::Contextual => include_str!("../data/scenarios/contextual.json"),
      Technique::StepBack => include_str!("../data/scenarios/step_back.json"),
      Technique::ChainOfThought => include_str!("../data/scenarios/chain_of_thought.json"),
      Technique::SelfConsistency => include_str!("../data/scenarios/self_consistency.json"),
      Technique::TreeOfThoughts => include_str!("../data/scenarios/tree_of_thoughts.json"),
      Technique::Ape => include_str!("../data/scenarios/ape.json"),
      Technique::CodePrompting => include_str!("../data/scenarios/code_prompting.json"),
    }
  }
}

impl ScenarioSource for BundledSource {
  fn load(&self, technique: Technique) -> Result<Vec<Scenario>, LoadError> {
    parse_scenarios(technique, Self::raw(technique))
  }
}

/// In-memory scenarios, mostly for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
  by_technique: HashMap<Technique, Vec<Scenario>>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, technique: Technique, scenarios: Vec<Scenario>) -> Self {
    self.by_technique.insert(technique, scenarios);
    self
  }
}

impl ScenarioSource for MemorySource {
  fn load(&self, technique: Technique) -> Result<Vec<Scenario>, LoadError> {
    let scenarios = self.by_technique.get(&technique).cloned().ok_or(LoadError::Missing(technique))?;
    validate(technique, &scenarios)?;
    Ok(scenarios)
  }
}

/// Parse and validate a JSON array of scenarios.
pub fn parse_scenarios(technique: Technique, text: &str) -> Result<Vec<Scenario>, LoadError> {
  let scenarios: Vec<Scenario> =
    serde_json::from_str(text).map_err(|source| LoadError::Malformed { technique, source })?;
  validate(technique, &scenarios)?;
  Ok(scenarios)
}

/// Required: non-empty list, non-blank id/title/description, unique ids.
pub fn validate(technique: Technique, scenarios: &[Scenario]) -> Result<(), LoadError> {
  if scenarios.is_empty() {
    return Err(LoadError::Empty(technique));
  }
  let mut seen = HashSet::new();
  for (idx, s) in scenarios.iter().enumerate() {
    for (field, value) in [("id", &s.id), ("title", &s.title), ("description", &s.description)] {
      if value.trim().is_empty() {
        return Err(LoadError::Invalid { technique, reason: format!("scenario #{idx} has a blank {field}") });
      }
    }
    if !seen.insert(s.id.as_str()) {
      return Err(LoadError::Invalid { technique, reason: format!("duplicate scenario id '{}'", s.id) });
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bundled_data_is_valid_for_every_technique() {
    for t in Technique::ALL {
      let scenarios = BundledSource.load(t).unwrap_or_else(|e| panic!("{t}: {e}"));
      assert!(!scenarios.is_empty());
    }
  }

  #[test]
  fn missing_directory_is_unreachable() {
    let src = DirectorySource::new("/definitely/not/here");
    assert!(matches!(src.load(Technique::FewShot), Err(LoadError::Unreachable { .. })));
  }

  #[test]
  fn directory_source_reads_slug_files() {
    let dir = std::env::temp_dir().join(format!("prompt-ninja-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("ape.json"), r#"[{"id":"ape-1","title":"T","description":"D"}]"#).unwrap();
    let src = DirectorySource::new(&dir);
    let scenarios = src.load(Technique::Ape).unwrap();
    assert_eq!(scenarios[0].id, "ape-1");
    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn malformed_and_empty_payloads_are_rejected() {
    assert!(matches!(parse_scenarios(Technique::Ape, "{not json"), Err(LoadError::Malformed { .. })));
    assert!(matches!(parse_scenarios(Technique::Ape, "[]"), Err(LoadError::Empty(Technique::Ape))));
    assert!(matches!(
      parse_scenarios(Technique::Ape, r#"[{"id":"x","title":"T"}]"#),
      Err(LoadError::Malformed { .. })
    ));
  }

  #[test]
  fn blank_fields_and_duplicate_ids_are_invalid() {
    let blank = vec![Scenario::new("a", " ", "d")];
    assert!(matches!(validate(Technique::Ape, &blank), Err(LoadError::Invalid { .. })));
    let dup = vec![Scenario::new("a", "t", "d"), Scenario::new("a", "t2", "d2")];
    assert!(matches!(validate(Technique::Ape, &dup), Err(LoadError::Invalid { .. })));
  }

  #[test]
  fn memory_source_reports_missing_techniques() {
    let src = MemorySource::new().with(Technique::Ape, vec![Scenario::new("a", "t", "d")]);
    assert!(src.load(Technique::Ape).is_ok());
    assert!(matches!(src.load(Technique::CodePrompting), Err(LoadError::Missing(_))));
  }
}
