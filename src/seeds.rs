//! Built-in fallback content.

use crate::domain::{EvaluationLogic, Example, Scenario, Technique};

/// Absolute last-resort scenario: substituted when a technique's scenario
/// data cannot be loaded, so the level stays playable.
pub fn fallback_scenario(technique: Technique) -> Scenario {
  let id = format!("fallback_{}_1", technique.slug());
  match technique {
    Technique::ZeroShot => Scenario {
      task_input: Some("Convert 100 kWh to joules.".into()),
      ..Scenario::new(id, "Fallback Zero-Shot", "A battery bank stores 100 kWh. Ask the model to convert it to joules, without examples.")
    },
    Technique::FewShot => Scenario {
      examples: vec![Example { input: "Location: London, UK.".into(), output: "Optimal Tilt: 35 degrees.".into() }],
      task_input: Some("Location: Cairo, Egypt.".into()),
      ..Scenario::new(id, "Fallback Few-Shot", "Optimize solar panel tilt angle. Show the example, then ask for: Location: Cairo, Egypt.")
    },
    Technique::RolePrompting => Scenario {
      required_role: Some("Energy Expert".into()),
      task_input: Some("Explain solar power.".into()),
      ..Scenario::new(id, "Fallback Role Prompt", "Define a role for the AI, then give it the task.")
    },
    Technique::SystemPrompting => Scenario {
      system_constraint: Some("Answer in exactly three bullet points".into()),
      task_input: Some("Summarize the benefits of wind energy.".into()),
      ..Scenario::new(id, "Fallback System Prompt", "Define system constraints for the model.")
    },
    Technique::Contextual => Scenario {
      context: Some("Our office switched to LED lighting last month.".into()),
      task: Some("Estimate the change in the electricity bill.".into()),
      ..Scenario::new(id, "Fallback Contextual Prompt", "Give the model the context it needs, then ask the question.")
    },
    Technique::StepBack => Scenario {
      step_back_question_hint: Some("Grid stability principles".into()),
      specific_task: Some("Plan battery storage for a solar farm.".into()),
      ..Scenario::new(id, "Fallback Step-Back", "First ask a general question, then the specific one.")
    },
    Technique::ChainOfThought => Scenario {
      task: Some("How many panels of 400 W are needed for 10 kW?".into()),
      evaluation_keywords: vec!["panels".into()],
      ..Scenario::new(id, "Fallback Chain of Thought", "Ask the model to reason step by step.")
    },
    Technique::SelfConsistency => Scenario {
      task_input: Some("Classify complex text.".into()),
      ..Scenario::new(id, "Fallback Self-Consistency", "Run the prompt several times and take the majority answer.")
    },
    Technique::TreeOfThoughts => Scenario {
      task: Some("Reduce a factory's energy use by 20%.".into()),
      ..Scenario::new(id, "Fallback Tree of Thoughts", "Ask the model to explore several solution paths.")
    },
    Technique::Ape => Scenario {
      task: Some("Ask for tomorrow's weather in London.".into()),
      ..Scenario::new(id, "Fallback APE", "Ask the model to generate alternative prompts for a task.")
    },
    Technique::CodePrompting => Scenario {
      evaluation_logic: Some(EvaluationLogic {
        keywords: vec!["factorial".into()],
        requires_language: true,
        ..EvaluationLogic::default()
      }),
      task: Some("Write a function that computes a factorial.".into()),
      ..Scenario::new(id, "Fallback Code Prompt", "Ask the model to write code for a small task.")
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_technique_has_a_fallback() {
    for t in Technique::ALL {
      let s = fallback_scenario(t);
      assert!(s.id.starts_with("fallback_"));
      assert!(!s.title.is_empty() && !s.description.is_empty());
    }
  }
}
