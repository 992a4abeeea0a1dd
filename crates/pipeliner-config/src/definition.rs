use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DefinitionError;
use crate::settings::Settings;
use crate::step::StepDef;

/// A complete pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,
  #[serde(default)]
  pub settings: Settings,
  /// Resources supplied before any step runs.
  #[serde(default)]
  pub resources: Map<String, Value>,
  pub steps: Vec<StepDef>,
}

impl PipelineDef {
  /// Parse and validate a definition.
  pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
    let def: PipelineDef = serde_json::from_str(json)?;
    def.validate()?;
    Ok(def)
  }

  /// Check step names are unique and non-empty, that no step repeats an
  /// input or output, and that fixed-arity operations get the inputs they
  /// need.
  pub fn validate(&self) -> Result<(), DefinitionError> {
    let mut names = HashSet::new();
    for step in &self.steps {
      if step.name.trim().is_empty() {
        return Err(DefinitionError::EmptyStepName {
          pipeline: self.name.clone(),
        });
      }
      if !names.insert(step.name.as_str()) {
        return Err(DefinitionError::DuplicateStep {
          step: step.name.clone(),
        });
      }

      let mut inputs = HashSet::new();
      for input in &step.inputs {
        if !inputs.insert(input.name()) {
          return Err(DefinitionError::DuplicateResource {
            step: step.name.clone(),
            resource: input.name().to_string(),
          });
        }
      }

      let mut outputs = HashSet::new();
      for output in &step.outputs {
        if !outputs.insert(output.as_str()) {
          return Err(DefinitionError::DuplicateResource {
            step: step.name.clone(),
            resource: output.clone(),
          });
        }
      }

      if let Some(arity) = step.operation.arity() {
        if arity != step.inputs.len() {
          return Err(DefinitionError::InvalidOperation {
            step: step.name.clone(),
            message: format!(
              "operation takes {arity} input(s), {} declared",
              step.inputs.len()
            ),
          });
        }
      }
    }
    Ok(())
  }

  pub fn step(&self, name: &str) -> Option<&StepDef> {
    self.steps.iter().find(|s| s.name == name)
  }
}
