use serde::{Deserialize, Serialize};

use crate::operation::Operation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub name: String,
  #[serde(default)]
  pub inputs: Vec<InputDef>,
  #[serde(default)]
  pub outputs: Vec<String>,
  pub operation: Operation,
}

/// An input is either a bare resource name or an object that can mark it
/// as variadic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputDef {
  Name(String),
  Detailed {
    name: String,
    #[serde(default)]
    variadic: bool,
  },
}

impl InputDef {
  pub fn name(&self) -> &str {
    match self {
      InputDef::Name(name) => name,
      InputDef::Detailed { name, .. } => name,
    }
  }

  pub fn is_variadic(&self) -> bool {
    matches!(self, InputDef::Detailed { variadic: true, .. })
  }
}
