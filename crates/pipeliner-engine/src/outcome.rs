use pipeliner_store::Value;

/// Result of invoking a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
  /// The step did not run because `resource`, one of its outputs, was
  /// already resolved or being produced elsewhere.
  Skipped { resource: String },

  /// The step ran. Holds the raw return value for steps without outputs,
  /// otherwise a JSON array with one value per declared output.
  Completed(Value),
}

impl StepOutcome {
  pub fn is_skipped(&self) -> bool {
    matches!(self, StepOutcome::Skipped { .. })
  }

  pub fn value(&self) -> Option<&Value> {
    match self {
      StepOutcome::Completed(value) => Some(value),
      StepOutcome::Skipped { .. } => None,
    }
  }

  pub fn into_value(self) -> Option<Value> {
    match self {
      StepOutcome::Completed(value) => Some(value),
      StepOutcome::Skipped { .. } => None,
    }
  }
}
