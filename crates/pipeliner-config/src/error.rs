use thiserror::Error;

/// Errors raised while loading or validating a pipeline definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("invalid pipeline definition: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("pipeline '{pipeline}' has a step with an empty name")]
  EmptyStepName { pipeline: String },

  #[error("step '{step}' is defined more than once")]
  DuplicateStep { step: String },

  #[error("step '{step}' declares '{resource}' more than once")]
  DuplicateResource { step: String, resource: String },

  #[error("step '{step}': {message}")]
  InvalidOperation { step: String, message: String },
}
