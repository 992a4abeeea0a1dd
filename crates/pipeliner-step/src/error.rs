use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StepError {
  #[error("step name must not be empty")]
  EmptyName,

  #[error("step '{step}' has no work function")]
  MissingWork { step: String },

  #[error("step '{step}' declares input '{input}' more than once")]
  DuplicateInput { step: String, input: String },

  #[error("step '{step}' declares output '{output}' more than once")]
  DuplicateOutput { step: String, output: String },
}
