use std::sync::Arc;

use pipeliner_step::StepError;
use pipeliner_store::{SharedError, StoreError};
use thiserror::Error;

/// Errors that can occur while registering or running steps.
///
/// Cloneable so a single failure can be handed to every request awaiting
/// the resources it left unresolved.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
  #[error(
    "output mismatched in step '{step}': expected {expected} return value(s), got {actual}"
  )]
  OutputArityMismatch {
    step: String,
    expected: usize,
    actual: usize,
  },

  #[error(
    "no value or provider for resource '{resource}' (required by {})",
    .required_by.as_deref().unwrap_or("request")
  )]
  MissingProvider {
    resource: String,
    required_by: Option<String>,
  },

  /// The provider of `resource` is skipped because its sibling output
  /// `resolved` already holds a value, so nothing will ever produce it.
  #[error(
    "resource '{resource}' cannot be produced: step '{step}' is skipped because '{resolved}' is already resolved"
  )]
  Unproducible {
    resource: String,
    step: String,
    resolved: String,
  },

  #[error("resource '{resource}' could not be produced: {source}")]
  UpstreamFailure {
    resource: String,
    #[source]
    source: SharedError,
  },

  #[error("step '{step}' failed: {source}")]
  Work {
    step: String,
    #[source]
    source: SharedError,
  },

  #[error("resource '{resource}' is already resolved with a different value")]
  AlreadyResolved { resource: String },

  #[error("dependency cycle: {}", .path.join(" -> "))]
  DependencyCycle { path: Vec<String> },

  #[error("step '{step}' is not registered")]
  UnknownStep { step: String },

  #[error("invalid step: {0}")]
  InvalidStep(#[from] StepError),

  #[error("execution cancelled")]
  Cancelled,

  #[error("request timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },
}

impl PipelineError {
  /// The error that started a chain of upstream failures.
  pub fn root_cause(&self) -> &PipelineError {
    let mut current = self;
    while let PipelineError::UpstreamFailure { source, .. } = current {
      match source.downcast_ref::<PipelineError>() {
        Some(inner) => current = inner,
        None => break,
      }
    }
    current
  }

  /// Wrap a provider's failure as a failure of the resource it owed.
  ///
  /// Cancellation and timeouts pass through unchanged, as does a failure
  /// already attributed to the same resource.
  pub(crate) fn upstream(resource: &str, error: PipelineError) -> PipelineError {
    match error {
      PipelineError::Cancelled | PipelineError::Timeout { .. } => error,
      PipelineError::UpstreamFailure { resource: ref r, .. } if r == resource => error,
      other => PipelineError::UpstreamFailure {
        resource: resource.to_string(),
        source: Arc::new(other),
      },
    }
  }
}

impl From<StoreError> for PipelineError {
  fn from(error: StoreError) -> Self {
    match error {
      StoreError::AlreadyResolved { name } => PipelineError::AlreadyResolved { resource: name },
      StoreError::Failed { name, source } => PipelineError::UpstreamFailure {
        resource: name,
        source,
      },
      StoreError::Abandoned { name, claimant } => PipelineError::UpstreamFailure {
        resource: name.clone(),
        source: Arc::new(StoreError::Abandoned { name, claimant }),
      },
      StoreError::Reset { name } => PipelineError::UpstreamFailure {
        resource: name.clone(),
        source: Arc::new(StoreError::Reset { name }),
      },
    }
  }
}
