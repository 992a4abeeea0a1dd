//! The work function bound to a step.

use std::future::Future;

use async_trait::async_trait;

use crate::Value;
use crate::args::StepArgs;

/// Error type returned by work functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The unit of work a step performs once its inputs are resolved.
///
/// Steps with no outputs may return any value; a step with one output
/// returns that output's value; a step with several outputs returns a JSON
/// array holding exactly one value per declared output.
///
/// Async closures taking [`StepArgs`] implement this trait directly.
#[async_trait]
pub trait Work: Send + Sync {
  async fn run(&self, args: StepArgs) -> Result<Value, BoxError>;
}

#[async_trait]
impl<F, Fut> Work for F
where
  F: Fn(StepArgs) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
  async fn run(&self, args: StepArgs) -> Result<Value, BoxError> {
    (self)(args).await
  }
}
