//! Lazy, memoizing step execution.
//!
//! Invoking a step first checks whether any of its outputs already exists,
//! then atomically claims all of them. Only the claim holder runs the work;
//! everyone else waits on the store. Inputs are resolved concurrently, each
//! one either read from the store, awaited while another invocation
//! produces it, or produced by invoking its provider.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use pipeliner_step::{Step, StepArgs};
use pipeliner_store::{Claim, SlotState, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::events::{PipelineEvent, PipelineNotifier};
use crate::outcome::StepOutcome;
use crate::pipeline::Pipeline;

impl<N: PipelineNotifier> Pipeline<N> {
  /// Invoke a step, skipping it if any of its outputs already exists.
  pub(crate) fn invoke<'a>(
    &'a self,
    step: Arc<Step>,
    cancel: &'a CancellationToken,
  ) -> BoxFuture<'a, Result<StepOutcome, PipelineError>> {
    async move {
      if let Some(resource) = step.outputs().iter().find(|o| self.store.is_ready(o)) {
        return Ok(self.skip(&step, resource));
      }

      let guard = if step.outputs().is_empty() {
        None
      } else {
        match self.store.claim(step.outputs(), step.name()) {
          Claim::Acquired(guard) => Some(guard),
          Claim::Resolved { name } => return Ok(self.skip(&step, &name)),
          Claim::InFlight { name, claimant } => {
            debug!(
              step = %step.name(),
              resource = %name,
              claimant = %claimant,
              "output already in flight, awaiting it"
            );
            self.notifier.notify(PipelineEvent::StepAwaiting {
              step: step.name().to_string(),
              resource: name.clone(),
              claimant,
            });
            self.wait_resource(&name, cancel).await?;
            return Ok(StepOutcome::Skipped { resource: name });
          }
        }
      };

      match self.execute(&step, cancel).await {
        Ok((value, outputs)) => {
          if let Some(guard) = guard {
            if let Err(e) = guard.publish(outputs) {
              let err = PipelineError::from(e);
              self.report_failure(&step, &err);
              return Err(err);
            }
            for output in step.outputs() {
              self.notifier.notify(PipelineEvent::ResourcePublished {
                resource: output.clone(),
                step: step.name().to_string(),
              });
            }
          }
          debug!(step = %step.name(), "step_completed");
          self.notifier.notify(PipelineEvent::StepCompleted {
            step: step.name().to_string(),
          });
          Ok(StepOutcome::Completed(value))
        }
        Err(err) => {
          if let Some(guard) = guard {
            guard.fail(Arc::new(err.clone()));
          }
          self.report_failure(&step, &err);
          Err(err)
        }
      }
    }
    .boxed()
  }

  /// Resolve inputs, run the work function and shape its return value.
  ///
  /// Returns the step's result along with the values to publish, one per
  /// declared output.
  async fn execute(
    &self,
    step: &Step,
    cancel: &CancellationToken,
  ) -> Result<(Value, Vec<Value>), PipelineError> {
    let pending = step
      .inputs()
      .iter()
      .map(|input| self.resolve_resource(&input.name, Some(step.name()), cancel));
    let values = join_all(pending)
      .await
      .into_iter()
      .collect::<Result<Vec<_>, _>>()?;

    let mut args = StepArgs::new();
    for (input, value) in step.inputs().iter().zip(values) {
      if input.variadic {
        args.push_variadic(value);
      } else {
        args.push_named(input.name.clone(), value);
      }
    }

    debug!(step = %step.name(), "calling step");
    self.notifier.notify(PipelineEvent::StepStarted {
      step: step.name().to_string(),
    });

    let raw = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
      result = step.work().run(args) => result.map_err(|e| PipelineError::Work {
        step: step.name().to_string(),
        source: Arc::from(e),
      })?,
    };

    shape_outputs(step, raw)
  }

  /// Produce the value of `resource`, invoking its provider if nothing else
  /// has resolved or claimed it yet.
  pub(crate) fn resolve_resource<'a>(
    &'a self,
    resource: &'a str,
    required_by: Option<&'a str>,
    cancel: &'a CancellationToken,
  ) -> BoxFuture<'a, Result<Value, PipelineError>> {
    async move {
      if let Some(value) = self.store.value(resource) {
        return Ok(value);
      }

      if !self.store.is_pending(resource) {
        let provider = self.registry.provider(resource).cloned().ok_or_else(|| {
          PipelineError::MissingProvider {
            resource: resource.to_string(),
            required_by: required_by.map(str::to_string),
          }
        })?;
        if let Some(step) = required_by {
          debug!(step = %step, resource = %resource, provider = %provider.name(), "waiting for resource");
        }
        let outcome = self
          .invoke(Arc::clone(&provider), cancel)
          .await
          .map_err(|e| PipelineError::upstream(resource, e))?;

        // Skipped over a sibling output: nobody is producing this one.
        if let StepOutcome::Skipped { resource: resolved } = outcome {
          if resolved != resource && matches!(self.store.state(resource), SlotState::Unset) {
            return Err(PipelineError::Unproducible {
              resource: resource.to_string(),
              step: provider.name().to_string(),
              resolved,
            });
          }
        }
      }

      self.wait_resource(resource, cancel).await
    }
    .boxed()
  }

  /// Wait for `resource` to settle, giving up when `cancel` fires.
  pub(crate) async fn wait_resource(
    &self,
    resource: &str,
    cancel: &CancellationToken,
  ) -> Result<Value, PipelineError> {
    let slot = self.store.slot(resource);
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(PipelineError::Cancelled),
      result = slot.wait() => result.map_err(PipelineError::from),
    }
  }

  /// Bound `fut` by the configured request timeout.
  pub(crate) async fn with_deadline<T>(
    &self,
    fut: impl Future<Output = Result<T, PipelineError>>,
  ) -> Result<T, PipelineError> {
    match self.config.request_timeout {
      Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
        PipelineError::Timeout {
          timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
      })?,
      None => fut.await,
    }
  }

  fn skip(&self, step: &Step, resource: &str) -> StepOutcome {
    debug!(step = %step.name(), resource = %resource, "resource already cached, skipping step");
    self.notifier.notify(PipelineEvent::StepSkipped {
      step: step.name().to_string(),
      resource: resource.to_string(),
    });
    StepOutcome::Skipped {
      resource: resource.to_string(),
    }
  }

  fn report_failure(&self, step: &Step, err: &PipelineError) {
    match err {
      PipelineError::Cancelled | PipelineError::Timeout { .. } => {
        debug!(step = %step.name(), error = %err, "step interrupted");
      }
      PipelineError::UpstreamFailure { .. } => {
        debug!(step = %step.name(), error = %err, "step input failed");
      }
      _ => error!(step = %step.name(), error = %err, "step failed"),
    }
    self.notifier.notify(PipelineEvent::StepFailed {
      step: step.name().to_string(),
      error: err.to_string(),
    });
  }
}

/// Check a work function's return value against the declared outputs.
///
/// A single-output step's value is wrapped so every producing step returns
/// an array; a multi-output step must return an array of exactly as many
/// values as it declares.
fn shape_outputs(step: &Step, raw: Value) -> Result<(Value, Vec<Value>), PipelineError> {
  let expected = step.outputs().len();
  match expected {
    0 => Ok((raw, Vec::new())),
    1 => Ok((Value::Array(vec![raw.clone()]), vec![raw])),
    _ => match raw {
      Value::Array(values) if values.len() == expected => {
        Ok((Value::Array(values.clone()), values))
      }
      Value::Array(values) => Err(PipelineError::OutputArityMismatch {
        step: step.name().to_string(),
        expected,
        actual: values.len(),
      }),
      _ => Err(PipelineError::OutputArityMismatch {
        step: step.name().to_string(),
        expected,
        actual: 1,
      }),
    },
  }
}
