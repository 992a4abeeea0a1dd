use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Value;
use crate::args::StepArgs;
use crate::error::StepError;
use crate::work::{BoxError, Work};

/// A resource consumed by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
  pub name: String,
  /// Collected into the trailing variadic argument list instead of being
  /// passed by name.
  #[serde(default)]
  pub variadic: bool,
}

impl Input {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      variadic: false,
    }
  }

  pub fn variadic(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      variadic: true,
    }
  }
}

impl From<&str> for Input {
  fn from(name: &str) -> Self {
    Input::named(name)
  }
}

impl From<String> for Input {
  fn from(name: String) -> Self {
    Input::named(name)
  }
}

/// A registered unit of work.
#[derive(Clone)]
pub struct Step {
  name: String,
  inputs: Vec<Input>,
  outputs: Vec<String>,
  work: Arc<dyn Work>,
}

impl Step {
  /// Start building a step descriptor.
  pub fn builder(name: impl Into<String>) -> StepBuilder {
    StepBuilder {
      name: name.into(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      work: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Declared inputs, in order.
  pub fn inputs(&self) -> &[Input] {
    &self.inputs
  }

  /// Declared outputs, in order.
  pub fn outputs(&self) -> &[String] {
    &self.outputs
  }

  pub fn work(&self) -> &Arc<dyn Work> {
    &self.work
  }

  /// Whether the step lists `resource` among its outputs.
  pub fn provides(&self, resource: &str) -> bool {
    self.outputs.iter().any(|o| o == resource)
  }
}

impl fmt::Debug for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Step")
      .field("name", &self.name)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .finish_non_exhaustive()
  }
}

/// Builder for [`Step`].
pub struct StepBuilder {
  name: String,
  inputs: Vec<Input>,
  outputs: Vec<String>,
  work: Option<Arc<dyn Work>>,
}

impl StepBuilder {
  /// Declare a named input.
  pub fn input(mut self, name: impl Into<String>) -> Self {
    self.inputs.push(Input::named(name));
    self
  }

  /// Declare an input collected into the variadic argument list.
  pub fn variadic(mut self, name: impl Into<String>) -> Self {
    self.inputs.push(Input::variadic(name));
    self
  }

  /// Declare several inputs at once.
  pub fn inputs<I>(mut self, inputs: impl IntoIterator<Item = I>) -> Self
  where
    I: Into<Input>,
  {
    self.inputs.extend(inputs.into_iter().map(Into::into));
    self
  }

  /// Declare an output.
  pub fn output(mut self, name: impl Into<String>) -> Self {
    self.outputs.push(name.into());
    self
  }

  /// Declare several outputs at once.
  pub fn outputs<S>(mut self, outputs: impl IntoIterator<Item = S>) -> Self
  where
    S: Into<String>,
  {
    self.outputs.extend(outputs.into_iter().map(Into::into));
    self
  }

  /// Bind an async function as the step's work.
  pub fn work<F, Fut>(mut self, work: F) -> Self
  where
    F: Fn(StepArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    self.work = Some(Arc::new(work));
    self
  }

  /// Bind an existing [`Work`] implementation.
  pub fn with_work(mut self, work: Arc<dyn Work>) -> Self {
    self.work = Some(work);
    self
  }

  /// Validate and build the descriptor.
  pub fn build(self) -> Result<Step, StepError> {
    if self.name.trim().is_empty() {
      return Err(StepError::EmptyName);
    }

    let mut seen = HashSet::new();
    for input in &self.inputs {
      if !seen.insert(input.name.as_str()) {
        return Err(StepError::DuplicateInput {
          step: self.name.clone(),
          input: input.name.clone(),
        });
      }
    }

    let mut seen = HashSet::new();
    for output in &self.outputs {
      if !seen.insert(output.as_str()) {
        return Err(StepError::DuplicateOutput {
          step: self.name.clone(),
          output: output.clone(),
        });
      }
    }

    let work = self.work.ok_or_else(|| StepError::MissingWork {
      step: self.name.clone(),
    })?;

    Ok(Step {
      name: self.name,
      inputs: self.inputs,
      outputs: self.outputs,
      work,
    })
  }
}
