//! Arguments gathered for a step invocation.

use serde::de::DeserializeOwned;

use crate::Value;

/// Errors raised while reading step arguments.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
  /// No argument with that name was gathered.
  #[error("missing argument '{name}'")]
  Missing { name: String },

  /// The argument could not be converted to the requested type.
  #[error("argument '{name}' has the wrong type: {source}")]
  Invalid {
    name: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Resolved input values passed to a step's work function.
///
/// Named inputs keep their declared order. Inputs declared variadic are
/// collected, also in declared order, into the trailing variadic list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArgs {
  named: Vec<(String, Value)>,
  variadic: Vec<Value>,
}

impl StepArgs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a named argument.
  pub fn push_named(&mut self, name: impl Into<String>, value: Value) {
    self.named.push((name.into(), value));
  }

  /// Append a value to the variadic list.
  pub fn push_variadic(&mut self, value: Value) {
    self.variadic.push(value);
  }

  /// Named arguments in declared order.
  pub fn named(&self) -> &[(String, Value)] {
    &self.named
  }

  /// Variadic arguments in declared order.
  pub fn variadic(&self) -> &[Value] {
    &self.variadic
  }

  /// Look up a named argument.
  pub fn get(&self, name: &str) -> Option<&Value> {
    self
      .named
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, value)| value)
  }

  /// Deserialize a named argument into `T`.
  pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
    let value = self.get(name).ok_or_else(|| ArgumentError::Missing {
      name: name.to_string(),
    })?;
    serde_json::from_value(value.clone()).map_err(|source| ArgumentError::Invalid {
      name: name.to_string(),
      source,
    })
  }

  /// Deserialize every variadic argument into `T`.
  pub fn variadic_values<T: DeserializeOwned>(&self) -> Result<Vec<T>, ArgumentError> {
    self
      .variadic
      .iter()
      .enumerate()
      .map(|(index, value)| {
        serde_json::from_value(value.clone()).map_err(|source| ArgumentError::Invalid {
          name: format!("variadic[{}]", index),
          source,
        })
      })
      .collect()
  }

  /// Every value, named first, then variadic.
  pub fn values(&self) -> impl Iterator<Item = &Value> {
    self
      .named
      .iter()
      .map(|(_, value)| value)
      .chain(self.variadic.iter())
  }

  pub fn len(&self) -> usize {
    self.named.len() + self.variadic.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
