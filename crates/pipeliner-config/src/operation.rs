use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Built-in work a step defined in JSON can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
  /// Return a fixed value.
  Const { value: Value },
  /// Return the single input unchanged.
  Identity,
  /// Add every input. Array inputs are flattened one level.
  Sum,
  /// Multiply every input. Array inputs are flattened one level.
  Product,
  /// Floor division of the first input by the second, returning
  /// `[quotient, remainder]`.
  DivMod,
  /// Return every input as an array, in declared order.
  Collect,
  /// Join every input as text.
  Concat {
    #[serde(default)]
    separator: String,
  },
  /// Always fail with `message`.
  Fail { message: String },
}

impl Operation {
  /// Number of inputs the operation requires, if fixed.
  pub fn arity(&self) -> Option<usize> {
    match self {
      Operation::Const { .. } => Some(0),
      Operation::Identity => Some(1),
      Operation::DivMod => Some(2),
      _ => None,
    }
  }
}
