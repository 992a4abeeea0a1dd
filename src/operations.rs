//! Built-in work for steps defined in JSON.

use pipeliner_config::Operation;
use pipeliner_engine::{StepArgs, Value};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
  #[error("expected {expected} input(s), got {actual}")]
  Arity { expected: usize, actual: usize },

  #[error("expected a number, got {0}")]
  NotANumber(Value),

  #[error("integer overflow")]
  Overflow,

  #[error("division by zero")]
  DivisionByZero,

  #[error("{0}")]
  Failed(String),
}

/// Apply `operation` to the gathered arguments, named values first.
pub fn apply(operation: &Operation, args: &StepArgs) -> Result<Value, OperationError> {
  match operation {
    Operation::Const { value } => Ok(value.clone()),
    Operation::Identity => {
      let [value] = exactly::<1>(args)?;
      Ok(value)
    }
    Operation::Sum => match numbers(args)? {
      Numbers::Int(values) => values
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .map(Value::from)
        .ok_or(OperationError::Overflow),
      Numbers::Float(values) => Ok(json!(values.into_iter().sum::<f64>())),
    },
    Operation::Product => match numbers(args)? {
      Numbers::Int(values) => values
        .into_iter()
        .try_fold(1i64, i64::checked_mul)
        .map(Value::from)
        .ok_or(OperationError::Overflow),
      Numbers::Float(values) => Ok(json!(values.into_iter().product::<f64>())),
    },
    Operation::DivMod => {
      let [dividend, divisor] = exactly::<2>(args)?;
      div_mod(&dividend, &divisor)
    }
    Operation::Collect => Ok(Value::Array(args.values().cloned().collect())),
    Operation::Concat { separator } => {
      let parts: Vec<String> = args
        .values()
        .map(|value| match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        })
        .collect();
      Ok(Value::String(parts.join(separator)))
    }
    Operation::Fail { message } => Err(OperationError::Failed(message.clone())),
  }
}

fn exactly<const N: usize>(args: &StepArgs) -> Result<[Value; N], OperationError> {
  let values: Vec<Value> = args.values().cloned().collect();
  let actual = values.len();
  values.try_into().map_err(|_| OperationError::Arity {
    expected: N,
    actual,
  })
}

enum Numbers {
  Int(Vec<i64>),
  Float(Vec<f64>),
}

/// Every argument as a number, flattening array arguments one level.
/// Integers are kept as such unless any value needs a float.
fn numbers(args: &StepArgs) -> Result<Numbers, OperationError> {
  let mut flat = Vec::new();
  for value in args.values() {
    match value {
      Value::Array(items) => flat.extend(items.iter()),
      other => flat.push(other),
    }
  }

  if let Some(ints) = flat.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>() {
    return Ok(Numbers::Int(ints));
  }

  flat
    .into_iter()
    .map(|v| v.as_f64().ok_or_else(|| OperationError::NotANumber(v.clone())))
    .collect::<Result<Vec<_>, _>>()
    .map(Numbers::Float)
}

/// Floor division and remainder; the remainder takes the divisor's sign.
fn div_mod(dividend: &Value, divisor: &Value) -> Result<Value, OperationError> {
  if let (Some(a), Some(b)) = (dividend.as_i64(), divisor.as_i64()) {
    if b == 0 {
      return Err(OperationError::DivisionByZero);
    }
    let mut quotient = a.checked_div(b).ok_or(OperationError::Overflow)?;
    let mut remainder = a % b;
    if remainder != 0 && (remainder < 0) != (b < 0) {
      quotient -= 1;
      remainder += b;
    }
    return Ok(json!([quotient, remainder]));
  }

  let a = dividend
    .as_f64()
    .ok_or_else(|| OperationError::NotANumber(dividend.clone()))?;
  let b = divisor
    .as_f64()
    .ok_or_else(|| OperationError::NotANumber(divisor.clone()))?;
  if b == 0.0 {
    return Err(OperationError::DivisionByZero);
  }
  let quotient = (a / b).floor();
  Ok(json!([quotient, a - quotient * b]))
}
