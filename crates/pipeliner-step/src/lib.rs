//! Pipeliner Step
//!
//! This crate provides the explicit step descriptor used by pipeliner and
//! the registry that maps step names to descriptors and resource names to
//! their providing step.
//!
//! A step declares, in order, the resources it consumes ([`Input`]) and the
//! resources it produces, and carries a [`Work`] function. Descriptors are
//! built with [`Step::builder`]:
//!
//! ```ignore
//! let divide = Step::builder("divide")
//!   .input("base")
//!   .input("divisor")
//!   .outputs(["result", "modulus"])
//!   .work(|args: StepArgs| async move {
//!     let base: i64 = args.value("base")?;
//!     let divisor: i64 = args.value("divisor")?;
//!     Ok(json!([base / divisor, base % divisor]))
//!   })
//!   .build()?;
//! ```

mod args;
mod error;
mod registry;
mod step;
mod work;

pub use args::{ArgumentError, StepArgs};
pub use error::StepError;
pub use registry::StepRegistry;
pub use step::{Input, Step, StepBuilder};
pub use work::{BoxError, Work};

/// Resource values are dynamic JSON values.
pub type Value = serde_json::Value;
