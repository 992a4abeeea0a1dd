//! Dependency-resolving, memoizing execution of pipeline steps.
//!
//! A [`Pipeline`] owns a [`ResourceStore`](pipeliner_store::ResourceStore)
//! and a [`StepRegistry`](pipeliner_step::StepRegistry). Requesting a
//! resource runs its provider, which first requests its own inputs, and so
//! on down the graph. Each resource is produced at most once; every other
//! request for it awaits the same value.
//!
//! ```text
//! request_resources(["quotient"])
//!        │
//!        ▼
//!   resolve "quotient" ──► provider "divide" ──► claim outputs
//!                                │
//!                 ┌──────────────┴──────────────┐
//!                 ▼                             ▼
//!          resolve "base"               resolve "divisor"
//!      (store hit, in flight,         (store hit, in flight,
//!       or invoke provider)            or invoke provider)
//!                 └──────────────┬──────────────┘
//!                                ▼
//!                      run work, publish outputs
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut pipeline = Pipeline::new();
//! pipeline.register("base_provider", Vec::<String>::new(), ["base"], base)?;
//! pipeline.register("divide", ["base", "divisor"], ["result", "modulus"], divide)?;
//! pipeline.supply("divisor", json!(7))?;
//!
//! let resources = pipeline.request_resources(["result", "modulus"]).await?;
//! ```

mod config;
mod engine;
mod error;
mod events;
mod outcome;
mod plan;
mod pipeline;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use events::{ChannelNotifier, NoopNotifier, PipelineEvent, PipelineNotifier, TracingNotifier};
pub use outcome::StepOutcome;
pub use pipeline::Pipeline;

pub use pipeliner_step::{BoxError, Input, Step, StepArgs, StepBuilder, StepRegistry, Work};
pub use pipeliner_store::{Producer, ResourceStore, SlotState, Value};
