//! Pipeliner Store
//!
//! This crate provides the resource store for pipeliner: a mapping from
//! resource name to a write-once, awaitable [`Slot`].
//!
//! # Architecture
//!
//! ```text
//! ResourceStore
//! ├── slot(name)            - get or create the shared slot for a name
//! ├── set(name, value, by)  - Unset/Pending/Failed -> Resolved, exactly once
//! ├── wait(name)            - suspend until Resolved (or Failed)
//! ├── claim(outputs, step)  - atomic Unset -> Pending for a whole output set
//! └── reset(keep_external)  - drop slots between runs
//!
//! ClaimGuard
//! ├── publish(values)       - resolve every claimed slot
//! ├── fail(error)           - fail every claimed slot, waking awaiters
//! └── drop                  - an unsettled claim fails as abandoned
//! ```
//!
//! Every state transition happens while the store lock is held, so a claim
//! is a true compare-and-swap: at most one invocation ever holds the claim
//! for a given resource.

mod claim;
mod error;
mod slot;
mod store;

pub use claim::{Claim, ClaimGuard};
pub use error::{SharedError, StoreError};
pub use slot::{Producer, Slot, SlotState};
pub use store::ResourceStore;

/// Resource values are dynamic JSON values.
pub type Value = serde_json::Value;
