//! Write-once resource slots.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::Value;
use crate::error::{SharedError, StoreError};

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Producer {
  /// Supplied directly by the caller.
  External,
  /// Published by the named step.
  Step(String),
}

/// Resolution state of a single resource.
#[derive(Debug, Clone)]
pub enum SlotState {
  /// Nobody has produced or claimed the resource yet.
  Unset,
  /// A step invocation has claimed the resource and is producing it.
  Pending { claimant: String },
  /// The resource holds its permanent value.
  Resolved { value: Value, producer: Producer },
  /// The claimant failed; awaiters receive the error.
  Failed { error: SharedError },
}

impl SlotState {
  /// Resolved or failed: awaiters can stop waiting.
  pub fn is_settled(&self) -> bool {
    matches!(self, SlotState::Resolved { .. } | SlotState::Failed { .. })
  }
}

/// A single-assignment, awaitable result cell.
///
/// Awaiters subscribe to a watch channel and are released exactly once,
/// when the slot settles. Transitions are only performed by
/// [`ResourceStore`](crate::ResourceStore) while it holds its lock.
#[derive(Debug)]
pub struct Slot {
  name: String,
  tx: watch::Sender<SlotState>,
}

impl Slot {
  pub(crate) fn new(name: impl Into<String>) -> Self {
    let (tx, _rx) = watch::channel(SlotState::Unset);
    Self {
      name: name.into(),
      tx,
    }
  }

  /// Resource name of this slot.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> SlotState {
    self.tx.borrow().clone()
  }

  /// True iff the slot holds its value. Never blocks.
  pub fn is_resolved(&self) -> bool {
    matches!(*self.tx.borrow(), SlotState::Resolved { .. })
  }

  /// True iff a step invocation is currently producing the value.
  pub fn is_pending(&self) -> bool {
    matches!(*self.tx.borrow(), SlotState::Pending { .. })
  }

  /// True iff the value was supplied directly by the caller.
  pub fn is_external(&self) -> bool {
    matches!(
      *self.tx.borrow(),
      SlotState::Resolved {
        producer: Producer::External,
        ..
      }
    )
  }

  /// The resolved value, if any.
  pub fn value(&self) -> Option<Value> {
    match &*self.tx.borrow() {
      SlotState::Resolved { value, .. } => Some(value.clone()),
      _ => None,
    }
  }

  /// The producer of the resolved value, if any.
  pub fn producer(&self) -> Option<Producer> {
    match &*self.tx.borrow() {
      SlotState::Resolved { producer, .. } => Some(producer.clone()),
      _ => None,
    }
  }

  /// The invocation currently producing the value, if any.
  pub fn claimant(&self) -> Option<String> {
    match &*self.tx.borrow() {
      SlotState::Pending { claimant } => Some(claimant.clone()),
      _ => None,
    }
  }

  /// Suspend until the slot settles and return its value.
  ///
  /// Every concurrent awaiter observes the same outcome. A slot that has
  /// already settled returns immediately.
  pub async fn wait(&self) -> Result<Value, StoreError> {
    let mut rx = self.tx.subscribe();
    let settled = rx
      .wait_for(SlotState::is_settled)
      .await
      .map(|state| (*state).clone());

    match settled {
      Ok(SlotState::Resolved { value, .. }) => Ok(value),
      Ok(SlotState::Failed { error }) => Err(StoreError::Failed {
        name: self.name.clone(),
        source: error,
      }),
      _ => Err(StoreError::Abandoned {
        name: self.name.clone(),
        claimant: self.claimant().unwrap_or_default(),
      }),
    }
  }

  /// Transition to Resolved.
  ///
  /// Returns `Ok(false)` when the slot already holds an equal value.
  pub(crate) fn resolve(&self, value: Value, producer: Producer) -> Result<bool, StoreError> {
    let mut conflict = false;
    let changed = self.tx.send_if_modified(|state| match state {
      SlotState::Resolved { value: existing, .. } => {
        conflict = *existing != value;
        false
      }
      _ => {
        *state = SlotState::Resolved { value, producer };
        true
      }
    });

    if conflict {
      return Err(StoreError::AlreadyResolved {
        name: self.name.clone(),
      });
    }
    Ok(changed)
  }

  pub(crate) fn mark_pending(&self, claimant: &str) {
    self.tx.send_replace(SlotState::Pending {
      claimant: claimant.to_string(),
    });
  }

  /// Fail the slot if it is still pending under `claimant`.
  pub(crate) fn fail(&self, claimant: &str, error: SharedError) -> bool {
    self.tx.send_if_modified(|state| match state {
      SlotState::Pending { claimant: current } if current.as_str() == claimant => {
        *state = SlotState::Failed { error };
        true
      }
      _ => false,
    })
  }

  /// Fail the slot if nobody has resolved or claimed it.
  pub(crate) fn discard(&self, error: SharedError) -> bool {
    self.tx.send_if_modified(|state| match state {
      SlotState::Unset => {
        *state = SlotState::Failed { error };
        true
      }
      _ => false,
    })
  }
}
