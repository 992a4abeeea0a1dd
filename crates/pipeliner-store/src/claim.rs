//! Producer claims over a step's output set.

use std::sync::Arc;

use tracing::warn;

use crate::Value;
use crate::error::{SharedError, StoreError};
use crate::slot::{Producer, Slot};
use crate::store::ResourceStore;

/// Outcome of [`ResourceStore::claim`].
#[derive(Debug)]
pub enum Claim {
  /// The caller now owns every requested slot and must produce them.
  Acquired(ClaimGuard),
  /// At least one slot already holds a value.
  Resolved { name: String },
  /// Another invocation is already producing this slot.
  InFlight { name: String, claimant: String },
}

/// Exclusive right to produce a set of resources.
///
/// The guard must be settled with [`publish`](ClaimGuard::publish) or
/// [`fail`](ClaimGuard::fail). If it is dropped unsettled (for example the
/// owning future was cancelled), every claimed slot fails as abandoned so
/// that awaiters are released instead of waiting forever.
#[derive(Debug)]
pub struct ClaimGuard {
  store: ResourceStore,
  claimant: String,
  slots: Vec<Arc<Slot>>,
  settled: bool,
}

impl ClaimGuard {
  pub(crate) fn new(store: ResourceStore, claimant: &str, slots: Vec<Arc<Slot>>) -> Self {
    Self {
      store,
      claimant: claimant.to_string(),
      slots,
      settled: false,
    }
  }

  /// Name of the invocation holding the claim.
  pub fn claimant(&self) -> &str {
    &self.claimant
  }

  /// Names of the claimed resources, in claim order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.slots.iter().map(|slot| slot.name())
  }

  /// Resolve the claimed resources with `values`, in claim order.
  ///
  /// Every slot is attempted; the first conflict (a different value supplied
  /// externally while the claim was held) is returned after the rest have
  /// been published.
  pub fn publish(mut self, values: impl IntoIterator<Item = Value>) -> Result<(), StoreError> {
    self.settled = true;
    let producer = Producer::Step(self.claimant.clone());
    let mut first_error = None;

    for (slot, value) in self.slots.iter().zip(values) {
      if let Err(e) = self
        .store
        .publish_claimed(slot, value, producer.clone())
      {
        if first_error.is_none() {
          first_error = Some(e);
        }
      }
    }

    // Anything left pending had no value to publish.
    for slot in &self.slots {
      if slot.is_pending() {
        self.store.fail_claimed(
          slot,
          &self.claimant,
          Arc::new(StoreError::Abandoned {
            name: slot.name().to_string(),
            claimant: self.claimant.clone(),
          }),
        );
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// Fail every claimed resource with `error`.
  pub fn fail(mut self, error: SharedError) {
    self.settled = true;
    for slot in &self.slots {
      self
        .store
        .fail_claimed(slot, &self.claimant, Arc::clone(&error));
    }
  }
}

impl Drop for ClaimGuard {
  fn drop(&mut self) {
    if self.settled {
      return;
    }

    warn!(claimant = %self.claimant, "claim dropped before settling, abandoning resources");
    for slot in &self.slots {
      let error = Arc::new(StoreError::Abandoned {
        name: slot.name().to_string(),
        claimant: self.claimant.clone(),
      });
      self.store.fail_claimed(slot, &self.claimant, error);
    }
  }
}
