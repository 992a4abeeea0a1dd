//! The resource store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::Value;
use crate::claim::{Claim, ClaimGuard};
use crate::error::{SharedError, StoreError};
use crate::slot::{Producer, Slot, SlotState};

/// Mapping from resource name to its write-once slot.
///
/// Cloning the store is cheap and yields a handle to the same slots.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
  slots: Arc<Mutex<HashMap<String, Arc<Slot>>>>,
}

impl ResourceStore {
  pub fn new() -> Self {
    Self::default()
  }

  // Slot transitions never panic while the lock is held, so a poisoned map
  // is still consistent.
  fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn existing(&self, name: &str) -> Option<Arc<Slot>> {
    self.lock().get(name).cloned()
  }

  /// Get the slot for `name`, creating an unset one if needed.
  ///
  /// Concurrent callers asking for the same name share the same slot.
  pub fn slot(&self, name: &str) -> Arc<Slot> {
    let mut slots = self.lock();
    Arc::clone(
      slots
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Slot::new(name))),
    )
  }

  /// True iff the resource exists and is resolved. Never blocks.
  pub fn is_ready(&self, name: &str) -> bool {
    self.existing(name).is_some_and(|slot| slot.is_resolved())
  }

  /// True iff a step invocation has claimed the resource and not settled it.
  pub fn is_pending(&self, name: &str) -> bool {
    self.existing(name).is_some_and(|slot| slot.is_pending())
  }

  /// Snapshot of the resource state; missing resources are `Unset`.
  pub fn state(&self, name: &str) -> SlotState {
    self
      .existing(name)
      .map(|slot| slot.state())
      .unwrap_or(SlotState::Unset)
  }

  /// The resolved value of a resource, if any.
  pub fn value(&self, name: &str) -> Option<Value> {
    self.existing(name).and_then(|slot| slot.value())
  }

  /// Who produced a resolved resource, if anyone.
  pub fn producer(&self, name: &str) -> Option<Producer> {
    self.existing(name).and_then(|slot| slot.producer())
  }

  /// Suspend until the resource resolves, then return its value.
  pub async fn wait(&self, name: &str) -> Result<Value, StoreError> {
    self.slot(name).wait().await
  }

  /// Resolve a resource.
  ///
  /// Returns `Ok(false)` if the resource already holds an equal value and
  /// [`StoreError::AlreadyResolved`] if it holds a different one; a resolved
  /// value is never overwritten.
  pub fn set(
    &self,
    name: &str,
    value: Value,
    producer: Producer,
  ) -> Result<bool, StoreError> {
    let mut slots = self.lock();
    let slot = slots
      .entry(name.to_string())
      .or_insert_with(|| Arc::new(Slot::new(name)));

    let changed = slot.resolve(value, producer.clone())?;
    if changed {
      debug!(resource = %name, producer = ?producer, "resource_resolved");
    }
    Ok(changed)
  }

  /// Atomically claim every slot in `names` for `claimant`.
  ///
  /// The claim succeeds only if no slot is resolved and no slot is pending
  /// under another claimant; all slots then move to `Pending` together. The
  /// whole check-and-mark runs under the store lock, so two concurrent
  /// callers can never both acquire the same resource.
  pub fn claim(&self, names: &[String], claimant: &str) -> Claim {
    let mut slots = self.lock();
    let mut claimed = Vec::with_capacity(names.len());

    for name in names {
      let slot = slots
        .entry(name.clone())
        .or_insert_with(|| Arc::new(Slot::new(name.as_str())));

      match slot.state() {
        SlotState::Resolved { .. } => {
          return Claim::Resolved { name: name.clone() };
        }
        SlotState::Pending { claimant: other } => {
          return Claim::InFlight {
            name: name.clone(),
            claimant: other,
          };
        }
        SlotState::Unset | SlotState::Failed { .. } => claimed.push(Arc::clone(slot)),
      }
    }

    for slot in &claimed {
      slot.mark_pending(claimant);
    }
    debug!(claimant = %claimant, resources = ?names, "resources_claimed");

    Claim::Acquired(ClaimGuard::new(self.clone(), claimant, claimed))
  }

  /// Resolve a claimed slot, re-attaching it if a reset dropped it meanwhile.
  pub(crate) fn publish_claimed(
    &self,
    slot: &Arc<Slot>,
    value: Value,
    producer: Producer,
  ) -> Result<bool, StoreError> {
    let mut slots = self.lock();
    slots
      .entry(slot.name().to_string())
      .or_insert_with(|| Arc::clone(slot));
    slot.resolve(value, producer)
  }

  /// Fail a claimed slot, waking every awaiter with `error`.
  pub(crate) fn fail_claimed(&self, slot: &Arc<Slot>, claimant: &str, error: SharedError) {
    let _slots = self.lock();
    if slot.fail(claimant, error) {
      debug!(resource = %slot.name(), claimant = %claimant, "resource_failed");
    }
  }

  /// Drop resources so the store can be reused for a fresh run.
  ///
  /// With `keep_external`, resolved resources that were supplied directly
  /// survive the reset. Returns the number of dropped resources.
  ///
  /// Anyone still awaiting a dropped, unclaimed resource is released with
  /// [`StoreError::Reset`]. Claimed resources settle when their claimant
  /// publishes or fails them.
  pub fn reset(&self, keep_external: bool) -> usize {
    let mut slots = self.lock();
    let before = slots.len();
    slots.retain(|name, slot| {
      if keep_external && slot.is_external() {
        return true;
      }
      slot.discard(Arc::new(StoreError::Reset { name: name.clone() }));
      false
    });
    let dropped = before - slots.len();
    debug!(keep_external, dropped, "resources_reset");
    dropped
  }

  /// Every known resource name, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.lock().keys().cloned().collect();
    names.sort();
    names
  }

  /// All resolved resources and their values.
  pub fn snapshot(&self) -> BTreeMap<String, Value> {
    self
      .lock()
      .iter()
      .filter_map(|(name, slot)| slot.value().map(|value| (name.clone(), value)))
      .collect()
  }

  /// Number of known resources, resolved or not.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}
