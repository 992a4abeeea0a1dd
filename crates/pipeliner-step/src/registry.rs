//! Step registry and provider index.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::step::Step;

/// Registered steps, keyed by name, plus the resource -> provider index.
///
/// Every step that lists a resource among its outputs is recorded as a
/// claimant of that resource, in registration order. The first claimant is
/// the resource's provider; later claimants are never invoked for it.
#[derive(Debug, Default, Clone)]
pub struct StepRegistry {
  steps: HashMap<String, Arc<Step>>,
  /// Step names in first-registration order.
  order: Vec<String>,
  /// Resource name -> claimants in registration order.
  claims: HashMap<String, Vec<String>>,
}

impl StepRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a step, returning the descriptor it replaced, if any.
  ///
  /// Re-registering a name overwrites the descriptor. Outputs the new
  /// descriptor still lists keep their place in the claim order; outputs it
  /// no longer lists are released to the next recorded claimant.
  pub fn register(&mut self, step: Step) -> Option<Arc<Step>> {
    let step = Arc::new(step);
    let name = step.name().to_string();
    let previous = self.steps.insert(name.clone(), Arc::clone(&step));

    match &previous {
      Some(old) => {
        for output in old.outputs() {
          if !step.provides(output) {
            self.release(output, &name);
          }
        }
      }
      None => self.order.push(name.clone()),
    }

    for output in step.outputs() {
      let claimants = self.claims.entry(output.clone()).or_default();
      if !claimants.contains(&name) {
        claimants.push(name.clone());
      }
      if claimants.first() != Some(&name) {
        debug!(
          resource = %output,
          step = %name,
          provider = ?claimants.first(),
          "resource already has a provider, recording claim only"
        );
      }
    }

    debug!(step = %name, replaced = previous.is_some(), "step_registered");
    previous
  }

  fn release(&mut self, resource: &str, step: &str) {
    if let Some(claimants) = self.claims.get_mut(resource) {
      claimants.retain(|c| c != step);
      if claimants.is_empty() {
        self.claims.remove(resource);
      }
    }
  }

  /// Get a step by name.
  pub fn get(&self, name: &str) -> Option<&Arc<Step>> {
    self.steps.get(name)
  }

  /// Name of the step responsible for producing `resource`.
  pub fn provider_of(&self, resource: &str) -> Option<&str> {
    self
      .claims
      .get(resource)
      .and_then(|claimants| claimants.first())
      .map(String::as_str)
  }

  /// The providing step descriptor for `resource`.
  pub fn provider(&self, resource: &str) -> Option<&Arc<Step>> {
    self.provider_of(resource).and_then(|name| self.get(name))
  }

  /// Every step claiming `resource`, in registration order.
  pub fn claimants(&self, resource: &str) -> &[String] {
    self
      .claims
      .get(resource)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Steps in registration order.
  pub fn steps(&self) -> impl Iterator<Item = &Arc<Step>> {
    self.order.iter().filter_map(|name| self.steps.get(name))
  }

  /// Every resource with a provider, sorted, paired with that provider.
  pub fn providers(&self) -> Vec<(&str, &str)> {
    let mut providers: Vec<(&str, &str)> = self
      .claims
      .iter()
      .filter_map(|(resource, claimants)| {
        claimants
          .first()
          .map(|step| (resource.as_str(), step.as_str()))
      })
      .collect();
    providers.sort();
    providers
  }

  pub fn contains(&self, name: &str) -> bool {
    self.steps.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}
