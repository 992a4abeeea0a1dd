//! Dependency checks run before any step executes.

use std::collections::HashMap;

use pipeliner_step::{Step, StepRegistry};
use pipeliner_store::ResourceStore;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Visiting,
  Done,
}

/// Depth-first walk over the steps a request would reach.
///
/// Resources that are already resolved or in flight are treated as
/// satisfied, and so is any step one of whose outputs is resolved, since
/// that step would be skipped at run time. An unresolved resource whose
/// provider would be skipped that way can never be produced.
pub(crate) struct Preflight<'a> {
  registry: &'a StepRegistry,
  store: &'a ResourceStore,
  marks: HashMap<String, Mark>,
  path: Vec<String>,
}

impl<'a> Preflight<'a> {
  pub(crate) fn new(registry: &'a StepRegistry, store: &'a ResourceStore) -> Self {
    Self {
      registry,
      store,
      marks: HashMap::new(),
      path: Vec::new(),
    }
  }

  pub(crate) fn check_resource(
    &mut self,
    resource: &str,
    required_by: Option<&str>,
  ) -> Result<(), PipelineError> {
    if self.store.is_ready(resource) || self.store.is_pending(resource) {
      return Ok(());
    }

    let registry = self.registry;
    let step = registry
      .provider(resource)
      .ok_or_else(|| PipelineError::MissingProvider {
        resource: resource.to_string(),
        required_by: required_by.map(str::to_string),
      })?;

    if let Some(resolved) = step.outputs().iter().find(|o| self.store.is_ready(o)) {
      return Err(PipelineError::Unproducible {
        resource: resource.to_string(),
        step: step.name().to_string(),
        resolved: resolved.clone(),
      });
    }
    self.check_step(step)
  }

  pub(crate) fn check_step(&mut self, step: &Step) -> Result<(), PipelineError> {
    match self.marks.get(step.name()) {
      Some(Mark::Done) => return Ok(()),
      Some(Mark::Visiting) => {
        let start = self
          .path
          .iter()
          .position(|name| name == step.name())
          .unwrap_or(0);
        let mut path = self.path[start..].to_vec();
        path.push(step.name().to_string());
        return Err(PipelineError::DependencyCycle { path });
      }
      None => {}
    }

    if step.outputs().iter().any(|o| self.store.is_ready(o)) {
      self.marks.insert(step.name().to_string(), Mark::Done);
      return Ok(());
    }

    self.marks.insert(step.name().to_string(), Mark::Visiting);
    self.path.push(step.name().to_string());

    for input in step.inputs() {
      self.check_resource(&input.name, Some(step.name()))?;
    }

    self.path.pop();
    self.marks.insert(step.name().to_string(), Mark::Done);
    Ok(())
  }
}
