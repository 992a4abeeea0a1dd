use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use pipeliner_step::{BoxError, Input, Step, StepArgs, StepRegistry};
use pipeliner_store::{Producer, ResourceStore, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{NoopNotifier, PipelineEvent, PipelineNotifier};
use crate::outcome::StepOutcome;
use crate::plan::Preflight;

/// A set of steps together with the resources they share.
///
/// Steps are registered up front through `&mut self`; requests and step
/// runs only need `&self`, so a pipeline wrapped in an `Arc` can serve
/// concurrent requests that share one memoized store.
///
/// The notifier type parameter controls how execution events are
/// observed. Use `NoopNotifier` (the default) when events are not needed.
pub struct Pipeline<N: PipelineNotifier = NoopNotifier> {
  pub(crate) store: ResourceStore,
  pub(crate) registry: StepRegistry,
  pub(crate) config: PipelineConfig,
  pub(crate) notifier: N,
}

impl Pipeline<NoopNotifier> {
  pub fn new() -> Self {
    Self::with_config(PipelineConfig::default())
  }

  pub fn with_config(config: PipelineConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl Default for Pipeline<NoopNotifier> {
  fn default() -> Self {
    Self::new()
  }
}

impl<N: PipelineNotifier> Pipeline<N> {
  pub fn with_notifier(config: PipelineConfig, notifier: N) -> Self {
    Self {
      store: ResourceStore::new(),
      registry: StepRegistry::new(),
      config,
      notifier,
    }
  }

  /// Seed the store with externally supplied resources.
  pub fn with_resources<K>(
    self,
    resources: impl IntoIterator<Item = (K, Value)>,
  ) -> Result<Self, PipelineError>
  where
    K: Into<String>,
  {
    self.supply_resources(resources)?;
    Ok(self)
  }

  /// Register a step descriptor, returning the one it replaced.
  ///
  /// The first step registered for a resource stays its provider; later
  /// steps listing the same output never produce it.
  pub fn register_step(&mut self, step: Step) -> Option<Arc<Step>> {
    self.registry.register(step)
  }

  /// Build and register a step from its parts.
  pub fn register<I, S, F, Fut>(
    &mut self,
    name: &str,
    inputs: impl IntoIterator<Item = I>,
    outputs: impl IntoIterator<Item = S>,
    work: F,
  ) -> Result<(), PipelineError>
  where
    I: Into<Input>,
    S: Into<String>,
    F: Fn(StepArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    let step = Step::builder(name)
      .inputs(inputs)
      .outputs(outputs)
      .work(work)
      .build()?;
    self.register_step(step);
    Ok(())
  }

  /// Resolve a single resource with an external value.
  ///
  /// Supplying the value a resource already holds is a no-op; supplying a
  /// different one fails with [`PipelineError::AlreadyResolved`].
  pub fn supply(&self, name: impl Into<String>, value: Value) -> Result<(), PipelineError> {
    let name = name.into();
    if self.store.set(&name, value, Producer::External)? {
      self
        .notifier
        .notify(PipelineEvent::ResourceSupplied { resource: name });
    }
    Ok(())
  }

  /// Resolve several resources with external values.
  pub fn supply_resources<K>(
    &self,
    resources: impl IntoIterator<Item = (K, Value)>,
  ) -> Result<(), PipelineError>
  where
    K: Into<String>,
  {
    for (name, value) in resources {
      self.supply(name, value)?;
    }
    Ok(())
  }

  pub fn is_resource_ready(&self, name: &str) -> bool {
    self.store.is_ready(name)
  }

  /// Wait until `name` is resolved by someone else.
  ///
  /// This never invokes a provider; use [`Pipeline::request_resources`] to
  /// have the resource produced.
  pub async fn resource(&self, name: &str) -> Result<Value, PipelineError> {
    Ok(self.store.wait(name).await?)
  }

  /// Produce every named resource, running whatever steps they need.
  pub async fn request_resources<S>(
    &self,
    names: impl IntoIterator<Item = S>,
  ) -> Result<HashMap<String, Value>, PipelineError>
  where
    S: Into<String>,
  {
    self
      .request_resources_with(names, CancellationToken::new())
      .await
  }

  /// Like [`Pipeline::request_resources`], stopping early when `cancel`
  /// fires.
  pub async fn request_resources_with<S>(
    &self,
    names: impl IntoIterator<Item = S>,
    cancel: CancellationToken,
  ) -> Result<HashMap<String, Value>, PipelineError>
  where
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    self.request(names, cancel).await
  }

  #[instrument(name = "pipeline_request", skip(self, cancel))]
  async fn request(
    &self,
    names: Vec<String>,
    cancel: CancellationToken,
  ) -> Result<HashMap<String, Value>, PipelineError> {
    if self.config.detect_cycles {
      self.check(&names)?;
    }

    let requested = async {
      let pending = names
        .iter()
        .map(|name| self.resolve_resource(name, None, &cancel));
      futures::future::join_all(pending)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
    };
    let values = self.with_deadline(requested).await?;

    info!(count = names.len(), "resources requested");
    Ok(names.into_iter().zip(values).collect())
  }

  /// Run a named step, first supplying `supplied` as external resources.
  ///
  /// The step is skipped if any of its outputs is already resolved.
  pub async fn run_step(
    &self,
    name: &str,
    supplied: &[(&str, Value)],
  ) -> Result<StepOutcome, PipelineError> {
    self
      .run_step_with(name, supplied, CancellationToken::new())
      .await
  }

  /// Like [`Pipeline::run_step`], stopping early when `cancel` fires.
  #[instrument(name = "pipeline_run_step", skip(self, supplied, cancel))]
  pub async fn run_step_with(
    &self,
    name: &str,
    supplied: &[(&str, Value)],
    cancel: CancellationToken,
  ) -> Result<StepOutcome, PipelineError> {
    let step = self
      .registry
      .get(name)
      .cloned()
      .ok_or_else(|| PipelineError::UnknownStep {
        step: name.to_string(),
      })?;

    self.supply_resources(supplied.iter().map(|(k, v)| (*k, v.clone())))?;

    if self.config.detect_cycles {
      Preflight::new(&self.registry, &self.store).check_step(&step)?;
    }

    let outcome = self.with_deadline(self.invoke(step, &cancel)).await?;
    info!(skipped = outcome.is_skipped(), "step run finished");
    Ok(outcome)
  }

  /// Check that every named resource can be produced without running
  /// anything: each has a value or a provider, and no provider chain loops.
  pub fn check<S: AsRef<str>>(&self, names: &[S]) -> Result<(), PipelineError> {
    let mut preflight = Preflight::new(&self.registry, &self.store);
    for name in names {
      preflight.check_resource(name.as_ref(), None)?;
    }
    Ok(())
  }

  /// Drop resources so the pipeline can run again from scratch.
  ///
  /// With `keep_external`, values supplied directly are kept. Returns the
  /// number of resources dropped. Callers still waiting in
  /// [`Pipeline::resource`] on a dropped, unclaimed resource get an error.
  pub fn reset_resources(&self, keep_external: bool) -> usize {
    let dropped = self.store.reset(keep_external);
    debug!(keep_external, dropped, "pipeline reset");
    self.notifier.notify(PipelineEvent::ResourcesReset {
      keep_external,
      dropped,
    });
    dropped
  }

  pub fn store(&self) -> &ResourceStore {
    &self.store
  }

  pub fn registry(&self) -> &StepRegistry {
    &self.registry
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }
}
