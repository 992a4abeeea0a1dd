//! Turn a pipeline definition into a runnable pipeline.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use pipeliner_config::PipelineDef;
use pipeliner_engine::{
  BoxError, Input, Pipeline, PipelineConfig, PipelineError, Step, StepArgs, TracingNotifier, Value,
};
use serde_json::Map;

use crate::operations;

pub async fn load_definition(path: &Path) -> Result<PipelineDef> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read pipeline file: {}", path.display()))?;

  PipelineDef::from_json(&content)
    .with_context(|| format!("failed to load pipeline file: {}", path.display()))
}

/// Register every step of `def` and supply its resources, with `overrides`
/// taking precedence over the definition's own values.
pub fn build_pipeline(
  def: &PipelineDef,
  overrides: Map<String, Value>,
) -> Result<Pipeline<TracingNotifier>, PipelineError> {
  let config = PipelineConfig {
    request_timeout: def.settings.request_timeout_ms.map(Duration::from_millis),
    detect_cycles: def.settings.detect_cycles,
  };
  let mut pipeline = Pipeline::with_notifier(config, TracingNotifier);

  for step_def in &def.steps {
    let operation = step_def.operation.clone();
    let inputs = step_def.inputs.iter().map(|input| {
      if input.is_variadic() {
        Input::variadic(input.name())
      } else {
        Input::named(input.name())
      }
    });

    let step = Step::builder(&step_def.name)
      .inputs(inputs)
      .outputs(step_def.outputs.iter().cloned())
      .work(move |args: StepArgs| {
        let operation = operation.clone();
        async move { operations::apply(&operation, &args).map_err(BoxError::from) }
      })
      .build()?;
    pipeline.register_step(step);
  }

  let mut resources = def.resources.clone();
  resources.extend(overrides);
  pipeline.supply_resources(resources)?;

  Ok(pipeline)
}
