use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeliner_engine::StepOutcome;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod loader;
mod operations;

/// Pipeliner - run steps that produce and consume named resources
#[derive(Parser)]
#[command(name = "pipeliner")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Produce resources, running whatever steps they need
  Run {
    /// Path to the pipeline definition (JSON)
    pipeline_file: PathBuf,

    /// Resource to produce; repeat for several
    #[arg(long = "request", required = true)]
    requests: Vec<String>,

    /// Print every resolved resource, not only the requested ones
    #[arg(long)]
    all: bool,
  },

  /// Run a single step, skipping it if one of its outputs already exists
  Step {
    /// Path to the pipeline definition (JSON)
    pipeline_file: PathBuf,

    /// The step to run
    #[arg(long)]
    step: String,
  },

  /// Check that resources can be produced without running anything
  Check {
    /// Path to the pipeline definition (JSON)
    pipeline_file: PathBuf,

    /// Resource to check; defaults to every declared output
    #[arg(long = "request")]
    requests: Vec<String>,
  },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      pipeline_file,
      requests,
      all,
    }) => block_on(run_resources(pipeline_file, requests, all)),
    Some(Commands::Step {
      pipeline_file,
      step,
    }) => block_on(run_step(pipeline_file, step)),
    Some(Commands::Check {
      pipeline_file,
      requests,
    }) => block_on(check(pipeline_file, requests)),
    None => {
      println!("pipeliner - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

fn block_on<F: Future<Output = Result<()>>>(fut: F) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(fut)
}

/// A token cancelled on Ctrl-C, so in-flight steps stop and release their
/// claims.
fn cancel_on_interrupt() -> CancellationToken {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling pipeline");
      trigger.cancel();
    }
  });
  cancel
}

async fn run_resources(pipeline_file: PathBuf, requests: Vec<String>, all: bool) -> Result<()> {
  let def = loader::load_definition(&pipeline_file).await?;
  info!(pipeline = %def.name, steps = def.steps.len(), "loaded pipeline");

  let payload = read_payload_from_stdin()?;
  let pipeline = loader::build_pipeline(&def, payload).context("failed to build pipeline")?;

  let resources = pipeline
    .request_resources_with(requests, cancel_on_interrupt())
    .await
    .context("pipeline execution failed")?;

  let output: BTreeMap<String, Value> = if all {
    pipeline.store().snapshot()
  } else {
    resources.into_iter().collect()
  };
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

async fn run_step(pipeline_file: PathBuf, step: String) -> Result<()> {
  let def = loader::load_definition(&pipeline_file).await?;
  let payload = read_payload_from_stdin()?;
  let pipeline = loader::build_pipeline(&def, payload).context("failed to build pipeline")?;

  let outcome = pipeline
    .run_step_with(&step, &[], cancel_on_interrupt())
    .await
    .with_context(|| format!("step '{}' failed", step))?;

  match outcome {
    StepOutcome::Completed(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    StepOutcome::Skipped { resource } => {
      eprintln!("Step '{}' skipped: '{}' is already resolved", step, resource);
      println!("null");
    }
  }

  Ok(())
}

async fn check(pipeline_file: PathBuf, requests: Vec<String>) -> Result<()> {
  let def = loader::load_definition(&pipeline_file).await?;
  let payload = read_payload_from_stdin()?;
  let pipeline = loader::build_pipeline(&def, payload).context("failed to build pipeline")?;

  let requests = if requests.is_empty() {
    def
      .steps
      .iter()
      .flat_map(|s| s.outputs.iter().cloned())
      .collect()
  } else {
    requests
  };

  pipeline
    .check(&requests)
    .context("pipeline cannot produce every requested resource")?;

  for (resource, provider) in pipeline.registry().providers() {
    eprintln!("  {} <- {}", resource, provider);
  }
  eprintln!("Pipeline '{}' OK ({} resources checked)", def.name, requests.len());

  Ok(())
}

/// Resources supplied on stdin as a JSON object.
fn read_payload_from_stdin() -> Result<Map<String, Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read resources from stdin")?;

  if input.trim().is_empty() {
    return Ok(Map::new());
  }

  match serde_json::from_str(&input).context("failed to parse resources JSON from stdin")? {
    Value::Object(map) => Ok(map),
    other => anyhow::bail!("resources on stdin must be a JSON object, got {}", other),
  }
}
