//! Pipeline events and notifiers for observability.
//!
//! Events are emitted while resources are supplied, steps run and the store
//! is reset. A notifier is injected when the pipeline is built, so its
//! lifetime is tied to that pipeline rather than to the process.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
  /// A resource was supplied directly by the caller.
  ResourceSupplied { resource: String },

  /// A step published one of its outputs.
  ResourcePublished { resource: String, step: String },

  /// A step was not run because one of its outputs already exists.
  StepSkipped { step: String, resource: String },

  /// A step's output is already being produced by another invocation.
  StepAwaiting {
    step: String,
    resource: String,
    claimant: String,
  },

  /// A step's inputs are resolved and its work function is being called.
  StepStarted { step: String },

  /// A step's work function returned and its outputs were published.
  StepCompleted { step: String },

  /// A step failed.
  StepFailed { step: String, error: String },

  /// The store was reset.
  ResourcesReset { keep_external: bool, dropped: usize },
}

/// Trait for receiving pipeline events.
///
/// The pipeline calls `notify` for each event; implementations decide what
/// to do with it (log, forward, record, ignore).
pub trait PipelineNotifier: Send + Sync {
  fn notify(&self, event: PipelineEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PipelineNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {}
}

/// A notifier that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl PipelineNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// A notifier that writes every event as a debug-level tracing event.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl PipelineNotifier for TracingNotifier {
  fn notify(&self, event: PipelineEvent) {
    match event {
      PipelineEvent::ResourceSupplied { resource } => {
        debug!(resource = %resource, "adding resource");
      }
      PipelineEvent::ResourcePublished { resource, step } => {
        debug!(resource = %resource, step = %step, "resource published");
      }
      PipelineEvent::StepSkipped { step, resource } => {
        debug!(step = %step, resource = %resource, "resource already cached, skipping step");
      }
      PipelineEvent::StepAwaiting {
        step,
        resource,
        claimant,
      } => {
        debug!(
          step = %step,
          resource = %resource,
          claimant = %claimant,
          "resource in flight, awaiting it"
        );
      }
      PipelineEvent::StepStarted { step } => debug!(step = %step, "calling step"),
      PipelineEvent::StepCompleted { step } => debug!(step = %step, "step completed"),
      PipelineEvent::StepFailed { step, error } => {
        debug!(step = %step, error = %error, "step failed");
      }
      PipelineEvent::ResourcesReset {
        keep_external,
        dropped,
      } => {
        debug!(keep_external, dropped, "resources reset");
      }
    }
  }
}

impl<T: PipelineNotifier + ?Sized> PipelineNotifier for std::sync::Arc<T> {
  fn notify(&self, event: PipelineEvent) {
    (**self).notify(event);
  }
}
