//! Evaluation events and notifiers.
//!
//! Events let callers follow an evaluation as it happens.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while evaluating resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluationEvent {
  EvaluationStarted {
    evaluation_id: String,
    target: String,
  },

  /// A step is about to be invoked or inlined.
  StepStarted {
    evaluation_id: String,
    step_id: String,
    operation: Option<String>,
  },

  StepCompleted {
    evaluation_id: String,
    step_id: String,
    resources: Vec<String>,
  },

  /// A step's outputs were already present and up to date.
  StepReused {
    evaluation_id: String,
    step_id: String,
  },

  StepFailed {
    evaluation_id: String,
    step_id: String,
    error: String,
  },

  /// Resources went back to `Absent` after a change.
  ResourcesInvalidated { resources: Vec<String> },

  EvaluationCompleted {
    evaluation_id: String,
    target: String,
  },

  EvaluationFailed {
    evaluation_id: String,
    error: String,
  },
}

/// Receives evaluation events.
pub trait EvaluationNotifier: Send + Sync {
  fn notify(&self, event: EvaluationEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EvaluationNotifier for NoopNotifier {
  fn notify(&self, _event: EvaluationEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<EvaluationEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<EvaluationEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<EvaluationEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl EvaluationNotifier for ChannelNotifier {
  fn notify(&self, event: EvaluationEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
