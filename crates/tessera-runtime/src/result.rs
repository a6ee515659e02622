//! Evaluation result types.

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
  /// Unique id of this evaluation.
  pub evaluation_id: String,
  /// The resource that was requested.
  pub target: String,
  pub value: serde_json::Value,
  /// Steps whose operation (or nested workflow) was invoked, in commit order.
  pub invoked: Vec<String>,
  /// Expression steps evaluated inline, without the registry.
  pub inlined: Vec<String>,
  /// Steps whose outputs were already present and up to date.
  pub reused: Vec<String>,
}

impl EvaluationReport {
  /// Number of operation invocations this evaluation performed.
  pub fn invocations(&self) -> usize {
    self.invoked.len()
  }
}
