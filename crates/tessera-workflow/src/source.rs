use serde::{Deserialize, Serialize};

/// Prefix that turns a command-line style argument into a resource reference.
pub const REFERENCE_MARKER: char = '@';

/// Where the value of a step input (or workflow output) comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
  Literal { value: serde_json::Value },
  StepOutput { step_id: String, output: String },
  WorkflowInput { name: String },
}

impl Source {
  pub fn literal(value: impl Into<serde_json::Value>) -> Self {
    Source::Literal {
      value: value.into(),
    }
  }

  pub fn step_output(step_id: impl Into<String>, output: impl Into<String>) -> Self {
    Source::StepOutput {
      step_id: step_id.into(),
      output: output.into(),
    }
  }

  pub fn workflow_input(name: impl Into<String>) -> Self {
    Source::WorkflowInput { name: name.into() }
  }

  /// The step this source depends on, if any.
  pub fn referenced_step(&self) -> Option<&str> {
    match self {
      Source::StepOutput { step_id, .. } => Some(step_id),
      _ => None,
    }
  }

  pub fn is_literal(&self) -> bool {
    matches!(self, Source::Literal { .. })
  }
}
