use serde::{Deserialize, Serialize};

/// Settings of a single workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
  /// Workspace name; also the qualified name of its implicit workflow.
  pub name: String,
  /// How many independent ready steps may run at once. `1` walks the
  /// topological order strictly one step at a time.
  pub max_parallel_steps: usize,
}

impl WorkspaceConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_max_parallel_steps(mut self, max_parallel_steps: usize) -> Self {
    self.max_parallel_steps = max_parallel_steps.max(1);
    self
  }
}

impl Default for WorkspaceConfig {
  fn default() -> Self {
    Self {
      name: "workspace".to_string(),
      max_parallel_steps: 1,
    }
  }
}
