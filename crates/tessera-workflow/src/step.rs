use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::source::Source;

/// Resource name a step output publishes when nothing else is configured.
///
/// A single-output step publishes under its own id; each output of a
/// multi-output step publishes as `<step_id>.<output>`.
pub fn default_resource_name(step_id: &str, output: &str, output_count: usize) -> String {
  if output_count == 1 {
    step_id.to_string()
  } else {
    format!("{}.{}", step_id, output)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
  /// Invoke a registered operation.
  Operation { op: String },
  /// Invoke a registered workflow as a single operation.
  Workflow { workflow: String },
  /// Evaluate a constant expression inline.
  Expression { expression: serde_json::Value },
  /// Run an external program.
  Executable { command: String },
}

impl StepKind {
  pub fn type_name(&self) -> &'static str {
    match self {
      StepKind::Operation { .. } => "operation",
      StepKind::Workflow { .. } => "workflow",
      StepKind::Expression { .. } => "expression",
      StepKind::Executable { .. } => "executable",
    }
  }
}

/// One node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub id: String,
  pub kind: StepKind,
  /// Input name -> where its value comes from, in signature order.
  pub inputs: IndexMap<String, Source>,
  /// Output name -> published resource name, in signature order.
  pub outputs: IndexMap<String, String>,
}

impl Step {
  pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
    Self {
      id: id.into(),
      kind,
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
    }
  }

  pub fn operation(id: impl Into<String>, op: impl Into<String>) -> Self {
    Self::new(id, StepKind::Operation { op: op.into() })
  }

  pub fn workflow(id: impl Into<String>, workflow: impl Into<String>) -> Self {
    Self::new(
      id,
      StepKind::Workflow {
        workflow: workflow.into(),
      },
    )
  }

  /// A constant step publishing `expression` under its own id.
  pub fn expression(id: impl Into<String>, expression: serde_json::Value) -> Self {
    let id = id.into();
    let mut step = Self::new(id.clone(), StepKind::Expression { expression });
    step.outputs.insert("return".to_string(), id);
    step
  }

  pub fn with_input(mut self, name: impl Into<String>, source: Source) -> Self {
    self.inputs.insert(name.into(), source);
    self
  }

  pub fn with_output(mut self, output: impl Into<String>, resource: impl Into<String>) -> Self {
    self.outputs.insert(output.into(), resource.into());
    self
  }

  /// Give every declared output its default resource name.
  pub fn with_default_outputs<I, S>(mut self, outputs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let outputs: Vec<String> = outputs.into_iter().map(Into::into).collect();
    let count = outputs.len();
    for output in outputs {
      let resource = default_resource_name(&self.id, &output, count);
      self.outputs.insert(output, resource);
    }
    self
  }

  /// Name of the operation or workflow this step invokes.
  pub fn op_reference(&self) -> Option<&str> {
    match &self.kind {
      StepKind::Operation { op } => Some(op),
      StepKind::Workflow { workflow } => Some(workflow),
      _ => None,
    }
  }

  /// Whether this step invokes the workflow `name` as a nested workflow.
  ///
  /// Plain operations never count, even when their name matches.
  pub fn calls_workflow(&self, name: &str) -> bool {
    matches!(&self.kind, StepKind::Workflow { workflow } if workflow == name)
  }

  /// Distinct ids of the steps this step reads from, in input order.
  pub fn dependencies(&self) -> Vec<&str> {
    let mut deps: Vec<&str> = Vec::new();
    for source in self.inputs.values() {
      if let Some(step_id) = source.referenced_step()
        && !deps.contains(&step_id)
      {
        deps.push(step_id);
      }
    }
    deps
  }

  /// Whether any input reads the given workflow input.
  pub fn reads_workflow_input(&self, name: &str) -> bool {
    self
      .inputs
      .values()
      .any(|s| matches!(s, Source::WorkflowInput { name: n } if n == name))
  }

  /// The output a bare reference to this step means.
  pub fn default_output(&self) -> Option<&str> {
    if self.outputs.len() == 1 {
      self.outputs.keys().next().map(String::as_str)
    } else {
      None
    }
  }

  pub fn resource_for(&self, output: &str) -> Option<&str> {
    self.outputs.get(output).map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_resource_names() {
    let single = Step::operation("a", "const").with_default_outputs(["return"]);
    assert_eq!(single.resource_for("return"), Some("a"));
    assert_eq!(single.default_output(), Some("return"));

    let multi = Step::operation("s", "split").with_default_outputs(["head", "tail"]);
    assert_eq!(multi.resource_for("head"), Some("s.head"));
    assert_eq!(multi.resource_for("tail"), Some("s.tail"));
    assert_eq!(multi.default_output(), None);
  }

  #[test]
  fn test_calls_workflow_ignores_operations() {
    assert!(Step::workflow("d", "lib.double").calls_workflow("lib.double"));
    assert!(!Step::workflow("d", "lib.double").calls_workflow("lib.triple"));
    assert!(!Step::operation("s", "split").calls_workflow("split"));
  }

  #[test]
  fn test_dependencies_are_distinct() {
    let step = Step::operation("c", "add")
      .with_input("x", Source::step_output("a", "return"))
      .with_input("y", Source::step_output("a", "return"))
      .with_input("z", Source::step_output("b", "return"))
      .with_input("w", Source::literal(1));
    assert_eq!(step.dependencies(), vec!["a", "b"]);
  }
}
