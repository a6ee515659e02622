//! The declarative workflow document.
//!
//! # Example
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "qualified_name": "demo.scale",
//!   "header": { "description": "Scale a value" },
//!   "inputs": { "factor": { "data_type": "number", "default": 2 } },
//!   "outputs": { "scaled": { "source": "product" } },
//!   "steps": [
//!     { "id": "base", "op": "const", "inputs": { "value": { "value": 21 } } },
//!     { "id": "product", "op": "multiply", "inputs": { "x": "base", "y": "demo.scale.factor" } }
//!   ]
//! }
//! ```
//!
//! Source strings are interpreted against the owning workflow: a string
//! prefixed with `<qualified_name>.` names a workflow input, `<step_id>` names
//! the sole output of that step and `<step_id>.<output>` names one output of a
//! multi-output step.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data_type::DataType;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
  CURRENT_SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
  #[serde(default = "default_schema_version")]
  pub schema_version: u32,
  pub qualified_name: String,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub header: IndexMap<String, serde_json::Value>,
  #[serde(default)]
  pub inputs: IndexMap<String, InputDef>,
  #[serde(default)]
  pub outputs: IndexMap<String, OutputDef>,
  #[serde(default)]
  pub steps: Vec<StepDef>,
}

impl WorkflowDocument {
  /// An empty document for the given workflow name.
  pub fn new(qualified_name: impl Into<String>) -> Self {
    Self {
      schema_version: CURRENT_SCHEMA_VERSION,
      qualified_name: qualified_name.into(),
      header: IndexMap::new(),
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
      steps: Vec::new(),
    }
  }
}

/// A declared workflow parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDef {
  #[serde(default)]
  pub data_type: DataType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
  /// Name of the collaborator that can enumerate valid values (UI hint only).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value_set_source: Option<String>,
}

/// A declared workflow output and where its value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  pub source: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
  Operation,
  Workflow,
  Expression,
  Executable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub id: String,
  /// Omitted for steps calling `op`, whose kind comes from the registry.
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub step_type: Option<StepType>,
  /// Operation name (operation steps) or workflow qualified name (workflow steps).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub op: Option<String>,
  /// Constant expression (expression steps).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expression: Option<serde_json::Value>,
  /// Command line (executable steps).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub inputs: IndexMap<String, SourceDef>,
  /// Output name -> resource name, only written when it differs from the default naming.
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub outputs: IndexMap<String, String>,
}

impl StepDef {
  pub fn operation(id: impl Into<String>, op: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      step_type: None,
      op: Some(op.into()),
      expression: None,
      command: None,
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
    }
  }

  pub fn with_input(mut self, name: impl Into<String>, source: SourceDef) -> Self {
    self.inputs.insert(name.into(), source);
    self
  }
}

/// How a step input is bound in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDef {
  /// Short form: a source string.
  Reference(String),
  /// Long form of a source string: `{ "source": "..." }`.
  Source { source: String },
  /// A literal value: `{ "value": ... }`.
  Value { value: serde_json::Value },
}

impl SourceDef {
  pub fn reference(source: impl Into<String>) -> Self {
    SourceDef::Reference(source.into())
  }

  pub fn value(value: serde_json::Value) -> Self {
    SourceDef::Value { value }
  }

  /// The source string, if this binding is a reference.
  pub fn as_reference(&self) -> Option<&str> {
    match self {
      SourceDef::Reference(s) | SourceDef::Source { source: s } => Some(s),
      SourceDef::Value { .. } => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_source_def_forms() {
    let inputs: IndexMap<String, SourceDef> = serde_json::from_value(json!({
      "a": "step1",
      "b": { "source": "step2.out" },
      "c": { "value": 5 },
      "d": { "value": null }
    }))
    .unwrap();

    assert_eq!(inputs["a"], SourceDef::reference("step1"));
    assert_eq!(inputs["b"].as_reference(), Some("step2.out"));
    assert_eq!(inputs["c"], SourceDef::value(json!(5)));
    assert_eq!(inputs["d"], SourceDef::value(serde_json::Value::Null));
  }

  #[test]
  fn test_step_type_is_optional() {
    let step: StepDef = serde_json::from_value(json!({ "id": "a", "op": "const" })).unwrap();
    assert_eq!(step.step_type, None);

    let written = serde_json::to_value(&step).unwrap();
    assert!(written.get("type").is_none());
    assert!(written.get("inputs").is_none());
  }

  #[test]
  fn test_document_defaults() {
    let doc: WorkflowDocument =
      serde_json::from_value(json!({ "qualified_name": "empty" })).unwrap();
    assert_eq!(doc.schema_version, CURRENT_SCHEMA_VERSION);
    assert!(doc.steps.is_empty());
    assert_eq!(doc, WorkflowDocument::new("empty"));
  }

  #[test]
  fn test_step_order_preserved() {
    let doc: WorkflowDocument = serde_json::from_value(json!({
      "qualified_name": "ordered",
      "steps": [
        { "id": "z", "op": "const" },
        { "id": "a", "op": "const" },
        { "id": "m", "type": "expression", "expression": 1 }
      ]
    }))
    .unwrap();

    let ids: Vec<&str> = doc.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
    assert_eq!(doc.steps[2].step_type, Some(StepType::Expression));
  }
}
