use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_config::DataType;

/// Whether a registered callable is a plain operation or a nested workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  #[default]
  Operation,
  Workflow,
}

/// Declared input of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
  pub data_type: DataType,
  pub required: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
  /// Allowed values; anything else is rejected at invocation.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value_set: Option<Vec<serde_json::Value>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl InputSpec {
  pub fn required(data_type: DataType) -> Self {
    Self {
      data_type,
      required: true,
      default: None,
      value_set: None,
      min: None,
      max: None,
      description: None,
    }
  }

  pub fn optional(data_type: DataType, default: Option<serde_json::Value>) -> Self {
    Self {
      required: false,
      default,
      ..Self::required(data_type)
    }
  }

  pub fn with_value_set(mut self, values: Vec<serde_json::Value>) -> Self {
    self.value_set = Some(values);
    self
  }

  pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
    self.min = min;
    self.max = max;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// Declared output of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
  pub data_type: DataType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// The typed contract of a registered operation.
///
/// Inputs and outputs keep their declaration order; it is the order used
/// when listing and documenting operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSignature {
  pub name: String,
  #[serde(default)]
  pub kind: OperationKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub inputs: IndexMap<String, InputSpec>,
  pub outputs: IndexMap<String, OutputSpec>,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub metadata: IndexMap<String, serde_json::Value>,
}

impl OperationSignature {
  /// Conventional name of the single output of an operation.
  pub const RETURN: &'static str = "return";

  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: OperationKind::Operation,
      description: None,
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
      metadata: IndexMap::new(),
    }
  }

  pub fn with_kind(mut self, kind: OperationKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
    self.inputs.insert(name.into(), spec);
    self
  }

  pub fn output(mut self, name: impl Into<String>, data_type: DataType) -> Self {
    self.outputs.insert(
      name.into(),
      OutputSpec {
        data_type,
        description: None,
      },
    );
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.metadata.insert(key.into(), value);
    self
  }

  /// The output a bare reference to this operation's step resolves to.
  pub fn default_output(&self) -> Option<&str> {
    if self.outputs.len() == 1 {
      self.outputs.keys().next().map(String::as_str)
    } else {
      None
    }
  }

  /// Inputs that must be bound because they have neither a binding nor a default.
  pub fn mandatory_inputs(&self) -> impl Iterator<Item = &str> {
    self
      .inputs
      .iter()
      .filter(|(_, spec)| spec.required && spec.default.is_none())
      .map(|(name, _)| name.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_builder_preserves_order() {
    let sig = OperationSignature::new("op")
      .input("z", InputSpec::required(DataType::Number))
      .input("a", InputSpec::optional(DataType::String, Some(json!("x"))))
      .output("return", DataType::Number);

    let names: Vec<&str> = sig.inputs.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["z", "a"]);
    assert_eq!(sig.default_output(), Some("return"));
    assert_eq!(sig.mandatory_inputs().collect::<Vec<_>>(), vec!["z"]);
  }

  #[test]
  fn test_no_default_output_for_multiple_outputs() {
    let sig = OperationSignature::new("split")
      .output("head", DataType::Any)
      .output("tail", DataType::Any);
    assert_eq!(sig.default_output(), None);
  }
}
