use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type tag of an operation or workflow input/output.
///
/// Tags mirror the JSON value model; values are coerced into the declared
/// type when a step is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
  #[default]
  Any,
  String,
  Number,
  Integer,
  Boolean,
  Array,
  Object,
  Null,
}

impl DataType {
  /// Whether `value` already has this type, without any conversion.
  pub fn accepts(&self, value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match self {
      DataType::Any => true,
      DataType::String => value.is_string(),
      DataType::Number => value.is_number(),
      DataType::Integer => value.is_i64() || value.is_u64(),
      DataType::Boolean => value.is_boolean(),
      DataType::Array => value.is_array(),
      DataType::Object => value.is_object(),
      DataType::Null => matches!(value, Value::Null),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      DataType::Any => "any",
      DataType::String => "string",
      DataType::Number => "number",
      DataType::Integer => "integer",
      DataType::Boolean => "boolean",
      DataType::Array => "array",
      DataType::Object => "object",
      DataType::Null => "null",
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_accepts_exact_types() {
    assert!(DataType::Integer.accepts(&json!(3)));
    assert!(!DataType::Integer.accepts(&json!(3.5)));
    assert!(DataType::Number.accepts(&json!(3)));
    assert!(DataType::Any.accepts(&json!({"a": 1})));
    assert!(!DataType::String.accepts(&json!(1)));
    assert!(DataType::Null.accepts(&json!(null)));
  }

  #[test]
  fn test_serde_lowercase() {
    let parsed: DataType = serde_json::from_str("\"integer\"").unwrap();
    assert_eq!(parsed, DataType::Integer);
    assert_eq!(serde_json::to_string(&DataType::Boolean).unwrap(), "\"boolean\"");
  }
}
