//! Input coercion against operation signatures.
//!
//! Resolved input values arrive as JSON. Before an operation is invoked each
//! value is coerced to the declared [`DataType`]:
//!
//! - strings parse into the declared scalar, array or object type
//! - integers widen to numbers, integral numbers narrow to integers
//! - `any` accepts everything
//!
//! After coercion the value is checked against the input's `value_set` and
//! numeric range.

use serde_json::Value;
use tessera_config::DataType;
use tessera_registry::{InputSpec, OperationSignature, Values};

use crate::error::RuntimeError;

/// Fill defaults, coerce and constraint-check the inputs of one invocation.
///
/// The result follows the signature's input order. Optional inputs with
/// neither a binding nor a default are left out.
pub fn prepare_inputs(
  step_id: &str,
  signature: &OperationSignature,
  mut resolved: Values,
) -> Result<Values, RuntimeError> {
  let mut prepared = Values::with_capacity(signature.inputs.len());

  for (name, spec) in &signature.inputs {
    let value = match resolved.shift_remove(name).or_else(|| spec.default.clone()) {
      Some(value) => value,
      None if spec.required => {
        return Err(RuntimeError::MissingInput {
          step_id: step_id.to_string(),
          input: name.clone(),
        });
      }
      None => continue,
    };

    let value = coerce_value(step_id, name, value, spec.data_type)?;
    check_constraints(step_id, name, &value, spec)?;
    prepared.insert(name.clone(), value);
  }

  Ok(prepared)
}

/// Keep the declared outputs of an invocation result, in signature order.
pub fn collect_outputs(
  step_id: &str,
  signature: &OperationSignature,
  mut outputs: Values,
) -> Result<Values, RuntimeError> {
  let mut collected = Values::with_capacity(signature.outputs.len());
  for (name, spec) in &signature.outputs {
    let value = outputs
      .shift_remove(name)
      .ok_or_else(|| RuntimeError::InvalidOutput {
        step_id: step_id.to_string(),
        message: format!("missing output '{}'", name),
      })?;
    if !spec.data_type.accepts(&value) {
      return Err(RuntimeError::InvalidOutput {
        step_id: step_id.to_string(),
        message: format!("output '{}' is not a {}", name, spec.data_type),
      });
    }
    collected.insert(name.clone(), value);
  }
  Ok(collected)
}

/// Coerce a single value to `data_type`.
pub fn coerce_value(
  step_id: &str,
  input: &str,
  value: Value,
  data_type: DataType,
) -> Result<Value, RuntimeError> {
  if data_type.accepts(&value) {
    return Ok(value);
  }

  let mismatch = |found: &Value| RuntimeError::TypeMismatch {
    step_id: step_id.to_string(),
    input: input.to_string(),
    expected: data_type,
    found: describe(found),
  };

  let coerced = match (&value, data_type) {
    (Value::Number(n), DataType::Integer) => n
      .as_f64()
      .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
      .map(|f| Value::from(f as i64)),

    (Value::String(s), DataType::Number) => parse_number(s.trim()),
    (Value::String(s), DataType::Integer) => s.trim().parse::<i64>().ok().map(Value::from),
    (Value::String(s), DataType::Boolean) => match s.trim().to_lowercase().as_str() {
      "true" => Some(Value::Bool(true)),
      "false" => Some(Value::Bool(false)),
      _ => None,
    },
    (Value::String(s), DataType::Null) => {
      (s.is_empty() || s == "null").then_some(Value::Null)
    }
    (Value::String(s), DataType::Array) => serde_json::from_str::<Value>(s)
      .ok()
      .filter(Value::is_array),
    (Value::String(s), DataType::Object) => serde_json::from_str::<Value>(s)
      .ok()
      .filter(Value::is_object),

    _ => None,
  };

  coerced.ok_or_else(|| mismatch(&value))
}

fn parse_number(s: &str) -> Option<Value> {
  if let Ok(n) = s.parse::<i64>() {
    return Some(Value::from(n));
  }
  s.parse::<f64>()
    .ok()
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
}

fn check_constraints(
  step_id: &str,
  input: &str,
  value: &Value,
  spec: &InputSpec,
) -> Result<(), RuntimeError> {
  let violation = |message: String| RuntimeError::ConstraintViolation {
    step_id: step_id.to_string(),
    input: input.to_string(),
    message,
  };

  if let Some(allowed) = &spec.value_set
    && !allowed.contains(value)
  {
    return Err(violation(format!("value {} is not one of {:?}", value, allowed)));
  }

  if let Some(n) = value.as_f64() {
    if let Some(min) = spec.min
      && n < min
    {
      return Err(violation(format!("value {} is below minimum {}", n, min)));
    }
    if let Some(max) = spec.max
      && n > max
    {
      return Err(violation(format!("value {} is above maximum {}", n, max)));
    }
  }

  Ok(())
}

fn describe(value: &Value) -> String {
  let kind = match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  };
  let shown = value.to_string();
  if shown.chars().count() > 40 {
    let head: String = shown.chars().take(37).collect();
    format!("{} {}...", kind, head)
  } else {
    format!("{} {}", kind, shown)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn coerce(value: Value, data_type: DataType) -> Result<Value, RuntimeError> {
    coerce_value("node", "x", value, data_type)
  }

  #[test]
  fn test_coerce_string_to_scalars() {
    assert_eq!(coerce(json!("42"), DataType::Integer).unwrap(), json!(42));
    assert_eq!(coerce(json!("42"), DataType::Number).unwrap(), json!(42));
    assert_eq!(coerce(json!("19.99"), DataType::Number).unwrap(), json!(19.99));
    assert_eq!(coerce(json!("TRUE"), DataType::Boolean).unwrap(), json!(true));
    assert_eq!(coerce(json!("false"), DataType::Boolean).unwrap(), json!(false));
    assert_eq!(coerce(json!(""), DataType::Null).unwrap(), Value::Null);
    assert_eq!(coerce(json!("null"), DataType::Null).unwrap(), Value::Null);
  }

  #[test]
  fn test_coerce_string_to_collections() {
    assert_eq!(coerce(json!("[1, 2, 3]"), DataType::Array).unwrap(), json!([1, 2, 3]));
    assert_eq!(
      coerce(json!(r#"{"key": "value"}"#), DataType::Object).unwrap(),
      json!({"key": "value"})
    );
    assert!(coerce(json!("[1, 2]"), DataType::Object).is_err());
  }

  #[test]
  fn test_numbers_widen_and_narrow() {
    assert_eq!(coerce(json!(3), DataType::Number).unwrap(), json!(3));
    assert_eq!(coerce(json!(4.0), DataType::Integer).unwrap(), json!(4));
    assert!(matches!(
      coerce(json!(4.5), DataType::Integer),
      Err(RuntimeError::TypeMismatch { .. })
    ));
  }

  #[test]
  fn test_mismatches() {
    assert!(coerce(json!("not a number"), DataType::Integer).is_err());
    assert!(coerce(json!("yes"), DataType::Boolean).is_err());
    assert!(coerce(json!(5), DataType::String).is_err());
    assert_eq!(coerce(json!({"a": 1}), DataType::Any).unwrap(), json!({"a": 1}));
  }

  #[test]
  fn test_prepare_inputs_fills_defaults_and_checks_constraints() {
    let signature = OperationSignature::new("scale")
      .input("x", InputSpec::required(DataType::Number).with_range(Some(0.0), Some(10.0)))
      .input(
        "mode",
        InputSpec::optional(DataType::String, Some(json!("fast")))
          .with_value_set(vec![json!("fast"), json!("slow")]),
      )
      .input("note", InputSpec::optional(DataType::String, None));

    let mut inputs = Values::new();
    inputs.insert("x".to_string(), json!("7"));
    let prepared = prepare_inputs("s", &signature, inputs).unwrap();
    assert_eq!(prepared["x"], json!(7));
    assert_eq!(prepared["mode"], json!("fast"));
    assert!(!prepared.contains_key("note"));

    let mut inputs = Values::new();
    inputs.insert("x".to_string(), json!(11));
    assert!(matches!(
      prepare_inputs("s", &signature, inputs),
      Err(RuntimeError::ConstraintViolation { .. })
    ));

    let mut inputs = Values::new();
    inputs.insert("x".to_string(), json!(1));
    inputs.insert("mode".to_string(), json!("medium"));
    assert!(matches!(
      prepare_inputs("s", &signature, inputs),
      Err(RuntimeError::ConstraintViolation { .. })
    ));

    assert!(matches!(
      prepare_inputs("s", &signature, Values::new()),
      Err(RuntimeError::MissingInput { .. })
    ));
  }

  #[test]
  fn test_collect_outputs() {
    let signature = OperationSignature::new("split")
      .output("head", DataType::String)
      .output("tail", DataType::String);

    let mut outputs = Values::new();
    outputs.insert("tail".to_string(), json!("b"));
    outputs.insert("head".to_string(), json!("a"));
    outputs.insert("extra".to_string(), json!(1));
    let collected = collect_outputs("s", &signature, outputs).unwrap();
    assert_eq!(collected.keys().collect::<Vec<_>>(), vec!["head", "tail"]);

    let mut outputs = Values::new();
    outputs.insert("head".to_string(), json!("a"));
    assert!(matches!(
      collect_outputs("s", &signature, outputs),
      Err(RuntimeError::InvalidOutput { .. })
    ));
  }
}
