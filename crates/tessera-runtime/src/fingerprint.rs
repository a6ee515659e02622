//! Structural fingerprints of values and step definitions.
//!
//! A fingerprint is the SHA-256 of a value's canonical JSON: object keys
//! sorted, no whitespace. Two values fingerprint equal exactly when they
//! are equal as JSON.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tessera_workflow::{Step, StepKind};

/// What one step input contributes to the step fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPart<'a> {
  Literal(&'a Value),
  /// Value fingerprint of the upstream resource.
  Upstream(&'a str),
  /// Current value of a workflow input.
  WorkflowInput(&'a Value),
}

pub fn value_fingerprint(value: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(canonical_json(value).as_bytes());
  hex::encode(hasher.finalize())
}

/// Fingerprint of a step definition together with what its inputs currently
/// resolve to. Inputs are given in the step's input order.
pub fn step_fingerprint<'a, I>(step: &Step, inputs: I) -> String
where
  I: IntoIterator<Item = (&'a str, InputPart<'a>)>,
{
  let target = match &step.kind {
    StepKind::Operation { op } => json!(op),
    StepKind::Workflow { workflow } => json!(workflow),
    StepKind::Expression { expression } => expression.clone(),
    StepKind::Executable { command } => json!(command),
  };

  let inputs: serde_json::Map<String, Value> = inputs
    .into_iter()
    .map(|(name, part)| {
      let part = match part {
        InputPart::Literal(value) => json!({ "literal": value }),
        InputPart::Upstream(fingerprint) => json!({ "upstream": fingerprint }),
        InputPart::WorkflowInput(value) => json!({ "input": value }),
      };
      (name.to_string(), part)
    })
    .collect();

  value_fingerprint(&json!({
    "kind": step.kind.type_name(),
    "target": target,
    "inputs": inputs,
  }))
}

/// Canonical JSON text: object keys sorted, compact separators.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
      }
      out.push('}');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_canonical_json_sorts_keys() {
    let a = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
    assert_eq!(canonical_json(&a), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
  }

  #[test]
  fn test_value_fingerprint_ignores_key_order() {
    let mut first = serde_json::Map::new();
    first.insert("x".to_string(), json!(1));
    first.insert("y".to_string(), json!(2));
    let mut second = serde_json::Map::new();
    second.insert("y".to_string(), json!(2));
    second.insert("x".to_string(), json!(1));

    assert_eq!(
      value_fingerprint(&Value::Object(first)),
      value_fingerprint(&Value::Object(second))
    );
    assert_ne!(value_fingerprint(&json!(1)), value_fingerprint(&json!("1")));
    assert_eq!(value_fingerprint(&json!(null)).len(), 64);
  }

  #[test]
  fn test_step_fingerprint_tracks_inputs() {
    let step = Step::operation("c", "add");
    let five = json!(5);
    let six = json!(6);

    let base = step_fingerprint(&step, [("x", InputPart::Literal(&five))]);
    assert_eq!(base, step_fingerprint(&step, [("x", InputPart::Literal(&five))]));
    assert_ne!(base, step_fingerprint(&step, [("x", InputPart::Literal(&six))]));
    assert_ne!(base, step_fingerprint(&step, [("x", InputPart::WorkflowInput(&five))]));
    assert_ne!(
      base,
      step_fingerprint(&Step::operation("c", "multiply"), [("x", InputPart::Literal(&five))])
    );
  }
}
