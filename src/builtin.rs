//! Operations shipped with the binary.

use std::sync::Arc;

use serde_json::{Value, json};
use tessera_config::DataType;
use tessera_registry::{
  FnOperation, InputSpec, OperationError, OperationRegistry, OperationSignature, Plugin,
  RegistryError, Values,
};

/// Small arithmetic and text operations for demos and scripted workflows.
pub struct BuiltinPlugin;

impl Plugin for BuiltinPlugin {
  fn name(&self) -> &str {
    "builtin"
  }

  fn init(&self, registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    register(
      registry,
      OperationSignature::new("const")
        .with_description("Return its value unchanged")
        .input("value", InputSpec::required(DataType::Any))
        .output(OperationSignature::RETURN, DataType::Any),
      |inputs| Ok(single(inputs["value"].clone())),
    )?;
    register(
      registry,
      OperationSignature::new("identity")
        .with_description("Pass a value through")
        .input("value", InputSpec::required(DataType::Any))
        .output(OperationSignature::RETURN, DataType::Any),
      |inputs| Ok(single(inputs["value"].clone())),
    )?;

    for (name, description, op) in [
      ("add", "x + y", Arith::Add),
      ("subtract", "x - y", Arith::Subtract),
      ("multiply", "x * y", Arith::Multiply),
      ("divide", "x / y", Arith::Divide),
    ] {
      register(
        registry,
        OperationSignature::new(name)
          .with_description(description)
          .input("x", InputSpec::required(DataType::Number))
          .input("y", InputSpec::required(DataType::Number))
          .output(OperationSignature::RETURN, DataType::Number),
        move |inputs| op.apply(&inputs["x"], &inputs["y"]).map(single),
      )?;
    }

    register(
      registry,
      OperationSignature::new("concat")
        .with_description("Join two strings")
        .input("a", InputSpec::required(DataType::String))
        .input("b", InputSpec::required(DataType::String))
        .input(
          "separator",
          InputSpec::optional(DataType::String, Some(json!(""))),
        )
        .output(OperationSignature::RETURN, DataType::String),
      |inputs| {
        let joined = [text(&inputs["a"]), text(&inputs["b"])].join(text(&inputs["separator"]));
        Ok(single(json!(joined)))
      },
    )?;
    register(
      registry,
      OperationSignature::new("sum")
        .with_description("Add up an array of numbers")
        .input("values", InputSpec::required(DataType::Array))
        .output(OperationSignature::RETURN, DataType::Number),
      |inputs| {
        let items = inputs["values"].as_array().cloned().unwrap_or_default();
        items
          .iter()
          .try_fold(json!(0), |total, item| {
            if !item.is_number() {
              return Err(OperationError::new(format!("'{}' is not a number", item)));
            }
            Arith::Add.apply(&total, item)
          })
          .map(single)
      },
    )?;
    register(
      registry,
      OperationSignature::new("split")
        .with_description("Split text at the first separator")
        .input("text", InputSpec::required(DataType::String))
        .input(
          "separator",
          InputSpec::optional(DataType::String, Some(json!(" "))),
        )
        .output("head", DataType::String)
        .output("tail", DataType::String),
      |inputs| {
        let source = text(&inputs["text"]);
        let separator = text(&inputs["separator"]);
        let (head, tail) = match separator {
          "" => (source, ""),
          sep => source.split_once(sep).unwrap_or((source, "")),
        };
        Ok(Values::from([
          ("head".to_string(), json!(head)),
          ("tail".to_string(), json!(tail)),
        ]))
      },
    )?;

    Ok(())
  }
}

#[derive(Debug, Clone, Copy)]
enum Arith {
  Add,
  Subtract,
  Multiply,
  Divide,
}

impl Arith {
  /// Integer arithmetic while both sides are integers and the result fits,
  /// floating point otherwise.
  fn apply(self, x: &Value, y: &Value) -> Result<Value, OperationError> {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
      let exact = match self {
        Arith::Add => a.checked_add(b),
        Arith::Subtract => a.checked_sub(b),
        Arith::Multiply => a.checked_mul(b),
        Arith::Divide if b == 0 => return Err(OperationError::new("division by zero")),
        Arith::Divide => (a % b == 0).then(|| a / b),
      };
      if let Some(n) = exact {
        return Ok(json!(n));
      }
    }

    let (a, b) = (
      x.as_f64().unwrap_or_default(),
      y.as_f64().unwrap_or_default(),
    );
    let result = match self {
      Arith::Add => a + b,
      Arith::Subtract => a - b,
      Arith::Multiply => a * b,
      Arith::Divide if b == 0.0 => return Err(OperationError::new("division by zero")),
      Arith::Divide => a / b,
    };
    serde_json::Number::from_f64(result)
      .map(Value::Number)
      .ok_or_else(|| OperationError::new(format!("result {} is not a finite number", result)))
  }
}

fn register<F>(
  registry: &mut OperationRegistry,
  signature: OperationSignature,
  body: F,
) -> Result<(), RegistryError>
where
  F: Fn(Values) -> Result<Values, OperationError> + Send + Sync + 'static,
{
  let signature = signature.with_metadata("plugin", json!("builtin"));
  registry.register(signature, Arc::new(FnOperation::new(body)))
}

fn single(value: Value) -> Values {
  Values::from([(OperationSignature::RETURN.to_string(), value)])
}

fn text(value: &Value) -> &str {
  value.as_str().unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use tessera_registry::{InvocationContext, PluginLoader};
  use tokio_util::sync::CancellationToken;

  use super::*;

  fn registry() -> Arc<OperationRegistry> {
    let mut registry = OperationRegistry::new();
    PluginLoader::new()
      .with_plugin(BuiltinPlugin)
      .load(&mut registry)
      .unwrap();
    Arc::new(registry)
  }

  async fn call(registry: &Arc<OperationRegistry>, name: &str, inputs: Value) -> Result<Values, OperationError> {
    let cancel = CancellationToken::new();
    let ctx = InvocationContext {
      registry,
      step_id: "test",
      cancel: &cancel,
    };
    let inputs: Values = serde_json::from_value(inputs).unwrap();
    registry
      .lookup(name)
      .unwrap()
      .operation()
      .invoke(&ctx, inputs)
      .await
  }

  #[test]
  fn test_registers_all_operations() {
    let names: Vec<String> = registry().list().map(|s| s.name.clone()).collect();
    assert_eq!(
      names,
      vec![
        "const", "identity", "add", "subtract", "multiply", "divide", "concat", "sum", "split"
      ]
    );
  }

  #[test]
  fn test_signatures_record_their_plugin() {
    let registry = registry();
    for signature in registry.list() {
      assert_eq!(signature.metadata["plugin"], json!("builtin"), "{}", signature.name);
    }
  }

  #[tokio::test]
  async fn test_arithmetic() {
    let registry = registry();

    let out = call(&registry, "add", json!({ "x": 2, "y": 3 })).await.unwrap();
    assert_eq!(out["return"], json!(5));
    let out = call(&registry, "subtract", json!({ "x": 2, "y": 3 })).await.unwrap();
    assert_eq!(out["return"], json!(-1));
    let out = call(&registry, "multiply", json!({ "x": 2.5, "y": 2 })).await.unwrap();
    assert_eq!(out["return"], json!(5.0));
    let out = call(&registry, "divide", json!({ "x": 6, "y": 3 })).await.unwrap();
    assert_eq!(out["return"], json!(2));
    let out = call(&registry, "divide", json!({ "x": 1, "y": 2 })).await.unwrap();
    assert_eq!(out["return"], json!(0.5));
  }

  #[tokio::test]
  async fn test_divide_by_zero() {
    let registry = registry();
    let err = call(&registry, "divide", json!({ "x": 1, "y": 0 }))
      .await
      .unwrap_err();
    assert_eq!(err.message(), "division by zero");
  }

  #[tokio::test]
  async fn test_text_operations() {
    let registry = registry();

    let out = call(
      &registry,
      "concat",
      json!({ "a": "tes", "b": "sera", "separator": "" }),
    )
    .await
    .unwrap();
    assert_eq!(out["return"], json!("tessera"));

    let out = call(
      &registry,
      "split",
      json!({ "text": "a,b,c", "separator": "," }),
    )
    .await
    .unwrap();
    assert_eq!(out["head"], json!("a"));
    assert_eq!(out["tail"], json!("b,c"));
  }

  #[tokio::test]
  async fn test_sum() {
    let registry = registry();

    let out = call(&registry, "sum", json!({ "values": [1, 2, 3.5] })).await.unwrap();
    assert_eq!(out["return"], json!(6.5));
    let out = call(&registry, "sum", json!({ "values": [] })).await.unwrap();
    assert_eq!(out["return"], json!(0));
    assert!(call(&registry, "sum", json!({ "values": [1, "x"] })).await.is_err());
  }
}
