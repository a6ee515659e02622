#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::{Value, json};
use tessera_config::DataType;
use tessera_registry::{
  FnOperation, InputSpec, OperationError, OperationRegistry, OperationSignature, Values,
};
use tessera_runtime::{Workspace, WorkspaceConfig};

/// Test operations plus switches to observe and steer them.
pub struct Fixture {
  pub registry: OperationRegistry,
  /// Invocations of every fixture operation.
  pub calls: Arc<AtomicUsize>,
  /// While set, `flaky` fails.
  pub broken: Arc<AtomicBool>,
}

impl Fixture {
  pub fn new() -> Self {
    let calls = Arc::new(AtomicUsize::new(0));
    let broken = Arc::new(AtomicBool::new(true));
    let mut registry = OperationRegistry::new();

    register(
      &mut registry,
      OperationSignature::new("const")
        .input("value", InputSpec::required(DataType::Any))
        .output(OperationSignature::RETURN, DataType::Any),
      &calls,
      |inputs| Ok(single(inputs["value"].clone())),
    );
    register(
      &mut registry,
      OperationSignature::new("identity")
        .input("value", InputSpec::required(DataType::Any))
        .output(OperationSignature::RETURN, DataType::Any),
      &calls,
      |inputs| Ok(single(inputs["value"].clone())),
    );
    register(
      &mut registry,
      OperationSignature::new("add")
        .input("x", InputSpec::required(DataType::Number))
        .input("y", InputSpec::optional(DataType::Number, Some(json!(0))))
        .output(OperationSignature::RETURN, DataType::Number),
      &calls,
      |inputs| Ok(single(sum(&inputs["x"], &inputs["y"]))),
    );
    register(
      &mut registry,
      OperationSignature::new("split")
        .input("text", InputSpec::required(DataType::String))
        .output("head", DataType::String)
        .output("tail", DataType::String),
      &calls,
      |inputs| {
        let text = inputs["text"].as_str().unwrap_or_default();
        let (head, tail) = text.split_once(' ').unwrap_or((text, ""));
        Ok(Values::from([
          ("head".to_string(), json!(head)),
          ("tail".to_string(), json!(tail)),
        ]))
      },
    );
    register(
      &mut registry,
      OperationSignature::new("fail")
        .input("value", InputSpec::optional(DataType::Any, None))
        .output(OperationSignature::RETURN, DataType::Any),
      &calls,
      |_| Err(OperationError::new("boom")),
    );

    let switch = broken.clone();
    register(
      &mut registry,
      OperationSignature::new("flaky")
        .input("value", InputSpec::required(DataType::Any))
        .output(OperationSignature::RETURN, DataType::Any),
      &calls,
      move |inputs| {
        if switch.load(Ordering::SeqCst) {
          Err(OperationError::new("flaky is broken"))
        } else {
          Ok(single(inputs["value"].clone()))
        }
      },
    );

    Self {
      registry,
      calls,
      broken,
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Move the registry into a workspace, keeping the counters.
  pub fn workspace(self, name: &str) -> (Workspace, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let workspace = Workspace::new(WorkspaceConfig::new(name), Arc::new(self.registry));
    (workspace, self.calls, self.broken)
  }
}

fn register<F>(
  registry: &mut OperationRegistry,
  signature: OperationSignature,
  calls: &Arc<AtomicUsize>,
  body: F,
) where
  F: Fn(Values) -> Result<Values, OperationError> + Send + Sync + 'static,
{
  let calls = calls.clone();
  registry
    .register(
      signature,
      Arc::new(FnOperation::new(move |inputs| {
        calls.fetch_add(1, Ordering::SeqCst);
        body(inputs)
      })),
    )
    .unwrap();
}

pub fn single(value: Value) -> Values {
  Values::from([(OperationSignature::RETURN.to_string(), value)])
}

fn sum(x: &Value, y: &Value) -> Value {
  match (x.as_i64(), y.as_i64()) {
    (Some(a), Some(b)) => json!(a + b),
    _ => json!(x.as_f64().unwrap_or_default() + y.as_f64().unwrap_or_default()),
  }
}
