//! The invocation contract between the engine and operation bodies.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::OperationError;
use crate::registry::OperationRegistry;

/// Named values passed to and returned from an operation.
pub type Values = IndexMap<String, serde_json::Value>;

/// What an operation can see of the engine while it runs.
pub struct InvocationContext<'a> {
  /// The registry the operation was looked up in; nested workflows use it
  /// to invoke their own steps.
  pub registry: &'a Arc<OperationRegistry>,
  /// Id of the step being evaluated.
  pub step_id: &'a str,
  /// Cancellation of the surrounding evaluation. Long-running bodies may
  /// poll it; the engine itself only checks it between steps.
  pub cancel: &'a CancellationToken,
}

/// A callable registered under an [`OperationSignature`](crate::OperationSignature).
///
/// Inputs arrive already coerced to the declared types, with defaults filled
/// in. The returned map must contain every declared output.
#[async_trait]
pub trait Operation: Send + Sync {
  async fn invoke(
    &self,
    ctx: &InvocationContext<'_>,
    inputs: Values,
  ) -> Result<Values, OperationError>;
}

/// Adapts a synchronous closure into an [`Operation`].
///
/// The closure runs on tokio's blocking pool, so a slow body never stalls
/// the steps running beside it.
pub struct FnOperation<F> {
  func: Arc<F>,
}

impl<F> FnOperation<F>
where
  F: Fn(Values) -> Result<Values, OperationError> + Send + Sync + 'static,
{
  pub fn new(func: F) -> Self {
    Self {
      func: Arc::new(func),
    }
  }
}

#[async_trait]
impl<F> Operation for FnOperation<F>
where
  F: Fn(Values) -> Result<Values, OperationError> + Send + Sync + 'static,
{
  async fn invoke(
    &self,
    ctx: &InvocationContext<'_>,
    inputs: Values,
  ) -> Result<Values, OperationError> {
    let func = self.func.clone();
    tokio::task::spawn_blocking(move || func(inputs))
      .await
      .map_err(|e| {
        OperationError::with_source(format!("step '{}' did not complete", ctx.step_id), e)
      })?
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_fn_operation_runs_closure() {
    let registry = Arc::new(OperationRegistry::new());
    let cancel = CancellationToken::new();
    let ctx = InvocationContext {
      registry: &registry,
      step_id: "double",
      cancel: &cancel,
    };

    let op = FnOperation::new(|inputs: Values| {
      let n = inputs["n"].as_i64().unwrap_or_default();
      Ok(Values::from([("return".to_string(), serde_json::json!(n * 2))]))
    });
    let outputs = op
      .invoke(&ctx, Values::from([("n".to_string(), serde_json::json!(21))]))
      .await
      .unwrap();
    assert_eq!(outputs["return"], serde_json::json!(42));
  }

  #[tokio::test]
  async fn test_fn_operation_panic_becomes_error() {
    let registry = Arc::new(OperationRegistry::new());
    let cancel = CancellationToken::new();
    let ctx = InvocationContext {
      registry: &registry,
      step_id: "broken",
      cancel: &cancel,
    };

    let op = FnOperation::new(|_: Values| -> Result<Values, OperationError> { panic!("bad body") });
    let err = op.invoke(&ctx, Values::new()).await.unwrap_err();
    assert!(err.message().contains("broken"));
  }
}
