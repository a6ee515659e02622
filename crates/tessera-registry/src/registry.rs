use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::RegistryError;
use crate::operation::Operation;
use crate::signature::OperationSignature;

/// A signature together with its callable.
#[derive(Clone)]
pub struct RegisteredOperation {
  signature: Arc<OperationSignature>,
  operation: Arc<dyn Operation>,
}

impl RegisteredOperation {
  pub fn signature(&self) -> &OperationSignature {
    &self.signature
  }

  pub fn operation(&self) -> &Arc<dyn Operation> {
    &self.operation
  }
}

impl std::fmt::Debug for RegisteredOperation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RegisteredOperation")
      .field("signature", &self.signature)
      .finish_non_exhaustive()
  }
}

/// Catalog of operations keyed by name, in registration order.
#[derive(Debug, Default)]
pub struct OperationRegistry {
  operations: IndexMap<String, RegisteredOperation>,
}

impl OperationRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an operation. Fails if the name is already taken.
  pub fn register(
    &mut self,
    signature: OperationSignature,
    operation: Arc<dyn Operation>,
  ) -> Result<(), RegistryError> {
    self.register_with_override(signature, operation, false)
  }

  /// Register an operation, replacing an existing one when `allow_override`
  /// is set. A replaced operation keeps its original position in [`list`](Self::list).
  pub fn register_with_override(
    &mut self,
    signature: OperationSignature,
    operation: Arc<dyn Operation>,
    allow_override: bool,
  ) -> Result<(), RegistryError> {
    validate_signature(&signature)?;

    if !allow_override && self.operations.contains_key(&signature.name) {
      return Err(RegistryError::DuplicateName {
        name: signature.name,
      });
    }

    debug!(
      operation = %signature.name,
      kind = ?signature.kind,
      inputs = signature.inputs.len(),
      outputs = signature.outputs.len(),
      "operation_registered"
    );

    let name = signature.name.clone();
    self.operations.insert(
      name,
      RegisteredOperation {
        signature: Arc::new(signature),
        operation,
      },
    );
    Ok(())
  }

  /// Look up an operation by name.
  pub fn lookup(&self, name: &str) -> Result<&RegisteredOperation, RegistryError> {
    self
      .operations
      .get(name)
      .ok_or_else(|| RegistryError::UnknownOperation {
        name: name.to_string(),
      })
  }

  /// Look up only the signature of an operation.
  pub fn signature(&self, name: &str) -> Result<&OperationSignature, RegistryError> {
    self.lookup(name).map(RegisteredOperation::signature)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.operations.contains_key(name)
  }

  /// Registered signatures in registration order.
  ///
  /// The iterator is lazy and cloneable, so it can be restarted from any
  /// point without touching the registry again.
  pub fn list(&self) -> impl Iterator<Item = &OperationSignature> + Clone + '_ {
    self.operations.values().map(RegisteredOperation::signature)
  }

  pub fn len(&self) -> usize {
    self.operations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }

  /// Move every entry of `other` into this registry.
  ///
  /// Nothing is merged if any name collides.
  pub(crate) fn absorb(&mut self, other: OperationRegistry) -> Result<(), RegistryError> {
    if let Some(name) = other
      .operations
      .keys()
      .find(|name| self.operations.contains_key(*name))
    {
      return Err(RegistryError::DuplicateName { name: name.clone() });
    }
    self.operations.extend(other.operations);
    Ok(())
  }
}

fn validate_signature(signature: &OperationSignature) -> Result<(), RegistryError> {
  if signature.name.trim().is_empty() {
    return Err(RegistryError::InvalidSignature {
      name: signature.name.clone(),
      message: "operation name must not be empty".to_string(),
    });
  }

  for (input, spec) in &signature.inputs {
    if let Some(default) = &spec.default
      && !spec.data_type.accepts(default)
    {
      return Err(RegistryError::InvalidSignature {
        name: signature.name.clone(),
        message: format!(
          "default of input '{}' is not of type {}",
          input, spec.data_type
        ),
      });
    }
    if let (Some(min), Some(max)) = (spec.min, spec.max)
      && min > max
    {
      return Err(RegistryError::InvalidSignature {
        name: signature.name.clone(),
        message: format!("input '{}' has min {} greater than max {}", input, min, max),
      });
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::operation::{FnOperation, Values};
  use crate::signature::InputSpec;
  use serde_json::json;
  use tessera_config::DataType;

  fn noop() -> Arc<dyn Operation> {
    Arc::new(FnOperation::new(|_inputs: Values| Ok(Values::new())))
  }

  fn sig(name: &str) -> OperationSignature {
    OperationSignature::new(name).output("return", DataType::Any)
  }

  #[test]
  fn test_register_and_lookup() {
    let mut registry = OperationRegistry::new();
    registry.register(sig("add"), noop()).unwrap();

    assert!(registry.contains("add"));
    assert_eq!(registry.signature("add").unwrap().name, "add");
  }

  #[test]
  fn test_lookup_unknown() {
    let registry = OperationRegistry::new();
    let result = registry.lookup("missing");
    assert!(matches!(
      result,
      Err(RegistryError::UnknownOperation { name }) if name == "missing"
    ));
  }

  #[test]
  fn test_duplicate_rejected_without_override() {
    let mut registry = OperationRegistry::new();
    registry.register(sig("add"), noop()).unwrap();

    let result = registry.register(sig("add"), noop());
    assert!(matches!(result, Err(RegistryError::DuplicateName { .. })));
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn test_override_keeps_position() {
    let mut registry = OperationRegistry::new();
    registry.register(sig("first"), noop()).unwrap();
    registry.register(sig("second"), noop()).unwrap();

    let replacement = sig("first").with_description("replaced");
    registry
      .register_with_override(replacement, noop(), true)
      .unwrap();

    let names: Vec<&str> = registry.list().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(
      registry.signature("first").unwrap().description.as_deref(),
      Some("replaced")
    );
  }

  #[test]
  fn test_list_is_restartable() {
    let mut registry = OperationRegistry::new();
    for name in ["c", "a", "b"] {
      registry.register(sig(name), noop()).unwrap();
    }

    let listing = registry.list();
    let first: Vec<&str> = listing.clone().map(|s| s.name.as_str()).collect();
    let second: Vec<&str> = listing.map(|s| s.name.as_str()).collect();
    assert_eq!(first, vec!["c", "a", "b"]);
    assert_eq!(first, second);
  }

  #[test]
  fn test_rejects_mistyped_default() {
    let mut registry = OperationRegistry::new();
    let bad = sig("bad").input("n", InputSpec::optional(DataType::Integer, Some(json!("x"))));
    let result = registry.register(bad, noop());
    assert!(matches!(result, Err(RegistryError::InvalidSignature { .. })));
  }
}
