//! Runtime error types.

use std::path::PathBuf;

use tessera_config::{ConfigError, DataType};
use tessera_registry::{OperationError, RegistryError};
use tessera_resolver::ResolveError;
use tessera_workflow::WorkflowError;

/// Errors that can occur while evaluating resources.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// Evaluation was cancelled between steps.
  #[error("evaluation cancelled")]
  Cancelled,

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("unknown resource: {name}")]
  UnknownResource { name: String },

  #[error("unknown workflow input: {name}")]
  UnknownInput { name: String },

  /// A workflow input is read but has neither a bound value nor a default.
  #[error("workflow input '{name}' has no value")]
  UnboundInput { name: String },

  /// A value could not be converted to the declared input type.
  #[error("step '{step_id}': input '{input}' expected {expected}, got {found}")]
  TypeMismatch {
    step_id: String,
    input: String,
    expected: DataType,
    found: String,
  },

  #[error("step '{step_id}': input '{input}' {message}")]
  ConstraintViolation {
    step_id: String,
    input: String,
    message: String,
  },

  #[error("step '{step_id}': required input '{input}' is not bound")]
  MissingInput { step_id: String, input: String },

  /// The operation returned outputs that do not fit its signature.
  #[error("step '{step_id}' produced invalid output: {message}")]
  InvalidOutput { step_id: String, message: String },

  /// The operation body failed.
  #[error("step '{step_id}' failed in operation '{operation}': {source}")]
  OperationExecution {
    step_id: String,
    operation: String,
    #[source]
    source: OperationError,
  },

  #[error("step '{step_id}' has unsupported type '{step_type}'")]
  UnsupportedStepType { step_id: String, step_type: String },

  /// The resource failed earlier and has not been re-run since.
  #[error("resource '{resource}' previously failed: {message}")]
  PreviouslyFailed { resource: String, message: String },
}

/// Errors raised while managing or persisting workspaces.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error("workspace already open: {name}")]
  AlreadyOpen { name: String },

  #[error("workspace not open: {name}")]
  NotOpen { name: String },

  #[error("workspace already exists: {name}")]
  AlreadyExists { name: String },

  #[error("workspace not found: {name}")]
  NotFound { name: String },

  /// The stored document declares a different workflow name than the
  /// workspace it is stored under.
  #[error("workspace '{name}' holds a document named '{found}'")]
  NameMismatch { name: String, found: String },

  #[error("invalid workspace name '{name}'")]
  InvalidName { name: String },

  #[error("failed to access '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
