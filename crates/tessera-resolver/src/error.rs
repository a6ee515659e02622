use thiserror::Error;

/// Errors that can occur while resolving a workflow document.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// Operation lookup failed.
  #[error(transparent)]
  Registry(#[from] tessera_registry::RegistryError),

  /// The assembled workflow is structurally invalid.
  #[error(transparent)]
  Workflow(#[from] tessera_workflow::WorkflowError),

  /// A source string does not name a step output or workflow input.
  #[error("step '{step_id}' references unknown '{reference}'")]
  UnresolvedReference { step_id: String, reference: String },

  /// The document does not fit the signatures it refers to.
  #[error("invalid step '{step_id}': {message}")]
  Validation { step_id: String, message: String },
}
