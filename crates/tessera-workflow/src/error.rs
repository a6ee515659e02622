use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("duplicate step id: {step_id}")]
  DuplicateStepId { step_id: String },

  #[error("step not found: {step_id}")]
  StepNotFound { step_id: String },

  #[error("invalid step id '{step_id}': {message}")]
  InvalidStepId { step_id: String, message: String },

  #[error("cycle detected in workflow graph: {}", path.join(" -> "))]
  CyclicGraph { path: Vec<String> },

  #[error("step '{step_id}' references unknown '{reference}'")]
  UnresolvedReference { step_id: String, reference: String },

  #[error("resource '{resource}' is already published by step '{step_id}'")]
  DuplicateResource { resource: String, step_id: String },

  #[error("unknown resource: {name}")]
  UnknownResource { name: String },

  #[error("invalid workflow: {message}")]
  Validation { message: String },
}
