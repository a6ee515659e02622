//! Evaluation engine and workspaces.
//!
//! A [`Workspace`] owns one workflow and a [`ResourceGraph`] caching the
//! values of its step outputs. [`Evaluator`] brings a resource up to date,
//! recomputing only steps whose inputs changed. Workflows register as
//! operations through [`register_workflow`].

mod config;
mod engine;
mod error;
mod events;
mod fingerprint;
mod input;
mod manager;
mod nested;
mod resource_graph;
mod result;
mod workspace;

pub use config::WorkspaceConfig;
pub use engine::Evaluator;
pub use error::{RuntimeError, WorkspaceError};
pub use events::{ChannelNotifier, EvaluationEvent, EvaluationNotifier, NoopNotifier};
pub use fingerprint::{canonical_json, value_fingerprint};
pub use input::{coerce_value, prepare_inputs};
pub use manager::{WorkspaceHandle, WorkspaceManager};
pub use nested::{WorkflowOperation, register_workflow, workflow_signature};
pub use resource_graph::{ResourceEntry, ResourceGraph, ResourceState};
pub use result::EvaluationReport;
pub use workspace::{ResourceInfo, Workspace};
