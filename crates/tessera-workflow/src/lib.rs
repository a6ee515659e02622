//! Tessera Workflow
//!
//! This crate provides the typed workflow model that the engine executes.
//!
//! Key differences from `tessera-config`:
//! - Step inputs are typed [`Source`] values instead of free-text strings
//! - Every step declares its outputs and the resource names they publish
//! - The step graph is kept acyclic on every mutation
//! - References are checked when a step is added, not when it runs

mod error;
mod graph;
mod source;
mod step;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use source::{REFERENCE_MARKER, Source};
pub use step::{Step, StepKind, default_resource_name};
pub use workflow::{Workflow, WorkflowInput};
