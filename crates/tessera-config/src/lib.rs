//! Tessera Config
//!
//! This crate contains the serializable workflow document types for tessera.
//! A document describes the structure of a workflow only: its declared inputs
//! and outputs, its steps and how step inputs are wired. Computed values never
//! appear in a document.
//!
//! Documents can be loaded from:
//! - JSON files (`.json`, or any unknown extension)
//! - YAML files (`.yaml` / `.yml`)
//!
//! The resolver takes these types, validates them against the operation
//! registry, and turns them into the typed workflow model used for execution.

mod data_type;
mod document;
mod error;
mod format;

pub use data_type::DataType;
pub use document::{
  CURRENT_SCHEMA_VERSION, InputDef, OutputDef, SourceDef, StepDef, StepType, WorkflowDocument,
};
pub use error::ConfigError;
pub use format::DocumentFormat;
