//! Tessera Registry
//!
//! The process-wide catalog of operations. Each entry pairs an immutable
//! [`OperationSignature`] with the callable that implements it.
//!
//! Registration happens once at startup, driven by the [`PluginLoader`]; after
//! that the registry is shared read-only (typically behind an `Arc`) by every
//! workspace.

mod error;
mod operation;
mod plugin;
mod registry;
mod signature;

pub use error::{OperationError, RegistryError};
pub use operation::{FnOperation, InvocationContext, Operation, Values};
pub use plugin::{Plugin, PluginLoader};
pub use registry::{OperationRegistry, RegisteredOperation};
pub use signature::{InputSpec, OperationKind, OperationSignature, OutputSpec};
pub use tessera_config::DataType;
