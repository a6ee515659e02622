mod binding;
mod document;
mod error;
mod resolver;

pub use binding::{check_step, check_workflow, operation_step, parse_source};
pub use document::to_document;
pub use error::ResolveError;
pub use resolver::{Resolver, StandardResolver};
