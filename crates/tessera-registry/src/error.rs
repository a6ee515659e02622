use thiserror::Error;

/// Errors raised while registering or looking up operations.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("unknown operation: {name}")]
  UnknownOperation { name: String },

  #[error("operation already registered: {name}")]
  DuplicateName { name: String },

  #[error("invalid signature for operation '{name}': {message}")]
  InvalidSignature { name: String, message: String },

  #[error("plugin '{plugin}' failed to initialize: {source}")]
  PluginInit {
    plugin: String,
    #[source]
    source: Box<RegistryError>,
  },
}

/// Failure reported by an operation body.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperationError {
  message: String,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperationError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source: None,
    }
  }

  pub fn with_source(
    message: impl Into<String>,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self {
      message: message.into(),
      source: Some(source.into()),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}
