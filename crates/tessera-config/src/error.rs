use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing workflow documents.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to access document '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid JSON document: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid YAML document: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("unsupported schema version {found} (this build reads up to {supported})")]
  UnsupportedSchemaVersion { found: u32, supported: u32 },
}
