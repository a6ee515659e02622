//! Reading and writing documents as JSON or YAML.

use std::path::Path;

use crate::document::{CURRENT_SCHEMA_VERSION, WorkflowDocument};
use crate::error::ConfigError;

/// On-disk document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
  Json,
  Yaml,
}

impl DocumentFormat {
  /// Pick the format from a file extension. Unknown extensions read as JSON.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some("yaml") | Some("yml") => DocumentFormat::Yaml,
      _ => DocumentFormat::Json,
    }
  }
}

impl WorkflowDocument {
  /// Parse a document from a string in the given format.
  pub fn parse(content: &str, format: DocumentFormat) -> Result<Self, ConfigError> {
    let doc: WorkflowDocument = match format {
      DocumentFormat::Json => serde_json::from_str(content)?,
      DocumentFormat::Yaml => serde_yaml::from_str(content)?,
    };

    if doc.schema_version > CURRENT_SCHEMA_VERSION {
      return Err(ConfigError::UnsupportedSchemaVersion {
        found: doc.schema_version,
        supported: CURRENT_SCHEMA_VERSION,
      });
    }

    Ok(doc)
  }

  /// Render the document in the given format.
  pub fn render(&self, format: DocumentFormat) -> Result<String, ConfigError> {
    match format {
      DocumentFormat::Json => Ok(serde_json::to_string_pretty(self)?),
      DocumentFormat::Yaml => Ok(serde_yaml::to_string(self)?),
    }
  }

  /// Load a document from disk, choosing the format by extension.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content, DocumentFormat::from_path(path))
  }

  /// Write a document to disk, choosing the format by extension.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = self.render(DocumentFormat::from_path(path))?;
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_from_extension() {
    assert_eq!(DocumentFormat::from_path(Path::new("a.yaml")), DocumentFormat::Yaml);
    assert_eq!(DocumentFormat::from_path(Path::new("a.yml")), DocumentFormat::Yaml);
    assert_eq!(DocumentFormat::from_path(Path::new("a.json")), DocumentFormat::Json);
    assert_eq!(DocumentFormat::from_path(Path::new("a")), DocumentFormat::Json);
  }

  #[test]
  fn test_rejects_future_schema() {
    let result = WorkflowDocument::parse(
      r#"{ "schema_version": 99, "qualified_name": "x" }"#,
      DocumentFormat::Json,
    );
    assert!(matches!(
      result,
      Err(ConfigError::UnsupportedSchemaVersion { found: 99, .. })
    ));
  }
}
