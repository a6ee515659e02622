//! Settings read from the data directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Contents of `<data_dir>/settings.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// `tracing` filter used when `RUST_LOG` is not set.
  pub log_filter: String,
  /// How many independent steps may run at once.
  pub max_parallel_steps: usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      log_filter: "warn".to_string(),
      max_parallel_steps: 1,
    }
  }
}

impl Settings {
  pub fn path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
  }

  /// Load the settings file, falling back to defaults when it is absent.
  pub fn load(data_dir: &Path) -> Result<Self> {
    let path = Self::path(data_dir);
    if !path.exists() {
      return Ok(Self::default());
    }

    let content = std::fs::read_to_string(&path)
      .with_context(|| format!("failed to read settings: {}", path.display()))?;
    serde_json::from_str(&content)
      .with_context(|| format!("failed to parse settings: {}", path.display()))
  }
}
