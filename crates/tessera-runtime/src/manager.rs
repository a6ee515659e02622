//! Several isolated workspaces addressed by name.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tessera_registry::OperationRegistry;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::WorkspaceConfig;
use crate::error::WorkspaceError;
use crate::workspace::Workspace;

/// Shared handle to one open workspace. Holding its lock gives exclusive
/// access for the whole of an evaluation.
pub type WorkspaceHandle = Arc<Mutex<Workspace>>;

/// Opens, stores and closes workspaces.
///
/// Workspaces share nothing but the read-only registry. Documents live in
/// `<storage_dir>/<name>.json`. The manager's own map lock is only held for
/// lookups, never while a workspace is evaluated or saved.
pub struct WorkspaceManager {
  registry: Arc<OperationRegistry>,
  storage_dir: PathBuf,
  defaults: WorkspaceConfig,
  workspaces: RwLock<HashMap<String, WorkspaceHandle>>,
}

impl WorkspaceManager {
  pub fn new(registry: Arc<OperationRegistry>, storage_dir: impl Into<PathBuf>) -> Self {
    Self {
      registry,
      storage_dir: storage_dir.into(),
      defaults: WorkspaceConfig::default(),
      workspaces: RwLock::new(HashMap::new()),
    }
  }

  /// Settings applied to every workspace this manager creates or opens.
  pub fn with_defaults(mut self, defaults: WorkspaceConfig) -> Self {
    self.defaults = defaults;
    self
  }

  pub fn registry(&self) -> &Arc<OperationRegistry> {
    &self.registry
  }

  pub fn document_path(&self, name: &str) -> PathBuf {
    self.storage_dir.join(format!("{}.json", name))
  }

  /// Create a new, empty workspace.
  pub async fn create(&self, name: &str) -> Result<WorkspaceHandle, WorkspaceError> {
    check_name(name)?;
    if self.document_path(name).exists() {
      return Err(WorkspaceError::AlreadyExists {
        name: name.to_string(),
      });
    }

    let mut workspaces = self.workspaces.write().await;
    if workspaces.contains_key(name) {
      return Err(WorkspaceError::AlreadyOpen {
        name: name.to_string(),
      });
    }

    let config = WorkspaceConfig {
      name: name.to_string(),
      ..self.defaults.clone()
    };
    let handle = Arc::new(Mutex::new(Workspace::new(config, self.registry.clone())));
    workspaces.insert(name.to_string(), handle.clone());
    info!(workspace = %name, "workspace_created");
    Ok(handle)
  }

  /// The open workspace `name`, loading it from storage if needed.
  ///
  /// The stored document's qualified name must be `name`.
  pub async fn open(&self, name: &str) -> Result<WorkspaceHandle, WorkspaceError> {
    check_name(name)?;
    if let Some(handle) = self.get(name).await {
      return Ok(handle);
    }

    let path = self.document_path(name);
    if !path.exists() {
      return Err(WorkspaceError::NotFound {
        name: name.to_string(),
      });
    }
    let workspace = Workspace::open(&path, self.defaults.clone(), self.registry.clone())?;
    if workspace.name() != name {
      return Err(WorkspaceError::NameMismatch {
        name: name.to_string(),
        found: workspace.name().to_string(),
      });
    }

    // Another caller may have opened it while the document was loading.
    let mut workspaces = self.workspaces.write().await;
    let handle = workspaces
      .entry(name.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(workspace)))
      .clone();
    Ok(handle)
  }

  pub async fn get(&self, name: &str) -> Option<WorkspaceHandle> {
    self.workspaces.read().await.get(name).cloned()
  }

  /// Write an open workspace to storage and return the document path.
  pub async fn save(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
    let handle = self.get(name).await.ok_or_else(|| WorkspaceError::NotOpen {
      name: name.to_string(),
    })?;
    let path = self.document_path(name);
    handle.lock().await.save(&path)?;
    Ok(path)
  }

  /// Drop an open workspace and its cached values. Its stored document is
  /// left alone.
  pub async fn close(&self, name: &str) -> Result<(), WorkspaceError> {
    match self.workspaces.write().await.remove(name) {
      Some(_) => {
        debug!(workspace = %name, "workspace_closed");
        Ok(())
      }
      None => Err(WorkspaceError::NotOpen {
        name: name.to_string(),
      }),
    }
  }

  /// Close the workspace if open and delete its stored document.
  pub async fn delete(&self, name: &str) -> Result<(), WorkspaceError> {
    check_name(name)?;
    let was_open = self.workspaces.write().await.remove(name).is_some();

    let path = self.document_path(name);
    let was_stored = path.exists();
    if was_stored {
      std::fs::remove_file(&path).map_err(|source| WorkspaceError::Io {
        path: path.clone(),
        source,
      })?;
    }

    if !was_open && !was_stored {
      return Err(WorkspaceError::NotFound {
        name: name.to_string(),
      });
    }
    info!(workspace = %name, "workspace_deleted");
    Ok(())
  }

  /// Names of the open workspaces, sorted.
  pub async fn list(&self) -> Vec<String> {
    let mut names: Vec<String> = self.workspaces.read().await.keys().cloned().collect();
    names.sort();
    names
  }

  /// Names of the workspaces in storage, sorted.
  pub fn stored(&self) -> Result<Vec<String>, WorkspaceError> {
    if !self.storage_dir.exists() {
      return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&self.storage_dir).map_err(|source| WorkspaceError::Io {
      path: self.storage_dir.clone(),
      source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
      let path = entry
        .map_err(|source| WorkspaceError::Io {
          path: self.storage_dir.clone(),
          source,
        })?
        .path();
      if path.extension().is_some_and(|ext| ext == "json")
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
      {
        names.push(stem.to_string());
      }
    }
    names.sort();
    Ok(names)
  }
}

fn check_name(name: &str) -> Result<(), WorkspaceError> {
  let valid = !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
  if valid {
    Ok(())
  } else {
    Err(WorkspaceError::InvalidName {
      name: name.to_string(),
    })
  }
}
