//! Explicit plugin initialization.
//!
//! Plugins never register themselves as a side effect of being linked in.
//! The host collects them into a [`PluginLoader`] and calls
//! [`PluginLoader::load`] exactly once at startup.

use tracing::info;

use crate::error::RegistryError;
use crate::registry::OperationRegistry;

/// A bundle of operations contributed to the registry.
pub trait Plugin: Send + Sync {
  fn name(&self) -> &str;

  /// Register this plugin's operations.
  fn init(&self, registry: &mut OperationRegistry) -> Result<(), RegistryError>;
}

/// Collects plugins and initializes them against a registry.
#[derive(Default)]
pub struct PluginLoader {
  plugins: Vec<Box<dyn Plugin>>,
}

impl PluginLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  pub fn add(&mut self, plugin: Box<dyn Plugin>) {
    self.plugins.push(plugin);
  }

  /// Initialize every plugin in insertion order and return their names.
  ///
  /// Each plugin registers into a staging registry first, so a plugin that
  /// fails halfway contributes nothing.
  pub fn load(self, registry: &mut OperationRegistry) -> Result<Vec<String>, RegistryError> {
    let mut loaded = Vec::with_capacity(self.plugins.len());

    for plugin in self.plugins {
      let name = plugin.name().to_string();
      let mut staging = OperationRegistry::new();

      plugin
        .init(&mut staging)
        .and_then(|_| {
          let count = staging.len();
          registry.absorb(staging).map(|_| count)
        })
        .map(|count| info!(plugin = %name, operations = count, "plugin_loaded"))
        .map_err(|e| RegistryError::PluginInit {
          plugin: name.clone(),
          source: Box::new(e),
        })?;

      loaded.push(name);
    }

    Ok(loaded)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::operation::{FnOperation, Values};
  use crate::signature::OperationSignature;
  use tessera_config::DataType;

  struct NamedOps {
    name: &'static str,
    ops: Vec<&'static str>,
  }

  impl Plugin for NamedOps {
    fn name(&self) -> &str {
      self.name
    }

    fn init(&self, registry: &mut OperationRegistry) -> Result<(), RegistryError> {
      for op in &self.ops {
        registry.register(
          OperationSignature::new(*op).output("return", DataType::Any),
          Arc::new(FnOperation::new(|_: Values| Ok(Values::new()))),
        )?;
      }
      Ok(())
    }
  }

  #[test]
  fn test_load_in_order() {
    let mut registry = OperationRegistry::new();
    let loaded = PluginLoader::new()
      .with_plugin(NamedOps {
        name: "math",
        ops: vec!["add", "sub"],
      })
      .with_plugin(NamedOps {
        name: "text",
        ops: vec!["concat"],
      })
      .load(&mut registry)
      .unwrap();

    assert_eq!(loaded, vec!["math", "text"]);
    let names: Vec<&str> = registry.list().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["add", "sub", "concat"]);
  }

  #[test]
  fn test_failing_plugin_contributes_nothing() {
    let mut registry = OperationRegistry::new();
    let result = PluginLoader::new()
      .with_plugin(NamedOps {
        name: "math",
        ops: vec!["add"],
      })
      .with_plugin(NamedOps {
        name: "clash",
        ops: vec!["mul", "add"],
      })
      .load(&mut registry);

    assert!(matches!(
      result,
      Err(RegistryError::PluginInit { ref plugin, .. }) if plugin == "clash"
    ));
    assert!(registry.contains("add"));
    assert!(!registry.contains("mul"));
  }
}
