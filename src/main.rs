mod builtin;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tessera_config::{DocumentFormat, WorkflowDocument};
use tessera_registry::{OperationRegistry, PluginLoader, Values};
use tessera_resolver::{Resolver, StandardResolver};
use tessera_runtime::{
  Workspace, WorkspaceConfig, WorkspaceManager, WorkflowOperation, register_workflow,
};
use tessera_workflow::Workflow;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use builtin::BuiltinPlugin;
use settings::Settings;

/// Tessera - incremental evaluation of operation graphs
#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tessera)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Inspect registered operations
  Ops {
    #[command(subcommand)]
    command: OpsCommand,
  },

  /// Load a workflow document, check it, and print it back
  Validate {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,

    /// Workflow files to register first, in order
    #[arg(long = "include")]
    includes: Vec<PathBuf>,
  },

  /// Run a workflow, or evaluate a single resource of it
  Run {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,

    /// Workflow input value as name=value
    #[arg(long = "input", value_parser = parse_pair)]
    inputs: Vec<(String, String)>,

    /// Workflow files to register first, in order
    #[arg(long = "include")]
    includes: Vec<PathBuf>,

    /// Evaluate this resource instead of the workflow outputs
    #[arg(long)]
    target: Option<String>,
  },

  /// Work with persisted workspaces
  Ws {
    #[command(subcommand)]
    command: WsCommand,
  },
}

#[derive(Subcommand)]
enum OpsCommand {
  /// List every operation
  List,

  /// Show one operation's signature
  Show { name: String },
}

#[derive(Subcommand)]
enum WsCommand {
  /// Create an empty workspace
  New { workspace: String },

  /// Define `resource = op(name=value ...)`; `@other` reads another resource
  Set {
    workspace: String,
    resource: String,
    op: String,
    #[arg(value_parser = parse_pair)]
    args: Vec<(String, String)>,
  },

  /// Define `resource = value`, where value is JSON or a plain string
  Value {
    workspace: String,
    resource: String,
    value: String,
  },

  /// Remove the step producing a resource
  Remove { workspace: String, resource: String },

  /// Evaluate a resource and print its value
  Eval { workspace: String, resource: String },

  /// Print the workspace definition
  Show { workspace: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tessera"),
  };
  let settings = Settings::load(&data_dir)?;
  init_tracing(&settings);

  let Some(command) = cli.command else {
    println!("tessera - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { dispatch(command, &data_dir, &settings).await })
}

fn init_tracing(settings: &Settings) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

async fn dispatch(command: Commands, data_dir: &Path, settings: &Settings) -> Result<()> {
  match command {
    Commands::Ops { command } => {
      let registry = builtin_registry()?;
      match command {
        OpsCommand::List => list_operations(&registry),
        OpsCommand::Show { name } => show_operation(&registry, &name),
      }
    }
    Commands::Validate {
      workflow_file,
      includes,
    } => {
      let registry = registry_with(&includes)?;
      validate(&registry, &workflow_file)
    }
    Commands::Run {
      workflow_file,
      inputs,
      includes,
      target,
    } => {
      let registry = registry_with(&includes)?;
      run(registry, &workflow_file, inputs, target, settings).await
    }
    Commands::Ws { command } => {
      let registry = Arc::new(builtin_registry()?);
      let manager = WorkspaceManager::new(registry, data_dir.join("workspaces"))
        .with_defaults(WorkspaceConfig::default().with_max_parallel_steps(settings.max_parallel_steps));
      workspace_command(&manager, command).await
    }
  }
}

fn builtin_registry() -> Result<OperationRegistry> {
  let mut registry = OperationRegistry::new();
  let plugins = PluginLoader::new()
    .with_plugin(BuiltinPlugin)
    .load(&mut registry)
    .context("failed to load plugins")?;
  debug!(plugins = ?plugins, operations = registry.len(), "registry_ready");
  Ok(registry)
}

/// The built-in registry plus every included workflow, registered in order.
fn registry_with(includes: &[PathBuf]) -> Result<OperationRegistry> {
  let mut registry = builtin_registry()?;
  for path in includes {
    let workflow = load_workflow(&registry, path)?;
    register_workflow(&mut registry, workflow)
      .with_context(|| format!("failed to register workflow: {}", path.display()))?;
  }
  Ok(registry)
}

fn load_workflow(registry: &OperationRegistry, path: &Path) -> Result<Workflow> {
  let document = WorkflowDocument::load(path)
    .with_context(|| format!("failed to load workflow file: {}", path.display()))?;
  StandardResolver::new(registry)
    .resolve(document)
    .with_context(|| format!("failed to resolve workflow: {}", path.display()))
}

fn list_operations(registry: &OperationRegistry) -> Result<()> {
  for signature in registry.list() {
    let inputs: Vec<&str> = signature.inputs.keys().map(String::as_str).collect();
    let outputs: Vec<&str> = signature.outputs.keys().map(String::as_str).collect();
    println!(
      "{}({}) -> {}",
      signature.name,
      inputs.join(", "),
      outputs.join(", ")
    );
  }
  Ok(())
}

fn show_operation(registry: &OperationRegistry, name: &str) -> Result<()> {
  let signature = registry.signature(name)?;
  println!("{}", serde_json::to_string_pretty(signature)?);
  Ok(())
}

fn validate(registry: &OperationRegistry, path: &Path) -> Result<()> {
  let workflow = load_workflow(registry, path)?;
  let graph = workflow.graph();
  let order = graph.full_order()?;
  eprintln!(
    "Workflow {} is valid: {} steps ({}), entry points: {}",
    workflow.qualified_name,
    workflow.steps().len(),
    order.join(" -> "),
    graph.entry_points().join(", ")
  );

  let document = tessera_resolver::to_document(&workflow);
  println!("{}", document.render(DocumentFormat::from_path(path))?);
  Ok(())
}

async fn run(
  registry: OperationRegistry,
  path: &Path,
  inputs: Vec<(String, String)>,
  target: Option<String>,
  settings: &Settings,
) -> Result<()> {
  let registry = Arc::new(registry);
  let workflow = load_workflow(&registry, path)?;
  eprintln!("Loaded workflow: {}", workflow.qualified_name);
  let cancel = cancel_on_ctrl_c();

  match target {
    Some(target) => {
      let config = WorkspaceConfig::default().with_max_parallel_steps(settings.max_parallel_steps);
      let mut workspace = Workspace::from_workflow(config, registry.clone(), workflow)?;
      for (name, raw) in inputs {
        workspace.bind_input(&name, Value::String(raw))?;
      }

      let report = workspace
        .evaluate_with_cancel(&target, &cancel)
        .await
        .with_context(|| format!("failed to evaluate '{}'", target))?;
      eprintln!(
        "Evaluation {} completed: {} invoked, {} inlined",
        report.evaluation_id,
        report.invocations(),
        report.inlined.len()
      );
      println!("{}", serde_json::to_string_pretty(&report.value)?);
    }
    None => {
      if workflow.outputs().is_empty() {
        bail!(
          "workflow '{}' declares no outputs; pick a resource with --target",
          workflow.qualified_name
        );
      }

      let inputs: Values = inputs
        .into_iter()
        .map(|(name, raw)| (name, Value::String(raw)))
        .collect();
      let operation =
        WorkflowOperation::new(workflow).with_max_parallel_steps(settings.max_parallel_steps);
      let outputs = operation
        .invoke_with(&registry, inputs, &cancel)
        .await
        .context("workflow execution failed")?;
      println!("{}", serde_json::to_string_pretty(&outputs)?);
    }
  }

  Ok(())
}

async fn workspace_command(manager: &WorkspaceManager, command: WsCommand) -> Result<()> {
  match command {
    WsCommand::New { workspace } => {
      manager.create(&workspace).await?;
      let path = manager.save(&workspace).await?;
      eprintln!("Created workspace {} at {}", workspace, path.display());
    }
    WsCommand::Set {
      workspace,
      resource,
      op,
      args,
    } => {
      let handle = manager.open(&workspace).await?;
      handle.lock().await.set_resource(&resource, &op, args)?;
      manager.save(&workspace).await?;
    }
    WsCommand::Value {
      workspace,
      resource,
      value,
    } => {
      let handle = manager.open(&workspace).await?;
      handle.lock().await.set_value(&resource, parse_value(&value))?;
      manager.save(&workspace).await?;
    }
    WsCommand::Remove {
      workspace,
      resource,
    } => {
      let handle = manager.open(&workspace).await?;
      let removed = handle.lock().await.delete_resource(&resource)?;
      manager.save(&workspace).await?;
      eprintln!("Removed step {}", removed.id);
    }
    WsCommand::Eval {
      workspace,
      resource,
    } => {
      let handle = manager.open(&workspace).await?;
      let cancel = cancel_on_ctrl_c();
      let report = handle
        .lock()
        .await
        .evaluate_with_cancel(&resource, &cancel)
        .await
        .with_context(|| format!("failed to evaluate '{}'", resource))?;
      println!("{}", serde_json::to_string_pretty(&report.value)?);
    }
    WsCommand::Show { workspace } => {
      let handle = manager.open(&workspace).await?;
      print!("{}", handle.lock().await.describe());
    }
  }
  Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });
  cancel
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_parse_pair() {
    assert_eq!(
      parse_pair("x=@a").unwrap(),
      ("x".to_string(), "@a".to_string())
    );
    assert_eq!(
      parse_pair("expr=a=b").unwrap(),
      ("expr".to_string(), "a=b".to_string())
    );
    assert!(parse_pair("missing").is_err());
  }

  #[test]
  fn test_parse_value() {
    assert_eq!(parse_value("5"), json!(5));
    assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
    assert_eq!(parse_value("hello"), json!("hello"));
  }

  #[test]
  fn test_include_registers_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("double.yaml");
    std::fs::write(
      &path,
      r#"
qualified_name: lib.double
inputs:
  n:
    data_type: number
steps:
  - id: twice
    op: add
    inputs:
      x: lib.double.n
      y: lib.double.n
outputs:
  result:
    source: twice
"#,
    )
    .unwrap();

    let registry = registry_with(&[path]).unwrap();
    assert!(registry.contains("lib.double"));
    assert!(registry.contains("add"));
  }

  #[test]
  fn test_cli_parses_workspace_set() {
    let cli = Cli::try_parse_from(["tessera", "ws", "set", "demo", "c", "add", "x=@a", "y=2"]).unwrap();
    let Some(Commands::Ws {
      command: WsCommand::Set { args, .. },
    }) = cli.command
    else {
      panic!("expected ws set");
    };
    assert_eq!(args.len(), 2);
  }
}
