//! An interactive workspace: one implicit workflow plus its cached resources.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tessera_config::WorkflowDocument;
use tessera_registry::{OperationRegistry, Values};
use tessera_resolver::{
  Resolver, StandardResolver, check_step, check_workflow, operation_step, to_document,
};
use tessera_workflow::{Source, Step, StepKind, Workflow, WorkflowError, WorkflowInput};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::WorkspaceConfig;
use crate::engine::Evaluator;
use crate::error::{RuntimeError, WorkspaceError};
use crate::events::{EvaluationEvent, EvaluationNotifier, NoopNotifier};
use crate::input::coerce_value;
use crate::resource_graph::{ResourceGraph, ResourceState};
use crate::result::EvaluationReport;

/// Snapshot of one resource for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
  pub name: String,
  pub producer: String,
  pub output: String,
  pub state: ResourceState,
  pub version: u64,
  pub value: Option<Value>,
}

/// A workflow being edited together with its resource graph.
///
/// Every structural change invalidates exactly the affected resources;
/// evaluation recomputes only what is missing. Only the workflow
/// structure is persisted, never cached values or bound input values.
pub struct Workspace {
  config: WorkspaceConfig,
  registry: Arc<OperationRegistry>,
  workflow: Workflow,
  graph: ResourceGraph,
  bindings: Values,
  notifier: Arc<dyn EvaluationNotifier>,
}

impl Workspace {
  pub fn new(config: WorkspaceConfig, registry: Arc<OperationRegistry>) -> Self {
    let workflow = Workflow::new(config.name.clone());
    Self {
      config,
      registry,
      workflow,
      graph: ResourceGraph::new(),
      bindings: Values::new(),
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// Wrap an existing workflow; the workspace takes its qualified name.
  pub fn from_workflow(
    mut config: WorkspaceConfig,
    registry: Arc<OperationRegistry>,
    workflow: Workflow,
  ) -> Result<Self, RuntimeError> {
    check_workflow(&registry, &workflow)?;
    config.name = workflow.qualified_name.clone();

    let mut graph = ResourceGraph::new();
    graph.sync(&workflow);
    Ok(Self {
      config,
      registry,
      workflow,
      graph,
      bindings: Values::new(),
      notifier: Arc::new(NoopNotifier),
    })
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn EvaluationNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Load a workspace from a workflow document.
  #[instrument(
    name = "workspace_open",
    skip(path, config, registry),
    fields(path = %path.as_ref().display())
  )]
  pub fn open(
    path: impl AsRef<Path>,
    config: WorkspaceConfig,
    registry: Arc<OperationRegistry>,
  ) -> Result<Self, WorkspaceError> {
    let document = WorkflowDocument::load(path.as_ref())?;
    let workflow = StandardResolver::new(&registry).resolve(document)?;
    info!(workspace = %workflow.qualified_name, steps = workflow.steps().len(), "workspace_opened");
    Ok(Self::from_workflow(config, registry, workflow)?)
  }

  /// Write the workspace's workflow as a document.
  #[instrument(
    name = "workspace_save",
    skip(self, path),
    fields(workspace = %self.config.name, path = %path.as_ref().display())
  )]
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
    self.to_document().save(path.as_ref())?;
    info!(workspace = %self.config.name, "workspace_saved");
    Ok(())
  }

  pub fn to_document(&self) -> WorkflowDocument {
    to_document(&self.workflow)
  }

  pub fn name(&self) -> &str {
    &self.config.name
  }

  pub fn config(&self) -> &WorkspaceConfig {
    &self.config
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  pub fn registry(&self) -> &Arc<OperationRegistry> {
    &self.registry
  }

  /// `name = op(args)`, with arguments in reference syntax: `@resource`
  /// reads another resource, anything else is a literal string coerced to
  /// the declared input type at invocation.
  pub fn set_resource<I, K, V>(&mut self, name: &str, op: &str, args: I) -> Result<(), RuntimeError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<str>,
  {
    let mut inputs = IndexMap::new();
    for (input, raw) in args {
      inputs.insert(input.into(), self.workflow.parse_argument(raw.as_ref())?);
    }
    self.set_operation(name, op, inputs)
  }

  /// `name = op(inputs)` with typed sources.
  pub fn set_operation(
    &mut self,
    name: &str,
    op: &str,
    inputs: IndexMap<String, Source>,
  ) -> Result<(), RuntimeError> {
    let step = operation_step(&self.registry, name, op, inputs)?;
    self.set_step(step)
  }

  /// `name = value`, evaluated inline without the registry.
  pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
    self.set_step(Step::expression(name, value))
  }

  /// Add or replace a step. On success the step's outputs and everything
  /// downstream go back to `Absent`; on failure nothing changes.
  pub fn set_step(&mut self, step: Step) -> Result<(), RuntimeError> {
    check_workflow_step(&self.registry, &self.workflow, &step)?;

    let step_id = step.id.clone();
    let previous = self.workflow.set_step(step)?;

    let mut resources: Vec<String> = previous
      .map(|p| p.outputs.into_values().collect())
      .unwrap_or_default();
    resources.extend(self.downstream_resources([step_id.as_str()]));
    self.invalidate(resources);
    self.graph.sync(&self.workflow);
    Ok(())
  }

  /// Remove a step. Steps reading from it keep their now dangling
  /// references and fail to evaluate until they are redefined.
  pub fn remove_step(&mut self, step_id: &str) -> Result<Step, RuntimeError> {
    let resources = self.downstream_resources([step_id]);
    let dependents: Vec<String> = self
      .workflow
      .dependents_of(step_id)
      .into_iter()
      .map(str::to_string)
      .collect();
    let removed = self.workflow.remove_step(step_id)?;
    if !dependents.is_empty() {
      warn!(
        workspace = %self.config.name,
        step_id,
        dependents = ?dependents,
        "dependents_left_dangling"
      );
    }
    self.invalidate(resources);
    self.graph.sync(&self.workflow);
    Ok(removed)
  }

  /// Remove the step producing `resource`.
  pub fn delete_resource(&mut self, resource: &str) -> Result<Step, RuntimeError> {
    let step_id = self
      .workflow
      .resource_producer(resource)
      .map(|(step, _)| step.id.clone())
      .ok_or_else(|| RuntimeError::UnknownResource {
        name: resource.to_string(),
      })?;
    self.remove_step(&step_id)
  }

  /// Declare (or redeclare) a workflow input.
  pub fn declare_input(&mut self, name: &str, input: WorkflowInput) {
    self.workflow.add_input(name, input);
    let resources = self.input_readers(name);
    self.invalidate(resources);
  }

  /// Bind a value to a declared workflow input for this session.
  pub fn bind_input(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
    let data_type = self
      .workflow
      .inputs()
      .get(name)
      .map(|input| input.data_type)
      .ok_or_else(|| RuntimeError::UnknownInput {
        name: name.to_string(),
      })?;
    let value = coerce_value(&self.workflow.qualified_name, name, value, data_type)?;

    if self.bindings.get(name) != Some(&value) {
      self.bindings.insert(name.to_string(), value);
      let resources = self.input_readers(name);
      self.invalidate(resources);
    }
    Ok(())
  }

  /// Expose a workflow output, so the workspace can be called as a workflow.
  pub fn set_output(&mut self, name: &str, source: Source) -> Result<(), RuntimeError> {
    self.workflow.set_output(name, source)?;
    Ok(())
  }

  pub async fn evaluate(&mut self, resource: &str) -> Result<EvaluationReport, RuntimeError> {
    self
      .evaluate_with_cancel(resource, &CancellationToken::new())
      .await
  }

  pub async fn evaluate_with_cancel(
    &mut self,
    resource: &str,
    cancel: &CancellationToken,
  ) -> Result<EvaluationReport, RuntimeError> {
    let evaluator = Evaluator::new(self.registry.clone())
      .with_notifier(self.notifier.as_ref())
      .with_max_parallel_steps(self.config.max_parallel_steps);
    evaluator
      .evaluate(&self.workflow, &mut self.graph, &self.bindings, resource, cancel)
      .await
  }

  /// Reset failed resources `resource` depends on, then evaluate it.
  pub async fn rerun(&mut self, resource: &str) -> Result<EvaluationReport, RuntimeError> {
    let step_id = self
      .workflow
      .resource_producer(resource)
      .map(|(step, _)| step.id.clone())
      .ok_or_else(|| RuntimeError::UnknownResource {
        name: resource.to_string(),
      })?;

    let closure = self.workflow.graph().upstream_closure(&step_id);
    let failed: Vec<String> = self
      .graph
      .failed_of(&closure)
      .into_iter()
      .map(|(name, _)| name.to_string())
      .collect();
    self.invalidate(failed);

    self.evaluate(resource).await
  }

  pub fn value(&self, resource: &str) -> Option<&Value> {
    self.graph.value(resource)
  }

  pub fn state(&self, resource: &str) -> Option<&ResourceState> {
    self.graph.state(resource)
  }

  pub fn resource_graph(&self) -> &ResourceGraph {
    &self.graph
  }

  pub fn is_consistent(&self) -> bool {
    self.graph.is_consistent()
  }

  pub fn resources(&self) -> Vec<ResourceInfo> {
    self
      .graph
      .entries()
      .map(|(name, entry)| ResourceInfo {
        name: name.to_string(),
        producer: entry.producer.clone(),
        output: entry.output.clone(),
        state: entry.state.clone(),
        version: entry.version,
        value: entry.value.clone(),
      })
      .collect()
  }

  /// One line per step: `resources = definition  [states]`.
  pub fn describe(&self) -> String {
    self.to_string()
  }

  fn definition(&self, step: &Step) -> String {
    let args: Vec<String> = step
      .inputs
      .iter()
      .map(|(name, source)| format!("{}={}", name, self.render_source(source)))
      .collect();
    match &step.kind {
      StepKind::Operation { op } | StepKind::Workflow { workflow: op } => {
        format!("{}({})", op, args.join(", "))
      }
      StepKind::Expression { expression } => expression.to_string(),
      StepKind::Executable { command } => format!("`{}`({})", command, args.join(", ")),
    }
  }

  fn render_source(&self, source: &Source) -> String {
    match source {
      Source::Literal { value } => value.to_string(),
      Source::StepOutput { step_id, output } => {
        let resource = self
          .workflow
          .step(step_id)
          .and_then(|s| s.resource_for(output))
          .map(str::to_string)
          .unwrap_or_else(|| format!("{}.{}", step_id, output));
        format!("{}{}", tessera_workflow::REFERENCE_MARKER, resource)
      }
      Source::WorkflowInput { name } => format!("{}.{}", self.workflow.qualified_name, name),
    }
  }

  /// Resources of the seeds and of every step downstream of them.
  fn downstream_resources<'a, I>(&self, seeds: I) -> Vec<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let affected = self.workflow.graph().downstream_closure(seeds);
    self
      .workflow
      .steps()
      .iter()
      .filter(|step| affected.contains(&step.id))
      .flat_map(|step| step.outputs.values().cloned())
      .collect()
  }

  fn input_readers(&self, name: &str) -> Vec<String> {
    let readers: Vec<&str> = self
      .workflow
      .steps()
      .iter()
      .filter(|step| step.reads_workflow_input(name))
      .map(|step| step.id.as_str())
      .collect();
    self.downstream_resources(readers)
  }

  fn invalidate(&mut self, resources: Vec<String>) {
    let invalidated = self.graph.invalidate(resources.iter().map(String::as_str));
    if invalidated.is_empty() {
      return;
    }
    info!(workspace = %self.config.name, resources = ?invalidated, "resources_invalidated");
    self
      .notifier
      .notify(EvaluationEvent::ResourcesInvalidated {
        resources: invalidated,
      });
  }
}

impl fmt::Debug for Workspace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Workspace")
      .field("config", &self.config)
      .field("registry", &self.registry)
      .field("workflow", &self.workflow)
      .field("graph", &self.graph)
      .field("bindings", &self.bindings)
      .finish_non_exhaustive()
  }
}

impl fmt::Display for Workspace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "workspace {}", self.workflow.qualified_name)?;

    for (name, input) in self.workflow.inputs() {
      match self.bindings.get(name).or(input.default.as_ref()) {
        Some(value) => writeln!(f, "  input {}: {} = {}", name, input.data_type, value)?,
        None => writeln!(f, "  input {}: {}", name, input.data_type)?,
      }
    }

    for step in self.workflow.steps() {
      let resources: Vec<&str> = step.outputs.values().map(String::as_str).collect();
      let states: Vec<String> = resources
        .iter()
        .map(|r| match self.graph.get(r) {
          Some(entry) => match (&entry.state, &entry.value) {
            (ResourceState::Present, Some(value)) => format!("present {}", value),
            (ResourceState::Failed { message }, _) => format!("failed: {}", message),
            (state, _) => state.name().to_string(),
          },
          None => "absent".to_string(),
        })
        .collect();
      writeln!(
        f,
        "  {} = {}  [{}]",
        resources.join(", "),
        self.definition(step),
        states.join("; ")
      )?;
    }
    Ok(())
  }
}

/// Signature checks for a single step before it enters the workflow.
fn check_workflow_step(
  registry: &OperationRegistry,
  workflow: &Workflow,
  step: &Step,
) -> Result<(), RuntimeError> {
  if step.calls_workflow(&workflow.qualified_name) {
    return Err(
      WorkflowError::CyclicGraph {
        path: vec![workflow.qualified_name.clone(), step.id.clone()],
      }
      .into(),
    );
  }
  check_step(registry, step)?;
  Ok(())
}
