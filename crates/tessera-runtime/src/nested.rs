//! Workflows invoked as operations.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_config::DataType;
use tessera_registry::{
  InputSpec, InvocationContext, Operation, OperationError, OperationKind, OperationRegistry,
  OperationSignature, Values,
};
use tessera_resolver::check_workflow;
use tessera_workflow::{Source, Workflow, WorkflowError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::engine::Evaluator;
use crate::error::RuntimeError;
use crate::input::prepare_inputs;
use crate::resource_graph::ResourceGraph;

/// A workflow exposed through the [`Operation`] contract.
///
/// Every invocation evaluates the workflow's outputs in a fresh, private
/// resource graph, so nothing is cached between calls.
pub struct WorkflowOperation {
  workflow: Arc<Workflow>,
  max_parallel_steps: usize,
}

impl WorkflowOperation {
  pub fn new(workflow: impl Into<Arc<Workflow>>) -> Self {
    Self {
      workflow: workflow.into(),
      max_parallel_steps: 1,
    }
  }

  pub fn with_max_parallel_steps(mut self, max_parallel_steps: usize) -> Self {
    self.max_parallel_steps = max_parallel_steps.max(1);
    self
  }

  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  /// Invoke the workflow as a whole: coerce `inputs` against its declared
  /// inputs, then evaluate every declared output.
  #[instrument(
    name = "workflow_invoke",
    skip(self, registry, inputs, cancel),
    fields(workflow = %self.workflow.qualified_name)
  )]
  pub async fn invoke_with(
    &self,
    registry: &Arc<OperationRegistry>,
    inputs: Values,
    cancel: &CancellationToken,
  ) -> Result<Values, RuntimeError> {
    let signature = workflow_signature(registry, &self.workflow);
    let inputs = prepare_inputs(&self.workflow.qualified_name, &signature, inputs)?;
    self.evaluate_outputs(registry, &inputs, cancel).await
  }

  async fn evaluate_outputs(
    &self,
    registry: &Arc<OperationRegistry>,
    inputs: &Values,
    cancel: &CancellationToken,
  ) -> Result<Values, RuntimeError> {
    let evaluator =
      Evaluator::new(registry.clone()).with_max_parallel_steps(self.max_parallel_steps);
    let mut graph = ResourceGraph::new();
    let mut outputs = Values::with_capacity(self.workflow.outputs().len());

    for (name, source) in self.workflow.outputs() {
      let value = match source {
        Source::Literal { value } => value.clone(),
        Source::WorkflowInput { name: input } => inputs
          .get(input)
          .cloned()
          .ok_or_else(|| RuntimeError::UnboundInput {
            name: input.clone(),
          })?,
        Source::StepOutput { step_id, output } => {
          let resource = self
            .workflow
            .step(step_id)
            .and_then(|step| step.resource_for(output))
            .ok_or_else(|| WorkflowError::UnresolvedReference {
              step_id: self.workflow.qualified_name.clone(),
              reference: format!("{}.{}", step_id, output),
            })?;
          evaluator
            .evaluate(&self.workflow, &mut graph, inputs, resource, cancel)
            .await?
            .value
        }
      };
      outputs.insert(name.clone(), value);
    }

    Ok(outputs)
  }
}

#[async_trait]
impl Operation for WorkflowOperation {
  async fn invoke(
    &self,
    ctx: &InvocationContext<'_>,
    inputs: Values,
  ) -> Result<Values, OperationError> {
    self
      .evaluate_outputs(ctx.registry, &inputs, ctx.cancel)
      .await
      .map_err(|e| {
        OperationError::with_source(
          format!("workflow '{}' failed", self.workflow.qualified_name),
          e,
        )
      })
  }
}

/// The operation signature a workflow presents to its callers.
///
/// Inputs without a default are required. Output types come from the
/// producing operation's signature where it is known.
pub fn workflow_signature(registry: &OperationRegistry, workflow: &Workflow) -> OperationSignature {
  let mut signature = OperationSignature::new(workflow.qualified_name.clone())
    .with_kind(OperationKind::Workflow);
  if let Some(description) = workflow.header.get("description").and_then(|d| d.as_str()) {
    signature = signature.with_description(description);
  }

  for (name, input) in workflow.inputs() {
    let mut spec = match &input.default {
      Some(default) => InputSpec::optional(input.data_type, Some(default.clone())),
      None => InputSpec::required(input.data_type),
    };
    if let Some(description) = &input.description {
      spec = spec.with_description(description.clone());
    }
    signature = signature.input(name.clone(), spec);
  }

  for (name, source) in workflow.outputs() {
    let data_type = match source {
      Source::WorkflowInput { name } => workflow
        .inputs()
        .get(name)
        .map(|i| i.data_type)
        .unwrap_or_default(),
      Source::StepOutput { step_id, output } => workflow
        .step(step_id)
        .and_then(|step| step.op_reference())
        .and_then(|op| registry.signature(op).ok())
        .and_then(|sig| sig.outputs.get(output))
        .map(|spec| spec.data_type)
        .unwrap_or(DataType::Any),
      Source::Literal { .. } => DataType::Any,
    };
    signature = signature.output(name.clone(), data_type);
  }

  signature
}

/// Register `workflow` so other workflows can use it as a step.
///
/// The workflow must be valid on its own, every step must fit the signature
/// of what it calls, and it may not call itself.
pub fn register_workflow(
  registry: &mut OperationRegistry,
  workflow: Workflow,
) -> Result<(), RuntimeError> {
  let name = workflow.qualified_name.clone();

  if let Some(step) = workflow
    .steps()
    .iter()
    .find(|step| step.calls_workflow(&name))
  {
    return Err(
      WorkflowError::CyclicGraph {
        path: vec![name.clone(), step.id.clone(), name],
      }
      .into(),
    );
  }

  workflow.validate()?;
  check_workflow(registry, &workflow)?;

  let signature = workflow_signature(registry, &workflow);
  registry.register(signature, Arc::new(WorkflowOperation::new(workflow)))?;
  info!(workflow = %name, "workflow_registered");
  Ok(())
}
