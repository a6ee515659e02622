//! The evaluation engine.
//!
//! [`Evaluator`] brings one resource up to date: it orders the steps the
//! target depends on, reuses outputs whose step fingerprint still matches,
//! inlines expression steps and invokes everything else through the
//! registry. Independent ready steps run concurrently, each on its own
//! task; their results are committed in declaration order.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tessera_registry::{InvocationContext, OperationError, OperationRegistry, Values};
use tessera_workflow::{Graph, Source, Step, StepKind, Workflow, WorkflowError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RuntimeError;
use crate::events::{EvaluationEvent, EvaluationNotifier, NoopNotifier};
use crate::fingerprint::{InputPart, step_fingerprint, value_fingerprint};
use crate::input::{collect_outputs, prepare_inputs};
use crate::resource_graph::ResourceGraph;
use crate::result::EvaluationReport;

static NOOP: NoopNotifier = NoopNotifier;

/// A step whose inputs are resolved and whose outputs need computing.
struct Job<'w> {
  step: &'w Step,
  fingerprint: String,
  inputs: Values,
  computed_against: IndexMap<String, u64>,
}

/// Evaluates resources of a workflow into a [`ResourceGraph`].
pub struct Evaluator<'a> {
  registry: Arc<OperationRegistry>,
  notifier: &'a dyn EvaluationNotifier,
  max_parallel_steps: usize,
}

impl<'a> Evaluator<'a> {
  pub fn new(registry: Arc<OperationRegistry>) -> Self {
    Self {
      registry,
      notifier: &NOOP,
      max_parallel_steps: 1,
    }
  }

  pub fn with_notifier(mut self, notifier: &'a dyn EvaluationNotifier) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_max_parallel_steps(mut self, max_parallel_steps: usize) -> Self {
    self.max_parallel_steps = max_parallel_steps.max(1);
    self
  }

  /// Bring `target` up to date and return its value.
  ///
  /// `bindings` holds the current values of workflow inputs; inputs without
  /// a binding fall back to their declared default.
  #[instrument(
    name = "evaluate",
    skip(self, workflow, graph, bindings, target, cancel),
    fields(workflow = %workflow.qualified_name, resource = %target)
  )]
  pub async fn evaluate(
    &self,
    workflow: &Workflow,
    graph: &mut ResourceGraph,
    bindings: &Values,
    target: &str,
    cancel: &CancellationToken,
  ) -> Result<EvaluationReport, RuntimeError> {
    let evaluation_id = uuid::Uuid::new_v4().to_string();

    info!(evaluation_id = %evaluation_id, resource = %target, "evaluation_started");
    self.notifier.notify(EvaluationEvent::EvaluationStarted {
      evaluation_id: evaluation_id.clone(),
      target: target.to_string(),
    });

    let mut report = EvaluationReport {
      evaluation_id: evaluation_id.clone(),
      target: target.to_string(),
      value: Value::Null,
      invoked: Vec::new(),
      inlined: Vec::new(),
      reused: Vec::new(),
    };

    match self
      .run(workflow, graph, bindings, target, cancel, &mut report)
      .await
    {
      Ok(value) => {
        report.value = value;
        info!(
          evaluation_id = %evaluation_id,
          resource = %target,
          invoked = report.invoked.len(),
          inlined = report.inlined.len(),
          reused = report.reused.len(),
          "evaluation_completed"
        );
        self.notifier.notify(EvaluationEvent::EvaluationCompleted {
          evaluation_id,
          target: target.to_string(),
        });
        Ok(report)
      }
      Err(e) => {
        error!(evaluation_id = %evaluation_id, error = %e, "evaluation_failed");
        self.notifier.notify(EvaluationEvent::EvaluationFailed {
          evaluation_id,
          error: e.to_string(),
        });
        Err(e)
      }
    }
  }

  async fn run(
    &self,
    workflow: &Workflow,
    graph: &mut ResourceGraph,
    bindings: &Values,
    target: &str,
    cancel: &CancellationToken,
    report: &mut EvaluationReport,
  ) -> Result<Value, RuntimeError> {
    graph.sync(workflow);

    let (target_step, _) =
      workflow
        .resource_producer(target)
        .ok_or_else(|| RuntimeError::UnknownResource {
          name: target.to_string(),
        })?;

    let dag = workflow.graph();
    let closure = dag.upstream_closure(&target_step.id);

    // Removed steps leave references dangling; they surface here.
    if let Some((step_id, reference)) = workflow
      .dangling_references()
      .into_iter()
      .find(|(step_id, _)| closure.contains(step_id))
    {
      return Err(WorkflowError::UnresolvedReference { step_id, reference }.into());
    }

    if let Some((resource, message)) = graph.failed_of(&closure).first() {
      return Err(RuntimeError::PreviouslyFailed {
        resource: resource.to_string(),
        message: message.to_string(),
      });
    }

    let order = dag.topological_order(&closure)?;
    let mut pending: Vec<&Step> = order.iter().filter_map(|id| workflow.step(id)).collect();

    while !pending.is_empty() {
      if cancel.is_cancelled() {
        warn!(evaluation_id = %report.evaluation_id, "evaluation cancelled");
        return Err(RuntimeError::Cancelled);
      }

      let ready: Vec<&Step> = pending
        .iter()
        .copied()
        .filter(|step| {
          step
            .dependencies()
            .iter()
            .all(|dep| !pending.iter().any(|p| p.id == *dep))
        })
        .collect();

      if ready.is_empty() {
        return Err(
          WorkflowError::CyclicGraph {
            path: pending.iter().map(|s| s.id.clone()).collect(),
          }
          .into(),
        );
      }

      let mut batch = Vec::new();
      for step in ready {
        let job = resolve_step(workflow, graph, bindings, step)?;

        if is_up_to_date(graph, step, &job.fingerprint) {
          debug!(evaluation_id = %report.evaluation_id, step_id = %step.id, "step_reused");
          self.notifier.notify(EvaluationEvent::StepReused {
            evaluation_id: report.evaluation_id.clone(),
            step_id: step.id.clone(),
          });
          report.reused.push(step.id.clone());
          pending.retain(|p| p.id != step.id);
          continue;
        }

        if let StepKind::Expression { expression } = &step.kind {
          self.notify_started(&report.evaluation_id, step);
          let outputs = Values::from([(
            tessera_registry::OperationSignature::RETURN.to_string(),
            expression.clone(),
          )]);
          self.commit(&dag, workflow, graph, job, outputs, &report.evaluation_id);
          report.inlined.push(step.id.clone());
          pending.retain(|p| p.id != step.id);
          continue;
        }

        batch.push(job);
        if batch.len() == self.max_parallel_steps {
          break;
        }
      }

      if batch.is_empty() {
        continue;
      }

      pending.retain(|p| !batch.iter().any(|job| job.step.id == p.id));
      self
        .run_batch(&dag, workflow, graph, batch, report, cancel)
        .await?;
    }

    graph
      .value(target)
      .cloned()
      .ok_or_else(|| RuntimeError::UnknownResource {
        name: target.to_string(),
      })
  }

  /// Invoke a batch of independent steps and commit their results.
  async fn run_batch(
    &self,
    dag: &Graph,
    workflow: &Workflow,
    graph: &mut ResourceGraph,
    batch: Vec<Job<'_>>,
    report: &mut EvaluationReport,
    cancel: &CancellationToken,
  ) -> Result<(), RuntimeError> {
    let mut calls = Vec::with_capacity(batch.len());
    let mut jobs = Vec::with_capacity(batch.len());
    for mut job in batch {
      for resource in job.step.outputs.values() {
        graph.mark_computing(resource);
      }
      self.notify_started(&report.evaluation_id, job.step);
      calls.push((job.step, std::mem::take(&mut job.inputs)));
      jobs.push(job);
    }

    let handles: Vec<_> = calls
      .into_iter()
      .map(|(step, inputs)| self.spawn_step(step, inputs, cancel))
      .collect();
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let joined = tokio::select! {
      biased;
      joined = futures::future::join_all(handles) => joined,
      _ = cancel.cancelled() => {
        for abort in &aborts {
          abort.abort();
        }
        for job in &jobs {
          for resource in job.step.outputs.values() {
            graph.abandon(resource);
          }
        }
        warn!(evaluation_id = %report.evaluation_id, "evaluation cancelled during step execution");
        return Err(RuntimeError::Cancelled);
      }
    };

    let mut outcomes: Vec<_> = jobs
      .into_iter()
      .zip(joined)
      .map(|(job, joined)| {
        let result = joined.unwrap_or_else(|e| {
          Err(RuntimeError::OperationExecution {
            step_id: job.step.id.clone(),
            operation: job.step.op_reference().unwrap_or(job.step.kind.type_name()).to_string(),
            source: OperationError::with_source("step task did not complete", e),
          })
        });
        (job, result)
      })
      .collect();
    outcomes.sort_by_key(|(job, _)| dag.position(&job.step.id));

    let mut first_error = None;
    for (job, result) in outcomes {
      let step = job.step;
      match result {
        Ok(outputs) => {
          self.commit(dag, workflow, graph, job, outputs, &report.evaluation_id);
          report.invoked.push(step.id.clone());
        }
        Err(e) => {
          let message = e.to_string();
          for resource in step.outputs.values() {
            graph.fail(resource, &message);
          }
          error!(
            evaluation_id = %report.evaluation_id,
            step_id = %step.id,
            error = %message,
            "step_failed"
          );
          self.notifier.notify(EvaluationEvent::StepFailed {
            evaluation_id: report.evaluation_id.clone(),
            step_id: step.id.clone(),
            error: message,
          });
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// Run `step` on its own task with already resolved inputs.
  fn spawn_step(
    &self,
    step: &Step,
    inputs: Values,
    cancel: &CancellationToken,
  ) -> tokio::task::JoinHandle<Result<Values, RuntimeError>> {
    let registry = self.registry.clone();
    let step = step.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move { invoke_step(&registry, &step, inputs, &cancel).await })
  }

  /// Store a step's outputs. Any output whose value changed invalidates
  /// everything downstream of the step.
  fn commit(
    &self,
    dag: &Graph,
    workflow: &Workflow,
    graph: &mut ResourceGraph,
    job: Job<'_>,
    mut outputs: Values,
    evaluation_id: &str,
  ) {
    let step = job.step;
    let mut changed = false;
    for (output, resource) in &step.outputs {
      let value = outputs.shift_remove(output).unwrap_or(Value::Null);
      let fingerprint = value_fingerprint(&value);
      changed |= graph.commit(
        resource,
        value,
        fingerprint,
        &job.fingerprint,
        job.computed_against.clone(),
      );
    }

    if changed {
      let mut dependents = dag.downstream_closure([step.id.as_str()]);
      dependents.remove(&step.id);
      let resources: Vec<&str> = workflow
        .steps()
        .iter()
        .filter(|s| dependents.contains(&s.id))
        .flat_map(|s| s.outputs.values().map(String::as_str))
        .collect();
      let invalidated = graph.invalidate(resources);
      if !invalidated.is_empty() {
        debug!(step_id = %step.id, resources = ?invalidated, "resources_invalidated");
        self
          .notifier
          .notify(EvaluationEvent::ResourcesInvalidated {
            resources: invalidated,
          });
      }
    }

    let resources: Vec<String> = step.outputs.values().cloned().collect();
    info!(
      evaluation_id = %evaluation_id,
      step_id = %step.id,
      resources = ?resources,
      "step_completed"
    );
    self.notifier.notify(EvaluationEvent::StepCompleted {
      evaluation_id: evaluation_id.to_string(),
      step_id: step.id.clone(),
      resources,
    });
  }

  fn notify_started(&self, evaluation_id: &str, step: &Step) {
    debug!(
      evaluation_id = %evaluation_id,
      step_id = %step.id,
      operation = step.op_reference().unwrap_or(step.kind.type_name()),
      "step_started"
    );
    self.notifier.notify(EvaluationEvent::StepStarted {
      evaluation_id: evaluation_id.to_string(),
      step_id: step.id.clone(),
      operation: step.op_reference().map(str::to_string),
    });
  }
}

/// Call the operation behind `step` with already resolved inputs.
async fn invoke_step(
  registry: &Arc<OperationRegistry>,
  step: &Step,
  inputs: Values,
  cancel: &CancellationToken,
) -> Result<Values, RuntimeError> {
  let op = match &step.kind {
    StepKind::Operation { op } | StepKind::Workflow { workflow: op } => op,
    other => {
      return Err(RuntimeError::UnsupportedStepType {
        step_id: step.id.clone(),
        step_type: other.type_name().to_string(),
      });
    }
  };

  let registered = registry.lookup(op)?;
  let signature = registered.signature();
  let inputs = prepare_inputs(&step.id, signature, inputs)?;

  let ctx = InvocationContext {
    registry,
    step_id: &step.id,
    cancel,
  };
  let outputs = registered
    .operation()
    .invoke(&ctx, inputs)
    .await
    .map_err(|source| RuntimeError::OperationExecution {
      step_id: step.id.clone(),
      operation: op.clone(),
      source,
    })?;

  collect_outputs(&step.id, signature, outputs)
}

/// Resolve the inputs of `step` against the current graph and fingerprint
/// the result.
fn resolve_step<'w>(
  workflow: &Workflow,
  graph: &ResourceGraph,
  bindings: &Values,
  step: &'w Step,
) -> Result<Job<'w>, RuntimeError> {
  let mut inputs = Values::with_capacity(step.inputs.len());
  let mut parts = Vec::with_capacity(step.inputs.len());
  let mut computed_against = IndexMap::new();

  for (name, source) in &step.inputs {
    match source {
      Source::Literal { value } => {
        parts.push((name.as_str(), InputPart::Literal(value)));
        inputs.insert(name.clone(), value.clone());
      }
      Source::StepOutput { step_id, output } => {
        let resource = workflow
          .step(step_id)
          .and_then(|s| s.resource_for(output))
          .ok_or_else(|| WorkflowError::UnresolvedReference {
            step_id: step.id.clone(),
            reference: format!("{}.{}", step_id, output),
          })?;
        let entry = graph
          .get(resource)
          .filter(|e| e.is_present())
          .ok_or_else(|| RuntimeError::UnknownResource {
            name: resource.to_string(),
          })?;
        parts.push((
          name.as_str(),
          InputPart::Upstream(entry.value_fingerprint.as_deref().unwrap_or_default()),
        ));
        computed_against.insert(resource.to_string(), entry.version);
        inputs.insert(name.clone(), entry.value.clone().unwrap_or(Value::Null));
      }
      Source::WorkflowInput { name: input } => {
        let value = bindings
          .get(input)
          .or_else(|| workflow.inputs().get(input).and_then(|i| i.default.as_ref()))
          .ok_or_else(|| RuntimeError::UnboundInput {
            name: input.clone(),
          })?;
        parts.push((name.as_str(), InputPart::WorkflowInput(value)));
        inputs.insert(name.clone(), value.clone());
      }
    }
  }

  Ok(Job {
    step,
    fingerprint: step_fingerprint(step, parts),
    inputs,
    computed_against,
  })
}

fn is_up_to_date(graph: &ResourceGraph, step: &Step, fingerprint: &str) -> bool {
  step.outputs.values().all(|resource| {
    graph
      .get(resource)
      .is_some_and(|e| e.is_present() && e.step_fingerprint.as_deref() == Some(fingerprint))
  })
}
