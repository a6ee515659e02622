use std::collections::HashMap;

use indexmap::IndexMap;
use tessera_config::{SourceDef, StepDef, StepType, WorkflowDocument};
use tessera_registry::{OperationKind, OperationRegistry, OperationSignature};
use tessera_workflow::{Source, Step, StepKind, Workflow, WorkflowInput};
use tracing::debug;

use crate::binding::{check_inputs, output_resources, parse_source};
use crate::error::ResolveError;

/// Turns a workflow document into a validated [`Workflow`].
pub trait Resolver {
  fn resolve(&self, document: WorkflowDocument) -> Result<Workflow, ResolveError>;
}

/// Resolves documents against the signatures of an operation registry.
pub struct StandardResolver<'r> {
  registry: &'r OperationRegistry,
}

impl<'r> StandardResolver<'r> {
  pub fn new(registry: &'r OperationRegistry) -> Self {
    Self { registry }
  }

  /// Kind and output names of a step, before any input is looked at.
  fn step_shape(&self, def: &StepDef) -> Result<(StepKind, Vec<String>), ResolveError> {
    let invalid = |message: String| ResolveError::Validation {
      step_id: def.id.clone(),
      message,
    };

    // Without an explicit type the fields present decide; an `op` is
    // classified by its registered signature.
    let step_type = match (def.step_type, &def.op, &def.expression, &def.command) {
      (Some(step_type), ..) => Some(step_type),
      (None, Some(_), _, _) => None,
      (None, None, Some(_), _) => Some(StepType::Expression),
      (None, None, None, Some(_)) => Some(StepType::Executable),
      (None, None, None, None) => return Err(invalid("missing 'op'".to_string())),
    };

    match step_type {
      None | Some(StepType::Operation) | Some(StepType::Workflow) => {
        let op = def
          .op
          .as_deref()
          .ok_or_else(|| invalid("missing 'op'".to_string()))?;
        let signature = self.registry.signature(op)?;
        let kind = match (step_type, signature.kind) {
          (None | Some(StepType::Operation), OperationKind::Operation) => StepKind::Operation {
            op: op.to_string(),
          },
          (None | Some(StepType::Workflow), OperationKind::Workflow) => StepKind::Workflow {
            workflow: op.to_string(),
          },
          (_, OperationKind::Workflow) => {
            return Err(invalid(format!("'{}' is a workflow, not an operation", op)));
          }
          (_, OperationKind::Operation) => {
            return Err(invalid(format!("'{}' is an operation, not a workflow", op)));
          }
        };
        Ok((kind, signature.outputs.keys().cloned().collect()))
      }
      Some(StepType::Expression) => {
        let expression = def
          .expression
          .clone()
          .ok_or_else(|| invalid("missing 'expression'".to_string()))?;
        Ok((
          StepKind::Expression { expression },
          vec![OperationSignature::RETURN.to_string()],
        ))
      }
      Some(StepType::Executable) => {
        let command = def
          .command
          .clone()
          .ok_or_else(|| invalid("missing 'command'".to_string()))?;
        let outputs = if def.outputs.is_empty() {
          vec![OperationSignature::RETURN.to_string()]
        } else {
          def.outputs.keys().cloned().collect()
        };
        Ok((StepKind::Executable { command }, outputs))
      }
    }
  }
}

impl Resolver for StandardResolver<'_> {
  fn resolve(&self, document: WorkflowDocument) -> Result<Workflow, ResolveError> {
    let qualified_name = document.qualified_name.clone();
    debug!(workflow = %qualified_name, steps = document.steps.len(), "resolving workflow document");

    let mut inputs = IndexMap::new();
    for (name, def) in &document.inputs {
      if let Some(default) = &def.default
        && !def.data_type.accepts(default)
      {
        return Err(ResolveError::Validation {
          step_id: qualified_name.clone(),
          message: format!(
            "default of input '{}' is not a {}",
            name, def.data_type
          ),
        });
      }
      inputs.insert(
        name.clone(),
        WorkflowInput {
          data_type: def.data_type,
          description: def.description.clone(),
          default: def.default.clone(),
          value_set_source: def.value_set_source.clone(),
        },
      );
    }
    let input_names: Vec<&str> = document.inputs.keys().map(String::as_str).collect();

    // First pass fixes every step's outputs so references may point forward.
    let mut shapes = Vec::with_capacity(document.steps.len());
    let mut outputs_by_step: HashMap<&str, Vec<String>> = HashMap::new();
    for def in &document.steps {
      let (kind, outputs) = self.step_shape(def)?;
      outputs_by_step.insert(def.id.as_str(), outputs.clone());
      shapes.push((kind, outputs));
    }
    let outputs_of = |step_id: &str| {
      outputs_by_step
        .get(step_id)
        .map(|outputs| outputs.iter().map(String::as_str).collect::<Vec<_>>())
    };

    let mut steps = Vec::with_capacity(document.steps.len());
    for (def, (kind, outputs)) in document.steps.iter().zip(shapes) {
      let mut bound = IndexMap::new();
      for (name, source) in &def.inputs {
        let source = match source {
          SourceDef::Value { value } => Source::literal(value.clone()),
          SourceDef::Reference(raw) | SourceDef::Source { source: raw } => {
            parse_source(&qualified_name, &input_names, &def.id, raw, outputs_of)?
          }
        };
        bound.insert(name.clone(), source);
      }

      if let Some(op) = kind_reference(&kind) {
        check_inputs(&def.id, self.registry.signature(op)?, &bound)?;
      }

      let mut step = Step::new(def.id.clone(), kind);
      step.inputs = bound;
      step.outputs = output_resources(&def.id, &outputs, &def.outputs)?;
      steps.push(step);
    }

    let mut workflow_outputs = IndexMap::new();
    for (name, def) in &document.outputs {
      let source = parse_source(&qualified_name, &input_names, &qualified_name, &def.source, outputs_of)?;
      workflow_outputs.insert(name.clone(), source);
    }

    let workflow = Workflow::from_parts(
      qualified_name,
      document.header,
      inputs,
      workflow_outputs,
      steps,
    )?;
    Ok(workflow)
  }
}

fn kind_reference(kind: &StepKind) -> Option<&str> {
  match kind {
    StepKind::Operation { op } => Some(op),
    StepKind::Workflow { workflow } => Some(workflow),
    _ => None,
  }
}
