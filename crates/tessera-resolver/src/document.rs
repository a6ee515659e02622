//! Serializing a workflow back into its document form.

use indexmap::IndexMap;
use tessera_config::{InputDef, OutputDef, SourceDef, StepDef, StepType, WorkflowDocument};
use tessera_workflow::{Source, Step, StepKind, Workflow, default_resource_name};

/// Render `workflow` as a document that resolves back to an equivalent
/// workflow: same steps, bindings, resource names and outputs.
pub fn to_document(workflow: &Workflow) -> WorkflowDocument {
  let mut document = WorkflowDocument::new(workflow.qualified_name.clone());
  document.header = workflow.header.clone();

  for (name, input) in workflow.inputs() {
    document.inputs.insert(
      name.clone(),
      InputDef {
        data_type: input.data_type,
        description: input.description.clone(),
        default: input.default.clone(),
        value_set_source: input.value_set_source.clone(),
      },
    );
  }

  for step in workflow.steps() {
    document.steps.push(step_def(workflow, step));
  }

  for (name, source) in workflow.outputs() {
    if let SourceDef::Reference(source) = source_def(workflow, source) {
      document.outputs.insert(
        name.clone(),
        OutputDef {
          source,
          description: None,
        },
      );
    }
  }

  document
}

fn step_def(workflow: &Workflow, step: &Step) -> StepDef {
  let (step_type, op, expression, command) = match &step.kind {
    StepKind::Operation { op } => (None, Some(op.clone()), None, None),
    StepKind::Workflow { workflow } => (Some(StepType::Workflow), Some(workflow.clone()), None, None),
    StepKind::Expression { expression } => {
      (Some(StepType::Expression), None, Some(expression.clone()), None)
    }
    StepKind::Executable { command } => {
      (Some(StepType::Executable), None, None, Some(command.clone()))
    }
  };

  let inputs = step
    .inputs
    .iter()
    .map(|(name, source)| (name.clone(), source_def(workflow, source)))
    .collect();

  StepDef {
    id: step.id.clone(),
    step_type,
    op,
    expression,
    command,
    inputs,
    outputs: renamed_outputs(step),
  }
}

/// Outputs whose resource differs from the default name. Executable steps
/// have no signature to recover their outputs from, so they list all of
/// them unless they only have the conventional one.
fn renamed_outputs(step: &Step) -> IndexMap<String, String> {
  let count = step.outputs.len();
  let keep_all = matches!(step.kind, StepKind::Executable { .. })
    && !(count == 1 && step.outputs.contains_key("return"));

  step
    .outputs
    .iter()
    .filter(|(output, resource)| {
      keep_all || **resource != default_resource_name(&step.id, output, count)
    })
    .map(|(output, resource)| (output.clone(), resource.clone()))
    .collect()
}

fn source_def(workflow: &Workflow, source: &Source) -> SourceDef {
  match source {
    Source::Literal { value } => SourceDef::value(value.clone()),
    Source::WorkflowInput { name } => {
      SourceDef::reference(format!("{}.{}", workflow.qualified_name, name))
    }
    Source::StepOutput { step_id, output } => {
      let is_default = workflow
        .step(step_id)
        .and_then(Step::default_output)
        .is_some_and(|default| default == output);
      if is_default {
        SourceDef::reference(step_id.clone())
      } else {
        SourceDef::reference(format!("{}.{}", step_id, output))
      }
    }
  }
}
