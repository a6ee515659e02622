//! Binding step inputs and outputs against operation signatures.

use indexmap::IndexMap;
use tessera_registry::{OperationKind, OperationRegistry, OperationSignature};
use tessera_workflow::{Source, Step, StepKind, Workflow, default_resource_name};

use crate::error::ResolveError;

/// Build an operation or workflow step for `op`, checking the bound inputs
/// against its signature and naming outputs with the default scheme.
pub fn operation_step(
  registry: &OperationRegistry,
  step_id: &str,
  op: &str,
  inputs: IndexMap<String, Source>,
) -> Result<Step, ResolveError> {
  let signature = registry.signature(op)?;
  let kind = match signature.kind {
    OperationKind::Operation => StepKind::Operation { op: op.to_string() },
    OperationKind::Workflow => StepKind::Workflow {
      workflow: op.to_string(),
    },
  };

  check_inputs(step_id, signature, &inputs)?;

  let mut step = Step::new(step_id, kind).with_default_outputs(signature.outputs.keys().cloned());
  step.inputs = inputs;
  Ok(step)
}

/// Check every operation and workflow step of `workflow` against the
/// registry.
pub fn check_workflow(registry: &OperationRegistry, workflow: &Workflow) -> Result<(), ResolveError> {
  workflow
    .steps()
    .iter()
    .try_for_each(|step| check_step(registry, step))
}

/// Check one step against the signature it calls: the callable exists, has
/// the matching kind and accepts the bound inputs. Expression and
/// executable steps have no signature and always pass.
pub fn check_step(registry: &OperationRegistry, step: &Step) -> Result<(), ResolveError> {
  let (op, expected) = match &step.kind {
    StepKind::Operation { op } => (op, OperationKind::Operation),
    StepKind::Workflow { workflow } => (workflow, OperationKind::Workflow),
    _ => return Ok(()),
  };
  let signature = registry.signature(op)?;
  if signature.kind != expected {
    return Err(ResolveError::Validation {
      step_id: step.id.clone(),
      message: format!("'{}' is not a {} step target", op, step.kind.type_name()),
    });
  }
  check_inputs(&step.id, signature, &step.inputs)
}

/// Reject unknown input names and unbound mandatory inputs.
pub(crate) fn check_inputs(
  step_id: &str,
  signature: &OperationSignature,
  inputs: &IndexMap<String, Source>,
) -> Result<(), ResolveError> {
  if let Some(unknown) = inputs.keys().find(|name| !signature.inputs.contains_key(*name)) {
    return Err(ResolveError::Validation {
      step_id: step_id.to_string(),
      message: format!(
        "operation '{}' has no input named '{}'",
        signature.name, unknown
      ),
    });
  }

  if let Some(missing) = signature
    .mandatory_inputs()
    .find(|name| !inputs.contains_key(*name))
  {
    return Err(ResolveError::Validation {
      step_id: step_id.to_string(),
      message: format!(
        "required input '{}' of operation '{}' is not bound",
        missing, signature.name
      ),
    });
  }

  Ok(())
}

/// Parse a document source string.
///
/// `outputs_of` gives the declared outputs of a step id, if the step exists.
/// Resolution order:
/// 1. `<qualified_name>.<input>` names a declared workflow input
/// 2. `<step_id>.<output>` names one output of a step
/// 3. `<step_id>` names the sole output of a step
///
/// A step may share its id with the qualified name; its outputs are only
/// shadowed by workflow inputs of the same name.
pub fn parse_source<'a, F>(
  qualified_name: &str,
  declared_inputs: &[&str],
  owner: &str,
  raw: &str,
  outputs_of: F,
) -> Result<Source, ResolveError>
where
  F: Fn(&str) -> Option<Vec<&'a str>>,
{
  let unresolved = || ResolveError::UnresolvedReference {
    step_id: owner.to_string(),
    reference: raw.to_string(),
  };

  if let Some(input) = raw
    .strip_prefix(qualified_name)
    .and_then(|rest| rest.strip_prefix('.'))
    .filter(|input| declared_inputs.contains(input))
  {
    return Ok(Source::workflow_input(input));
  }

  let (step_id, output) = match raw.split_once('.') {
    Some((step_id, output)) => (step_id, Some(output)),
    None => (raw, None),
  };

  let outputs = outputs_of(step_id).ok_or_else(unresolved)?;
  match output {
    Some(output) if outputs.contains(&output) => Ok(Source::step_output(step_id, output)),
    Some(_) => Err(unresolved()),
    None => match outputs.as_slice() {
      [single] => Ok(Source::step_output(step_id, *single)),
      _ => Err(ResolveError::Validation {
        step_id: owner.to_string(),
        message: format!(
          "reference '{}' is ambiguous: step has outputs {:?}",
          raw, outputs
        ),
      }),
    },
  }
}

/// Resource names for `outputs`, honouring explicit renames.
pub(crate) fn output_resources(
  step_id: &str,
  outputs: &[String],
  renames: &IndexMap<String, String>,
) -> Result<IndexMap<String, String>, ResolveError> {
  if let Some(unknown) = renames.keys().find(|name| !outputs.contains(*name)) {
    return Err(ResolveError::Validation {
      step_id: step_id.to_string(),
      message: format!("renamed output '{}' is not declared", unknown),
    });
  }

  Ok(
    outputs
      .iter()
      .map(|output| {
        let resource = renames
          .get(output)
          .cloned()
          .unwrap_or_else(|| default_resource_name(step_id, output, outputs.len()));
        (output.clone(), resource)
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn outputs(step_id: &str) -> Option<Vec<&'static str>> {
    match step_id {
      "a" => Some(vec!["return"]),
      "s" => Some(vec!["head", "tail"]),
      _ => None,
    }
  }

  fn parse(raw: &str) -> Result<Source, ResolveError> {
    parse_source("demo.flow", &["n"], "x", raw, outputs)
  }

  #[test]
  fn test_parse_workflow_input() {
    assert_eq!(parse("demo.flow.n").unwrap(), Source::workflow_input("n"));
    assert!(matches!(
      parse("demo.flow.m"),
      Err(ResolveError::UnresolvedReference { .. })
    ));
  }

  #[test]
  fn test_parse_step_outputs() {
    assert_eq!(parse("a").unwrap(), Source::step_output("a", "return"));
    assert_eq!(parse("a.return").unwrap(), Source::step_output("a", "return"));
    assert_eq!(parse("s.tail").unwrap(), Source::step_output("s", "tail"));
  }

  #[test]
  fn test_parse_errors() {
    assert!(matches!(
      parse("s"),
      Err(ResolveError::Validation { .. })
    ));
    assert!(matches!(
      parse("s.middle"),
      Err(ResolveError::UnresolvedReference { .. })
    ));
    assert!(matches!(
      parse("ghost"),
      Err(ResolveError::UnresolvedReference { .. })
    ));
  }

  #[test]
  fn test_step_named_like_the_workflow() {
    let parse = |raw| parse_source("s", &["n"], "x", raw, outputs);

    assert_eq!(parse("s.tail").unwrap(), Source::step_output("s", "tail"));
    assert_eq!(parse("s.n").unwrap(), Source::workflow_input("n"));
    assert!(matches!(
      parse("s.middle"),
      Err(ResolveError::UnresolvedReference { .. })
    ));
  }

  #[test]
  fn test_output_resources_with_rename() {
    let outputs = vec!["head".to_string(), "tail".to_string()];
    let mut renames = IndexMap::new();
    renames.insert("tail".to_string(), "rest".to_string());

    let resources = output_resources("s", &outputs, &renames).unwrap();
    assert_eq!(resources["head"], "s.head");
    assert_eq!(resources["tail"], "rest");

    renames.insert("middle".to_string(), "m".to_string());
    assert!(output_resources("s", &outputs, &renames).is_err());
  }
}
