use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_config::DataType;
use tracing::warn;

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::source::{REFERENCE_MARKER, Source};
use crate::step::Step;

/// A declared workflow parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
  pub data_type: DataType,
  pub description: Option<String>,
  pub default: Option<serde_json::Value>,
  pub value_set_source: Option<String>,
}

/// A validated, acyclic workflow.
///
/// Mutations check the affected step before committing, so a failed
/// mutation always leaves the workflow as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub qualified_name: String,
  pub header: IndexMap<String, serde_json::Value>,
  inputs: IndexMap<String, WorkflowInput>,
  outputs: IndexMap<String, Source>,
  steps: Vec<Step>,
}

impl Workflow {
  pub fn new(qualified_name: impl Into<String>) -> Self {
    Self {
      qualified_name: qualified_name.into(),
      header: IndexMap::new(),
      inputs: IndexMap::new(),
      outputs: IndexMap::new(),
      steps: Vec::new(),
    }
  }

  /// Assemble a workflow from already-built parts and validate it as a whole.
  ///
  /// Unlike [`add_step`](Self::add_step), steps may reference steps declared
  /// after them.
  pub fn from_parts(
    qualified_name: impl Into<String>,
    header: IndexMap<String, serde_json::Value>,
    inputs: IndexMap<String, WorkflowInput>,
    outputs: IndexMap<String, Source>,
    steps: Vec<Step>,
  ) -> Result<Self, WorkflowError> {
    let workflow = Self {
      qualified_name: qualified_name.into(),
      header,
      inputs,
      outputs,
      steps,
    };
    workflow.validate()?;
    Ok(workflow)
  }

  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  pub fn step(&self, step_id: &str) -> Option<&Step> {
    self.steps.iter().find(|s| s.id == step_id)
  }

  pub fn inputs(&self) -> &IndexMap<String, WorkflowInput> {
    &self.inputs
  }

  pub fn outputs(&self) -> &IndexMap<String, Source> {
    &self.outputs
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.steps)
  }

  /// Declare (or redeclare) a workflow input.
  pub fn add_input(&mut self, name: impl Into<String>, input: WorkflowInput) {
    self.inputs.insert(name.into(), input);
  }

  /// Declare a workflow output. Literals are rejected; the source must name
  /// an existing step output or workflow input.
  pub fn set_output(&mut self, name: impl Into<String>, source: Source) -> Result<(), WorkflowError> {
    let name = name.into();
    self.check_output(&name, &source)?;
    self.outputs.insert(name, source);
    Ok(())
  }

  /// Append a new step.
  pub fn add_step(&mut self, step: Step) -> Result<(), WorkflowError> {
    if self.step(&step.id).is_some() {
      return Err(WorkflowError::DuplicateStepId { step_id: step.id });
    }
    self.check_step(&step)?;

    let mut candidate = self.steps.clone();
    candidate.push(step);
    ensure_acyclic(&candidate)?;

    self.steps = candidate;
    Ok(())
  }

  /// Replace an existing step in place, returning the previous definition.
  pub fn replace_step(&mut self, step: Step) -> Result<Step, WorkflowError> {
    let position = self
      .steps
      .iter()
      .position(|s| s.id == step.id)
      .ok_or_else(|| WorkflowError::StepNotFound {
        step_id: step.id.clone(),
      })?;
    self.check_step(&step)?;

    let mut candidate = self.steps.clone();
    let previous = std::mem::replace(&mut candidate[position], step);
    ensure_acyclic(&candidate)?;

    self.steps = candidate;
    Ok(previous)
  }

  /// Add the step, or replace the step with the same id.
  pub fn set_step(&mut self, step: Step) -> Result<Option<Step>, WorkflowError> {
    if self.step(&step.id).is_some() {
      self.replace_step(step).map(Some)
    } else {
      self.add_step(step).map(|_| None)
    }
  }

  /// Remove a step.
  ///
  /// Steps that read from it keep their references, which now dangle; the
  /// next evaluation of those steps reports an unresolved reference. Workflow
  /// outputs that pointed at the step are dropped.
  pub fn remove_step(&mut self, step_id: &str) -> Result<Step, WorkflowError> {
    let position = self
      .steps
      .iter()
      .position(|s| s.id == step_id)
      .ok_or_else(|| WorkflowError::StepNotFound {
        step_id: step_id.to_string(),
      })?;

    let removed = self.steps.remove(position);
    let dropped: Vec<String> = self
      .outputs
      .iter()
      .filter(|(_, source)| source.referenced_step() == Some(step_id))
      .map(|(name, _)| name.clone())
      .collect();
    if !dropped.is_empty() {
      warn!(
        workflow = %self.qualified_name,
        step_id,
        outputs = ?dropped,
        "workflow_outputs_dropped"
      );
      self.outputs.retain(|name, _| !dropped.contains(name));
    }
    Ok(removed)
  }

  /// Steps holding a reference to `step_id`, in declaration order.
  pub fn dependents_of(&self, step_id: &str) -> Vec<&str> {
    self
      .steps
      .iter()
      .filter(|s| s.dependencies().contains(&step_id))
      .map(|s| s.id.as_str())
      .collect()
  }

  /// The step publishing `resource`, and the output it publishes it from.
  pub fn resource_producer(&self, resource: &str) -> Option<(&Step, &str)> {
    self.steps.iter().find_map(|step| {
      step
        .outputs
        .iter()
        .find(|(_, published)| published.as_str() == resource)
        .map(|(output, _)| (step, output.as_str()))
    })
  }

  /// Every published resource name with its producing step id, in
  /// declaration order.
  pub fn resources(&self) -> impl Iterator<Item = (&str, &str)> {
    self.steps.iter().flat_map(|step| {
      step
        .outputs
        .values()
        .map(move |resource| (resource.as_str(), step.id.as_str()))
    })
  }

  /// Turn a command-line style argument into a source.
  ///
  /// `@name` refers to the workspace resource `name`; anything else is a
  /// literal string, coerced later to the declared input type.
  pub fn parse_argument(&self, raw: &str) -> Result<Source, WorkflowError> {
    match raw.strip_prefix(REFERENCE_MARKER) {
      Some(resource) => {
        let (step, output) =
          self
            .resource_producer(resource)
            .ok_or_else(|| WorkflowError::UnknownResource {
              name: resource.to_string(),
            })?;
        Ok(Source::step_output(step.id.clone(), output))
      }
      None => Ok(Source::literal(raw)),
    }
  }

  /// References from step inputs to steps or outputs that do not exist.
  pub fn dangling_references(&self) -> Vec<(String, String)> {
    let mut dangling = Vec::new();
    for step in &self.steps {
      for source in step.inputs.values() {
        if let Err(WorkflowError::UnresolvedReference { reference, .. }) =
          self.check_source(&step.id, source)
        {
          dangling.push((step.id.clone(), reference));
        }
      }
    }
    dangling
  }

  /// Full structural validation: unique ids and resources, resolvable
  /// references, non-literal outputs and no cycles.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut seen: Vec<&str> = Vec::with_capacity(self.steps.len());
    for step in &self.steps {
      if seen.contains(&step.id.as_str()) {
        return Err(WorkflowError::DuplicateStepId {
          step_id: step.id.clone(),
        });
      }
      seen.push(&step.id);
      self.check_step(step)?;
    }

    for (name, source) in &self.outputs {
      self.check_output(name, source)?;
    }

    ensure_acyclic(&self.steps)
  }

  fn check_step(&self, step: &Step) -> Result<(), WorkflowError> {
    check_step_id(&step.id)?;

    if step.outputs.is_empty() {
      return Err(WorkflowError::Validation {
        message: format!("step '{}' declares no outputs", step.id),
      });
    }

    for resource in step.outputs.values() {
      if let Some((owner, _)) = self.resource_producer(resource)
        && owner.id != step.id
      {
        return Err(WorkflowError::DuplicateResource {
          resource: resource.clone(),
          step_id: owner.id.clone(),
        });
      }
    }

    for source in step.inputs.values() {
      if source.referenced_step() == Some(step.id.as_str()) {
        return Err(WorkflowError::CyclicGraph {
          path: vec![step.id.clone(), step.id.clone()],
        });
      }
      self.check_source(&step.id, source)?;
    }

    Ok(())
  }

  fn check_source(&self, step_id: &str, source: &Source) -> Result<(), WorkflowError> {
    match source {
      Source::Literal { .. } => Ok(()),
      Source::StepOutput {
        step_id: upstream,
        output,
      } => match self.step(upstream) {
        Some(s) if s.outputs.contains_key(output) => Ok(()),
        Some(_) => Err(WorkflowError::UnresolvedReference {
          step_id: step_id.to_string(),
          reference: format!("{}.{}", upstream, output),
        }),
        None => Err(WorkflowError::UnresolvedReference {
          step_id: step_id.to_string(),
          reference: upstream.clone(),
        }),
      },
      Source::WorkflowInput { name } => {
        if self.inputs.contains_key(name) {
          Ok(())
        } else {
          Err(WorkflowError::UnresolvedReference {
            step_id: step_id.to_string(),
            reference: format!("{}.{}", self.qualified_name, name),
          })
        }
      }
    }
  }

  fn check_output(&self, name: &str, source: &Source) -> Result<(), WorkflowError> {
    if source.is_literal() {
      return Err(WorkflowError::Validation {
        message: format!(
          "output '{}' must come from a step output or workflow input, not a literal",
          name
        ),
      });
    }
    self
      .check_source(&self.qualified_name, source)
      .map_err(|e| WorkflowError::Validation {
        message: format!("output '{}' is unresolvable: {}", name, e),
      })
  }
}

fn check_step_id(step_id: &str) -> Result<(), WorkflowError> {
  let message = if step_id.is_empty() {
    Some("must not be empty")
  } else if step_id.contains('.') {
    Some("must not contain '.'")
  } else if step_id.starts_with(REFERENCE_MARKER) {
    Some("must not start with the reference marker")
  } else if step_id.chars().any(char::is_whitespace) {
    Some("must not contain whitespace")
  } else {
    None
  };

  match message {
    Some(message) => Err(WorkflowError::InvalidStepId {
      step_id: step_id.to_string(),
      message: message.to_string(),
    }),
    None => Ok(()),
  }
}

fn ensure_acyclic(steps: &[Step]) -> Result<(), WorkflowError> {
  match Graph::new(steps).find_cycle() {
    Some(path) => Err(WorkflowError::CyclicGraph { path }),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn op(id: &str) -> Step {
    Step::operation(id, "op").with_default_outputs(["return"])
  }

  fn reads(id: &str, from: &[&str]) -> Step {
    let mut step = op(id);
    for (i, upstream) in from.iter().enumerate() {
      step = step.with_input(format!("in{}", i), Source::step_output(*upstream, "return"));
    }
    step
  }

  #[test]
  fn test_add_step_rejects_unknown_reference() {
    let mut wf = Workflow::new("wf");
    let result = wf.add_step(reads("b", &["a"]));
    assert!(matches!(
      result,
      Err(WorkflowError::UnresolvedReference { ref reference, .. }) if reference == "a"
    ));
    assert!(wf.steps().is_empty());
  }

  #[test]
  fn test_add_step_rejects_self_reference() {
    let mut wf = Workflow::new("wf");
    let result = wf.add_step(reads("a", &["a"]));
    assert!(matches!(result, Err(WorkflowError::CyclicGraph { .. })));
  }

  #[test]
  fn test_replace_step_rejects_cycle_and_keeps_workflow() {
    let mut wf = Workflow::new("wf");
    wf.add_step(op("a")).unwrap();
    wf.add_step(reads("b", &["a"])).unwrap();
    wf.add_step(reads("c", &["b"])).unwrap();
    let before = wf.clone();

    let result = wf.replace_step(reads("a", &["c"]));
    assert!(matches!(result, Err(WorkflowError::CyclicGraph { .. })));
    assert_eq!(wf, before);
  }

  #[test]
  fn test_duplicate_resource_rejected() {
    let mut wf = Workflow::new("wf");
    wf.add_step(op("a")).unwrap();
    let clash = Step::operation("b", "op").with_output("return", "a");
    assert!(matches!(
      wf.add_step(clash),
      Err(WorkflowError::DuplicateResource { .. })
    ));
  }

  #[test]
  fn test_remove_step_leaves_dangling_reference() {
    let mut wf = Workflow::new("wf");
    wf.add_step(op("a")).unwrap();
    wf.add_step(reads("b", &["a"])).unwrap();
    wf.set_output("result", Source::step_output("a", "return"))
      .unwrap();

    let removed = wf.remove_step("a").unwrap();
    assert_eq!(removed.id, "a");
    assert_eq!(
      wf.dangling_references(),
      vec![("b".to_string(), "a".to_string())]
    );
    assert!(wf.outputs().is_empty());
    assert!(wf.validate().is_err());
  }

  #[test]
  fn test_remove_step_drops_only_its_outputs() {
    let mut wf = Workflow::new("wf");
    wf.add_step(op("a")).unwrap();
    wf.add_step(op("b")).unwrap();
    wf.set_output("first", Source::step_output("a", "return"))
      .unwrap();
    wf.set_output("second", Source::step_output("b", "return"))
      .unwrap();

    wf.remove_step("a").unwrap();
    let names: Vec<&str> = wf.outputs().keys().map(String::as_str).collect();
    assert_eq!(names, vec!["second"]);
    assert!(wf.validate().is_ok());
  }

  #[test]
  fn test_outputs_must_not_be_literal() {
    let mut wf = Workflow::new("wf");
    let result = wf.set_output("x", Source::literal(1));
    assert!(matches!(result, Err(WorkflowError::Validation { .. })));
  }

  #[test]
  fn test_output_may_forward_workflow_input() {
    let mut wf = Workflow::new("wf");
    wf.add_input("n", WorkflowInput::default());
    wf.set_output("echo", Source::workflow_input("n")).unwrap();
    assert!(wf.set_output("bad", Source::workflow_input("m")).is_err());
  }

  #[test]
  fn test_parse_argument() {
    let mut wf = Workflow::new("wf");
    wf.add_step(op("a")).unwrap();
    wf.add_step(Step::operation("s", "split").with_default_outputs(["head", "tail"]))
      .unwrap();

    assert_eq!(
      wf.parse_argument("@a").unwrap(),
      Source::step_output("a", "return")
    );
    assert_eq!(
      wf.parse_argument("@s.tail").unwrap(),
      Source::step_output("s", "tail")
    );
    assert_eq!(wf.parse_argument("a").unwrap(), Source::literal(json!("a")));
    assert!(matches!(
      wf.parse_argument("@missing"),
      Err(WorkflowError::UnknownResource { .. })
    ));
  }

  #[test]
  fn test_invalid_step_ids() {
    let mut wf = Workflow::new("wf");
    for id in ["", "a.b", "@a", "a b"] {
      assert!(matches!(
        wf.add_step(op(id)),
        Err(WorkflowError::InvalidStepId { .. })
      ));
    }
  }

  #[test]
  fn test_set_step_adds_then_replaces() {
    let mut wf = Workflow::new("wf");
    assert!(wf.set_step(op("a")).unwrap().is_none());
    let previous = wf
      .set_step(Step::expression("a", json!(1)))
      .unwrap()
      .expect("previous step");
    assert_eq!(previous.op_reference(), Some("op"));
    assert_eq!(wf.steps().len(), 1);
  }
}
