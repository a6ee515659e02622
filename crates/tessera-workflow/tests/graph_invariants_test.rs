//! Structural invariants of workflow mutation.

use tessera_workflow::{Source, Step, Workflow, WorkflowError};

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

/// a <- b <- c <- d, plus an unrelated e.
fn chain() -> Workflow {
  let mut wf = Workflow::new("chain");
  wf.add_step(op("a")).unwrap();
  wf.add_step(reads("b", &["a"])).unwrap();
  wf.add_step(reads("c", &["b"])).unwrap();
  wf.add_step(reads("d", &["c"])).unwrap();
  wf.add_step(op("e")).unwrap();
  wf
}

#[test]
fn test_rewiring_never_introduces_a_cycle() {
  let ids = ["a", "b", "c", "d", "e"];

  for target in ids {
    for source in ids {
      if target == source {
        continue;
      }

      let mut wf = chain();
      let before = wf.clone();
      let result = wf.replace_step(reads(target, &[source]));

      match result {
        Ok(_) => {
          assert!(wf.graph().find_cycle().is_none(), "{} <- {}", target, source);
          assert!(wf.validate().is_ok());
        }
        Err(WorkflowError::CyclicGraph { path }) => {
          assert_eq!(wf, before, "failed mutation must not change the workflow");
          assert_eq!(path.first(), path.last());
        }
        Err(other) => panic!("unexpected error for {} <- {}: {}", target, source, other),
      }
    }
  }
}

#[test]
fn test_cycle_is_detected_only_for_downstream_sources() {
  let mut wf = chain();
  // b reading from d would close b -> c -> d -> b
  assert!(matches!(
    wf.replace_step(reads("b", &["d"])),
    Err(WorkflowError::CyclicGraph { .. })
  ));
  // d reading from a is fine
  assert!(wf.replace_step(reads("d", &["a"])).is_ok());
}

#[test]
fn test_graph_order_after_mutations() {
  let mut wf = chain();
  wf.replace_step(reads("a", &["e"])).unwrap();

  let order = wf.graph().full_order().unwrap();
  assert_eq!(order, vec!["e", "a", "b", "c", "d"]);
  assert_eq!(wf.dependents_of("a"), vec!["b"]);
}
