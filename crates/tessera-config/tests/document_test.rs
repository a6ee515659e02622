//! File round trips for workflow documents.

use serde_json::json;
use tessera_config::{DataType, DocumentFormat, InputDef, OutputDef, SourceDef, StepDef, WorkflowDocument};

fn sample_document() -> WorkflowDocument {
  let mut doc = WorkflowDocument::new("demo.scale");
  doc
    .header
    .insert("description".to_string(), json!("Scale a value"));
  doc.inputs.insert(
    "factor".to_string(),
    InputDef {
      data_type: DataType::Number,
      description: Some("multiplier".to_string()),
      default: Some(json!(2)),
      value_set_source: None,
    },
  );
  doc.outputs.insert(
    "scaled".to_string(),
    OutputDef {
      source: "product".to_string(),
      description: None,
    },
  );
  doc
    .steps
    .push(StepDef::operation("base", "const").with_input("value", SourceDef::value(json!(21))));
  doc.steps.push(
    StepDef::operation("product", "multiply")
      .with_input("x", SourceDef::reference("base"))
      .with_input("y", SourceDef::reference("demo.scale.factor")),
  );
  doc
}

#[test]
fn test_json_file_round_trip() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("nested").join("scale.json");

  let doc = sample_document();
  doc.save(&path).expect("save failed");
  let loaded = WorkflowDocument::load(&path).expect("load failed");

  assert_eq!(loaded, doc);
}

#[test]
fn test_yaml_file_round_trip() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("scale.yaml");

  let doc = sample_document();
  doc.save(&path).expect("save failed");
  let content = std::fs::read_to_string(&path).unwrap();
  assert!(content.contains("qualified_name: demo.scale"));

  let loaded = WorkflowDocument::load(&path).expect("load failed");
  assert_eq!(loaded, doc);
}

#[test]
fn test_parse_yaml_literal_and_reference_inputs() {
  let yaml = r#"
qualified_name: greet
steps:
  - id: hello
    op: concat
    inputs:
      a: { value: "hello " }
      b: { source: greet.name }
inputs:
  name:
    data_type: string
"#;

  let doc = WorkflowDocument::parse(yaml, DocumentFormat::Yaml).expect("parse failed");
  assert_eq!(doc.inputs["name"].data_type, DataType::String);
  assert_eq!(doc.steps[0].inputs["a"], SourceDef::value(json!("hello ")));
  assert_eq!(doc.steps[0].inputs["b"].as_reference(), Some("greet.name"));
}
