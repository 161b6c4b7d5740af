use sheetflow::core::error::AppError;
use sheetflow::core::types::ErrorCategory;
use sheetflow::core::workflow_graph::schema::{
    self, ConfigSource, EdgeDescriptor, NodeDescriptor, WorkflowDescription, YamlFileSource, END,
    START,
};
use std::fs;
use tempfile::TempDir;

const NODES_CONFIG: &str = r#"
workflow:
  type: sequential
  state_key: product_data

nodes:
  format_fba_id:
    module: format_fba_id
    function: apply_fba_rule
    description: Normalize FBA box ids
  price_check:
    module: price_validation
    function: apply_price_validation_rule
  fill_defaults:
    module: fill_missing_values
    function: apply_fill_missing_values_rule

edges:
  - from: START
    to: format_fba_id
  - from: format_fba_id
    to: price_check
  - from: price_check
    to: fill_defaults
  - from: fill_defaults
    to: END

disabled_nodes:
  - price_check
"#;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes_config.yaml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

// ── YAML parsing ─────────────────────────────────────────────────────────────

#[test]
fn parses_nodes_edges_and_disabled_list() {
    let workflow = WorkflowDescription::from_yaml_str(NODES_CONFIG).unwrap();

    let names: Vec<_> = workflow.nodes.keys().map(String::as_str).collect();
    assert_eq!(names, ["format_fba_id", "price_check", "fill_defaults"]);
    assert_eq!(
        workflow.nodes["format_fba_id"],
        NodeDescriptor::new("format_fba_id", "apply_fba_rule")
            .with_description("Normalize FBA box ids")
    );
    assert_eq!(workflow.edges.first(), Some(&EdgeDescriptor::new(START, "format_fba_id")));
    assert_eq!(workflow.edges.last(), Some(&EdgeDescriptor::new("fill_defaults", END)));
    assert!(workflow.is_disabled("price_check"));

    let enabled: Vec<_> = workflow.enabled_nodes().map(|(name, _)| name.as_str()).collect();
    assert_eq!(enabled, ["format_fba_id", "fill_defaults"]);
}

#[test]
fn blank_state_key_falls_back_to_default() {
    let workflow = WorkflowDescription::from_yaml_str(
        "workflow:\n  state_key: \"\"\nnodes:\n  a:\n    module: m\n    function: f\n",
    )
    .unwrap();
    assert_eq!(workflow.state_key(), "product_data");
}

#[test]
fn malformed_yaml_is_a_serialization_error() {
    let err = WorkflowDescription::from_yaml_str("nodes: [unterminated").unwrap_err();
    assert_eq!(err.category, ErrorCategory::SerializationError);
}

// ── Sources and fallback ─────────────────────────────────────────────────────

#[test]
fn yaml_file_source_loads_file() {
    let (_dir, path) = write_config(NODES_CONFIG);
    let source = YamlFileSource::new(&path);
    assert_eq!(source.path(), path.as_path());
    let workflow = source.load().unwrap();
    assert_eq!(workflow.nodes.len(), 3);
}

#[test]
fn missing_file_falls_back_to_builtin() {
    let dir = TempDir::new().unwrap();
    let source = YamlFileSource::new(dir.path().join("absent.yaml"));
    assert_eq!(source.load().unwrap_err().category, ErrorCategory::IoError);
    assert_eq!(schema::load_or_builtin(&source), WorkflowDescription::builtin());
}

#[test]
fn malformed_file_falls_back_to_builtin() {
    let (_dir, path) = write_config("nodes:\n  - not a mapping\n");
    let workflow = schema::load_workflow(Some(path.as_path()));
    assert_eq!(workflow, WorkflowDescription::builtin());
}

#[test]
fn no_path_means_builtin() {
    assert_eq!(schema::load_workflow(None), WorkflowDescription::builtin());
}

struct InMemorySource(WorkflowDescription);

impl ConfigSource for InMemorySource {
    fn load(&self) -> Result<WorkflowDescription, AppError> {
        Ok(self.0.clone())
    }
}

#[test]
fn custom_sources_plug_into_fallback_loader() {
    let mut workflow = WorkflowDescription::default();
    workflow
        .nodes
        .insert("only".into(), NodeDescriptor::new("calculate_totals", "apply_calculate_rules"));
    let loaded = schema::load_or_builtin(&InMemorySource(workflow.clone()));
    assert_eq!(loaded, workflow);
}
