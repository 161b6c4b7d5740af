use serial_test::serial;
use sheetflow::core::config::{ConfigLoader, SheetflowConfig};
use sheetflow::core::workflow_graph::build_pipeline;
use sheetflow::core::workflow_graph::rules::builtin_registry;
use sheetflow::logging::{ConsoleOutput, LoggingConfig};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for var in [
        "SHEETFLOW_RULE_DIR",
        "SHEETFLOW_WORKFLOW_FILE",
        "SHEETFLOW_BATCH_PARALLEL_LIMIT",
        "SHEETFLOW_LOG_CONSOLE",
        "SHEETFLOW_LOG_DIR",
    ] {
        env::remove_var(var);
    }
}

const FULL_CONFIG: &str = r#"
[rules]
dir = "custom_rules"
workflow = "custom_rules/nodes_config.yaml"

[batch]
parallel_limit = 2

[logging]
default_level = "warn"
enable_file = true
console_output = "none"
"#;

#[test]
#[serial]
fn one_file_feeds_engine_and_logging_config() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::write(workspace.path().join("sheetflow.toml"), FULL_CONFIG).unwrap();

    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(config.rules.dir, PathBuf::from("custom_rules"));
    assert_eq!(
        config.workflow_file(workspace.path()),
        Some(workspace.path().join("custom_rules/nodes_config.yaml"))
    );
    assert_eq!(config.batch.parallel_limit, 2);

    let logging = LoggingConfig::load(Some(workspace.path())).unwrap();
    assert_eq!(logging.default_level, "warn");
    assert!(logging.enable_file);
    assert_eq!(logging.console_output, ConsoleOutput::None);
}

#[test]
#[serial]
fn env_overrides_win_over_file_values() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::write(workspace.path().join("sheetflow.toml"), FULL_CONFIG).unwrap();
    env::set_var("SHEETFLOW_WORKFLOW_FILE", "/etc/sheetflow/workflow.yaml");
    env::set_var("SHEETFLOW_BATCH_PARALLEL_LIMIT", "12");

    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(
        config.rules.workflow,
        Some(PathBuf::from("/etc/sheetflow/workflow.yaml"))
    );
    assert_eq!(config.batch.parallel_limit, 12);
    clear_env();
}

#[test]
#[serial]
fn build_pipeline_rejects_invalid_config() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    let mut config = SheetflowConfig::default();
    config.batch.parallel_limit = 0;

    let err = build_pipeline(&config, workspace.path(), builtin_registry()).unwrap_err();
    assert!(err.message.contains("parallel limit"));
}

#[test]
#[serial]
fn build_pipeline_without_workflow_file_uses_builtin_chain() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    let pipeline =
        build_pipeline(&SheetflowConfig::default(), workspace.path(), builtin_registry()).unwrap();
    assert_eq!(
        pipeline.node_names(),
        vec![
            "format_fba_id",
            "replace_parentheses",
            "calculate_totals",
            "fill_missing_values"
        ]
    );
}

#[test]
#[serial]
fn build_pipeline_reads_configured_workflow() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::create_dir_all(workspace.path().join("rules")).unwrap();
    fs::write(
        workspace.path().join("rules/nodes_config.yaml"),
        r#"
workflow:
  type: sequential
  state_key: row
nodes:
  totals:
    module: calculate_totals
    function: apply_calculate_totals_rule
  pricing:
    module: price_validation
    function: apply_price_validation
edges:
  - from: START
    to: totals
  - from: totals
    to: pricing
  - from: pricing
    to: END
"#,
    )
    .unwrap();

    let mut config = SheetflowConfig::default();
    config.rules.workflow = Some(PathBuf::from("rules/nodes_config.yaml"));
    let pipeline = build_pipeline(&config, workspace.path(), builtin_registry()).unwrap();
    assert_eq!(pipeline.state_key(), "row");
    assert_eq!(pipeline.node_names(), vec!["totals", "pricing"]);
}
