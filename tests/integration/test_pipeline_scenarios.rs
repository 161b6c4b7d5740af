use serde_json::json;
use serial_test::serial;
use sheetflow::core::config::ConfigLoader;
use sheetflow::core::workflow_graph::record::{record_from, Record};
use sheetflow::core::workflow_graph::rules::builtin_registry;
use sheetflow::core::workflow_graph::{build_pipeline, executor, BatchRunner, CompiledPipeline};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const WORKSPACE_CONFIG: &str = r#"
[rules]
dir = "rules"
workflow = "rules/nodes_config.yaml"

[batch]
parallel_limit = 3
"#;

const NODES_CONFIG: &str = r#"
workflow:
  type: sequential
  state_key: record
nodes:
  fba:
    module: format_fba_id
    function: apply_fba_rule
    description: Normalize FBA shipment box ids
  totals:
    module: calculate_totals
    function: apply_calculate_rules
  audit:
    module: audit
    function: mark_large_orders
  reject:
    module: audit
    function: reject_everything
  fill:
    module: fill_missing_values
    function: apply_fill_missing_values_rule
  legacy:
    module: legacy_rules
    function: apply_legacy
  parentheses:
    module: replace_parentheses
    function: apply_parentheses_rule
edges:
  - from: START
    to: fba
  - from: fba
    to: totals
  - from: totals
    to: audit
  - from: audit
    to: reject
  - from: reject
    to: legacy
  - from: legacy
    to: parentheses
  - from: parentheses
    to: fill
  - from: fill
    to: END
disabled_nodes:
  - parentheses
"#;

const AUDIT_SCRIPT: &str = r#"
fn mark_large_orders(record) {
    if record.contains("产品总个数") {
        record["大订单"] = record["产品总个数"] > 100;
    }
    record
}

fn reject_everything(record) {
    record["不应出现"] = true;
    throw "rejected by audit";
}
"#;

fn workspace() -> TempDir {
    let workspace = TempDir::new().unwrap();
    let rules = workspace.path().join("rules");
    fs::create_dir_all(&rules).unwrap();
    fs::write(workspace.path().join("sheetflow.toml"), WORKSPACE_CONFIG).unwrap();
    fs::write(rules.join("nodes_config.yaml"), NODES_CONFIG).unwrap();
    fs::write(rules.join("audit.rhai"), AUDIT_SCRIPT).unwrap();
    workspace
}

fn pipeline_for(root: &Path) -> CompiledPipeline {
    let config = ConfigLoader::load_from_workspace(root).unwrap();
    build_pipeline(&config, root, builtin_registry()).unwrap()
}

fn shipment_row(boxes: i64, per_box: i64) -> Record {
    record_from([
        ("FBA箱号", json!("FBA1915DRGZJU000001-U3")),
        ("中文品名", json!("收纳盒(小号)")),
        ("总箱数", json!(boxes)),
        ("单箱个数", json!(per_box)),
        ("品牌类型", json!("无")),
    ])
}

#[test]
#[serial]
fn configured_workflow_mixes_builtins_and_scripts() {
    let workspace = workspace();
    let pipeline = pipeline_for(workspace.path());
    assert_eq!(
        pipeline.node_names(),
        vec!["fba", "totals", "audit", "reject", "legacy", "fill"]
    );

    let run = executor::run_with_report(&pipeline, shipment_row(3, 50));
    assert_eq!(run.failed_nodes(), vec!["reject"]);

    let out = run.record;
    assert_eq!(out["FBA箱号"], json!("FBA1915DRGZJU000001-FBA1915DRGZJU000003"));
    assert_eq!(out["产品总个数"], json!(150));
    assert_eq!(out["大订单"], json!(true));
    assert!(!out.contains_key("不应出现"));
    // Disabled node: parentheses are untouched.
    assert_eq!(out["中文品名"], json!("收纳盒(小号)"));
    assert_eq!(out["品牌类型"], json!("无品牌"));
}

#[test]
#[serial]
fn configured_pipeline_runs_as_a_batch() {
    let workspace = workspace();
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    let pipeline = Arc::new(build_pipeline(&config, workspace.path(), builtin_registry()).unwrap());
    let runner = BatchRunner::new(pipeline, config.batch.parallel_limit);
    assert_eq!(runner.parallel_limit(), 3);

    let rows: Vec<Record> = (1..=5).map(|boxes| shipment_row(boxes, 30)).collect();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let out = runtime.block_on(runner.run(rows));

    let totals: Vec<_> = out.iter().map(|r| r["产品总个数"].clone()).collect();
    assert_eq!(totals, vec![json!(30), json!(60), json!(90), json!(120), json!(150)]);
    let large: Vec<_> = out.iter().map(|r| r["大订单"].clone()).collect();
    assert_eq!(
        large,
        vec![json!(false), json!(false), json!(false), json!(true), json!(true)]
    );
}

#[test]
#[serial]
fn broken_workflow_file_falls_back_to_builtin_chain() {
    let workspace = workspace();
    fs::write(
        workspace.path().join("rules/nodes_config.yaml"),
        "nodes: [this is not a mapping",
    )
    .unwrap();
    let pipeline = pipeline_for(workspace.path());
    assert_eq!(
        pipeline.node_names(),
        vec![
            "format_fba_id",
            "replace_parentheses",
            "calculate_totals",
            "fill_missing_values"
        ]
    );
    let out = executor::run(&pipeline, shipment_row(2, 10));
    assert_eq!(out["中文品名"], json!("收纳盒（小号）"));
    assert_eq!(out["产品总个数"], json!(20));
}

#[test]
#[serial]
fn script_outside_rule_dir_cannot_be_referenced() {
    let workspace = workspace();
    fs::write(workspace.path().join("outside.rhai"), AUDIT_SCRIPT).unwrap();
    fs::write(
        workspace.path().join("rules/nodes_config.yaml"),
        r#"
nodes:
  sneaky:
    module: ../outside
    function: mark_large_orders
"#,
    )
    .unwrap();
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    let err = build_pipeline(&config, workspace.path(), builtin_registry()).unwrap_err();
    assert_eq!(err.context.get("node").map(String::as_str), Some("sneaky"));
}

#[test]
#[serial]
fn state_wrapped_invocation_uses_configured_key() {
    let workspace = workspace();
    let pipeline = pipeline_for(workspace.path());
    let state = json!({ "record": shipment_row(1, 200), "sheet": "Sheet1" });
    let out = executor::invoke(&pipeline, state);
    assert_eq!(out["sheet"], json!("Sheet1"));
    assert_eq!(out["record"]["产品总个数"], json!(200));
    assert_eq!(out["record"]["大订单"], json!(true));
}
