use serde_json::json;
use sheetflow::core::types::ErrorCategory;
use sheetflow::core::workflow_graph::executor::{self, NodeResult};
use sheetflow::core::workflow_graph::plan::PipelineStep;
use sheetflow::core::workflow_graph::record::{record_from, Record};
use sheetflow::core::workflow_graph::resolver::{RuleResolver, TrustedRuleDir};
use sheetflow::core::workflow_graph::rule::{FnRule, Rule, RuleRegistry};
use sheetflow::core::workflow_graph::rules::builtin_registry;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const TAGGING_SCRIPT: &str = r#"
fn apply_tag(record) {
    record["tag"] = "scripted";
    record
}

fn two_args(a, b) { a }
"#;

fn rule_dir_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, source) in files {
        fs::write(dir.path().join(name), source).unwrap();
    }
    dir
}

fn sample() -> Record {
    record_from([("总箱数", json!(2)), ("单箱个数", json!(80))])
}

// ── Trust boundary ───────────────────────────────────────────────────────────

#[test]
fn parent_directory_module_is_rejected_before_lookup() {
    let dir = rule_dir_with(&[]);
    let mut resolver = RuleResolver::new(builtin_registry()).with_rule_dir(dir.path());
    let err = resolver.resolve("../secrets", "steal").err().unwrap();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert_eq!(err.context.get("module").map(String::as_str), Some("../secrets"));
    assert_eq!(resolver.cached_len(), 0);
}

#[test]
fn absolute_module_is_rejected_even_without_rule_dir() {
    let mut resolver = RuleResolver::new(builtin_registry());
    let err = resolver.resolve("/etc/passwd", "read").err().unwrap();
    assert_eq!(err.category, ErrorCategory::ConfigError);
}

#[cfg(unix)]
#[test]
fn symlink_escaping_rule_dir_is_rejected() {
    let outside = rule_dir_with(&[("payload.rhai", TAGGING_SCRIPT)]);
    let dir = rule_dir_with(&[]);
    std::os::unix::fs::symlink(
        outside.path().join("payload.rhai"),
        dir.path().join("escape.rhai"),
    )
    .unwrap();

    let trusted = TrustedRuleDir::new(dir.path());
    assert_eq!(
        trusted.candidate("escape").unwrap_err().category,
        ErrorCategory::ConfigError
    );

    let mut resolver = RuleResolver::new(RuleRegistry::new()).with_rule_dir(dir.path());
    assert!(resolver.resolve("escape", "apply_tag").is_err());
}

#[test]
fn candidate_stays_inside_root() {
    let dir = rule_dir_with(&[("tagging.rhai", TAGGING_SCRIPT)]);
    let trusted = TrustedRuleDir::new(dir.path());
    let candidate = trusted.candidate("tagging").unwrap();
    assert!(candidate.starts_with(dir.path().canonicalize().unwrap()));
    assert!(candidate.ends_with("tagging.rhai"));
}

#[test]
fn script_imports_cannot_load_modules_outside_rule_dir() {
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("secret.rhai"), "fn leak() { \"SECRET\" }").unwrap();
    let secret = outside.path().join("secret");

    let top_level = format!(
        "import \"{}\" as s;\nfn apply(record) {{ record[\"leak\"] = s::leak(); record }}",
        secret.display()
    );
    let in_function = format!(
        "fn apply(record) {{ import \"{}\" as s; record[\"leak\"] = s::leak(); record }}",
        secret.display()
    );
    let dir = rule_dir_with(&[
        ("evil.rhai", top_level.as_str()),
        ("sneaky.rhai", in_function.as_str()),
    ]);
    let mut resolver = RuleResolver::new(RuleRegistry::new()).with_rule_dir(dir.path());

    for module in ["evil", "sneaky"] {
        let rule = resolver.resolve(module, "apply").unwrap();
        let step = PipelineStep::new(module, rule);
        match executor::run_node(&step, sample()) {
            NodeResult::Failed { record, error } => {
                assert_eq!(record, sample());
                assert_eq!(error.category, ErrorCategory::NodeExecutionFailure);
            }
            NodeResult::Applied(record) => panic!("{} imported a module: {:?}", module, record),
        }
    }
}

// ── Lookup order ─────────────────────────────────────────────────────────────

#[test]
fn registered_rule_is_resolved_and_cached() {
    let mut resolver = RuleResolver::new(builtin_registry());
    let first = resolver
        .resolve("calculate_totals", "apply_calculate_rules")
        .unwrap();
    let second = resolver
        .resolve("calculate_totals", "apply_calculate_rules")
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.cached_len(), 1);

    let out = first.apply(sample()).unwrap();
    assert_eq!(out["产品总个数"], json!(160));
}

#[test]
fn registry_wins_over_script_with_same_module() {
    let dir = rule_dir_with(&[(
        "calculate_totals.rhai",
        "fn apply_calculate_rules(record) { record[\"shadowed\"] = true; record }",
    )]);
    let mut resolver = RuleResolver::new(builtin_registry()).with_rule_dir(dir.path());
    let rule = resolver
        .resolve("calculate_totals", "apply_calculate_rules")
        .unwrap();
    assert!(!rule.apply(sample()).unwrap().contains_key("shadowed"));
}

#[test]
fn script_rule_is_loaded_from_rule_dir() {
    let dir = rule_dir_with(&[("tagging.rhai", TAGGING_SCRIPT)]);
    let mut resolver = RuleResolver::new(RuleRegistry::new()).with_rule_dir(dir.path());
    let rule = resolver.resolve("tagging", "apply_tag").unwrap();
    assert_eq!(rule.name(), "tagging.apply_tag");

    let out = rule.apply(sample()).unwrap();
    assert_eq!(out["tag"], json!("scripted"));
    assert_eq!(out["总箱数"], json!(2));
}

// ── Degradation to pass-through ──────────────────────────────────────────────

#[test]
fn missing_module_degrades_to_identity() {
    let dir = rule_dir_with(&[]);
    let mut resolver = RuleResolver::new(builtin_registry()).with_rule_dir(dir.path());
    let rule = resolver.resolve("not_there", "apply").unwrap();
    assert_eq!(rule.apply(sample()).unwrap(), sample());
}

#[test]
fn missing_or_wrong_arity_function_degrades_to_identity() {
    let dir = rule_dir_with(&[("tagging.rhai", TAGGING_SCRIPT)]);
    let mut resolver = RuleResolver::new(RuleRegistry::new()).with_rule_dir(dir.path());
    for function in ["absent", "two_args"] {
        let rule = resolver.resolve("tagging", function).unwrap();
        assert_eq!(rule.apply(sample()).unwrap(), sample(), "{}", function);
    }
}

#[test]
fn unregistered_function_of_registered_module_degrades_to_identity() {
    let mut resolver = RuleResolver::new(builtin_registry());
    let rule = resolver.resolve("calculate_totals", "no_such_function").unwrap();
    assert_eq!(rule.apply(sample()).unwrap(), sample());
}

#[test]
fn broken_script_degrades_every_function_of_the_module() {
    let dir = rule_dir_with(&[("broken.rhai", "fn apply(record) { record[ }")]);
    let mut resolver = RuleResolver::new(RuleRegistry::new()).with_rule_dir(dir.path());
    let first = resolver.resolve("broken", "apply").unwrap();
    let second = resolver.resolve("broken", "other").unwrap();
    assert_eq!(first.apply(sample()).unwrap(), sample());
    assert_eq!(second.apply(sample()).unwrap(), sample());
    assert_eq!(resolver.cached_len(), 2);
}

#[test]
fn custom_registry_rules_are_resolved() {
    let mut builder = RuleRegistry::builder();
    builder.register(
        "house_rules",
        "apply_stamp",
        FnRule::new("stamp", |mut record: Record| {
            record.insert("stamped".into(), json!(true));
            Ok(record)
        }),
    );
    let mut resolver = RuleResolver::new(builder.build());
    let rule = resolver.resolve("house_rules", "apply_stamp").unwrap();
    assert_eq!(rule.apply(Record::new()).unwrap()["stamped"], json!(true));
}
