#![allow(clippy::result_large_err)]

//! Rules written as Rhai scripts inside the trusted rule directory.
//!
//! A script module `<rule_dir>/<module>.rhai` exposes one-argument functions that
//! take the record as an object map and return the updated map.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::record::Record;
use crate::core::workflow_graph::rule::Rule;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{Package, StandardPackage};
use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde_json::{Map as JsonMap, Number, Value};
use std::path::Path;
use std::sync::Arc;

const MAX_OPERATIONS: u64 = 200_000;
const MAX_CALL_LEVELS: usize = 64;
const MAX_EXPR_DEPTH: usize = 64;

/// Sandboxed Rhai engine shared by every script rule of one resolver.
#[derive(Clone)]
pub struct ScriptEngine {
    engine: Arc<Engine>,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        // No file module resolver: `import` must not reach outside the rule directory.
        let mut engine = Engine::new_raw();
        engine.register_global_module(StandardPackage::new().as_shared_module());
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.on_print(|text| tracing::info!(target: "sheetflow::script", "{}", text));
        engine.on_debug(|text, _, _| tracing::debug!(target: "sheetflow::script", "{}", text));
        ScriptEngine {
            engine: Arc::new(engine),
        }
    }
}

impl ScriptEngine {
    /// Compile a script module from disk.
    pub fn compile_file(&self, path: &Path) -> Result<AST, AppError> {
        self.engine
            .compile_file(path.to_path_buf())
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ResolutionFailure,
                    format!("failed to compile {}: {}", path.display(), err),
                )
                .with_code("SFL-SCRIPT-001")
            })
    }

    /// Bind `function` from a compiled module, if it is defined with one parameter.
    pub fn bind(&self, module: &str, ast: Arc<AST>, function: &str) -> Option<ScriptRule> {
        let defined = ast
            .iter_functions()
            .any(|meta| meta.name == function && meta.params.len() == 1);
        if !defined {
            return None;
        }
        Some(ScriptRule {
            name: format!("{}.{}", module, function),
            function: function.to_string(),
            engine: Arc::clone(&self.engine),
            ast,
        })
    }
}

/// A rule backed by one Rhai script function.
pub struct ScriptRule {
    name: String,
    function: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl Rule for ScriptRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, record: Record) -> Result<Record, AppError> {
        let original_keys: Vec<String> = record.keys().cloned().collect();
        let input = to_dynamic(&Value::Object(record));
        let mut scope = Scope::new();
        let output = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, &self.function, (input,))
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::NodeExecutionFailure,
                    format!("script {} failed: {}", self.name, err),
                )
                .with_code("SFL-SCRIPT-002")
            })?;

        let map = output.try_cast::<Map>().ok_or_else(|| {
            AppError::new(
                ErrorCategory::NodeExecutionFailure,
                format!("script {} must return an object map", self.name),
            )
            .with_code("SFL-SCRIPT-003")
        })?;
        Ok(reorder(original_keys, map))
    }
}

/// Keys present before the call keep their position; new keys are appended.
fn reorder(original_keys: Vec<String>, mut map: Map) -> Record {
    let mut record = Record::new();
    for key in original_keys {
        if let Some(value) = map.remove(key.as_str()) {
            record.insert(key, from_dynamic(value));
        }
    }
    for (key, value) in map {
        record.insert(key.to_string(), from_dynamic(value));
    }
    record
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => Dynamic::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Object(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.as_str().into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if value.is_bool() {
        return value.as_bool().map(Value::Bool).unwrap_or(Value::Null);
    }
    if value.is_int() {
        return value
            .as_int()
            .map(|i| Value::Number(Number::from(i)))
            .unwrap_or(Value::Null);
    }
    if value.is_float() {
        return value
            .as_float()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if value.is_string() {
        return value
            .into_string()
            .map(Value::String)
            .unwrap_or(Value::Null);
    }
    if value.is_array() {
        return match value.try_cast::<Array>() {
            Some(items) => Value::Array(items.into_iter().map(from_dynamic).collect()),
            None => Value::Null,
        };
    }
    if value.is_map() {
        return match value.try_cast::<Map>() {
            Some(map) => {
                let mut json_map = JsonMap::new();
                for (key, value) in map {
                    json_map.insert(key.to_string(), from_dynamic(value));
                }
                Value::Object(json_map)
            }
            None => Value::Null,
        };
    }
    Value::String(value.to_string())
}
