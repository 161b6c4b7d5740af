#![allow(clippy::result_large_err)] // Rule trait and registry return AppError directly for structured diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::workflow_graph::record::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait implemented by record transformation rules.
///
/// A rule receives a full record by value and returns the full updated record.
/// It must not depend on anything outside the record and the state it was
/// constructed with, and should be a no-op on already-normalized input.
pub trait Rule: Send + Sync + 'static {
    /// Human readable rule name used in logs.
    fn name(&self) -> &str;

    /// Transform one record.
    fn apply(&self, record: Record) -> Result<Record, AppError>;
}

/// Shared handle to a resolved rule.
pub type Transform = Arc<dyn Rule>;

/// Adapter turning a plain function or closure into a [`Rule`].
pub struct FnRule<F> {
    name: String,
    func: F,
}

impl<F> FnRule<F>
where
    F: Fn(Record) -> Result<Record, AppError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Rule for FnRule<F>
where
    F: Fn(Record) -> Result<Record, AppError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, record: Record) -> Result<Record, AppError> {
        (self.func)(record)
    }
}

/// Identity transform substituted for rules that could not be loaded.
pub struct PassThrough {
    name: String,
}

impl PassThrough {
    pub fn new(module: &str, function: &str) -> Self {
        Self {
            name: format!("{}.{}", module, function),
        }
    }
}

impl Rule for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, record: Record) -> Result<Record, AppError> {
        tracing::debug!(rule = %self.name, "pass-through rule left record unchanged");
        Ok(record)
    }
}

/// `(module, function)` pair a node declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub module: String,
    pub function: String,
}

impl RuleKey {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Builder used to register rules before resolution.
#[derive(Default)]
pub struct RuleRegistryBuilder {
    rules: HashMap<RuleKey, Transform>,
}

impl RuleRegistryBuilder {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register `rule` under `module.function`.
    ///
    /// Panics when the key is already taken; registration happens once at startup.
    pub fn register<R: Rule>(&mut self, module: &str, function: &str, rule: R) -> &mut Self {
        self.register_shared(module, &[function], Arc::new(rule))
    }

    /// Register one shared rule under several function aliases of a module.
    pub fn register_shared(
        &mut self,
        module: &str,
        functions: &[&str],
        rule: Transform,
    ) -> &mut Self {
        for function in functions {
            let key = RuleKey::new(module, *function);
            if self.rules.contains_key(&key) {
                panic!("duplicate rule registered: {}", key);
            }
            self.rules.insert(key, Arc::clone(&rule));
        }
        self
    }

    pub fn build(self) -> RuleRegistry {
        RuleRegistry {
            inner: Arc::new(self.rules),
        }
    }
}

/// Immutable registered-plugin table consulted by the resolver.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    inner: Arc<HashMap<RuleKey, Transform>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        RuleRegistryBuilder::new().build()
    }

    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::new()
    }

    pub fn get(&self, module: &str, function: &str) -> Option<Transform> {
        self.inner.get(&RuleKey::new(module, function)).cloned()
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.inner.keys().any(|key| key.module == module)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<RuleKey> {
        let mut keys: Vec<_> = self.inner.keys().cloned().collect();
        keys.sort();
        keys
    }
}
