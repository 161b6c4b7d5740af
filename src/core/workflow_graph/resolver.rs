#![allow(clippy::result_large_err)] // Resolver returns AppError so trust-boundary violations carry their module context.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::rule::{PassThrough, RuleKey, RuleRegistry, Transform};
use crate::core::workflow_graph::script::ScriptEngine;
use rhai::AST;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension of script rule modules.
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Reject module names that could leave the rule directory.
pub fn validate_module_name(module: &str) -> Result<(), AppError> {
    let unsafe_reason = if module.trim().is_empty() {
        Some("module name is empty")
    } else if module.contains("..") {
        Some("contains a parent-directory segment")
    } else if module.contains('/') || module.contains('\\') {
        Some("contains a path separator")
    } else if module.contains('\0') {
        Some("contains a NUL byte")
    } else if Path::new(module).is_absolute() || module.contains(':') {
        Some("is an absolute path")
    } else {
        None
    };

    match unsafe_reason {
        Some(reason) => Err(trust_violation(module, reason)),
        None => Ok(()),
    }
}

fn trust_violation(module: &str, reason: &str) -> AppError {
    AppError::new(
        ErrorCategory::ConfigError,
        format!("unsafe module path '{}': {}", module, reason),
    )
    .with_code("SFL-CFG-TRUST")
    .with_context("module", module)
}

/// Filesystem root that script rule modules must stay inside.
#[derive(Debug, Clone)]
pub struct TrustedRuleDir {
    root: PathBuf,
}

impl TrustedRuleDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate script path for `module`, checked to be a descendant of the root.
    ///
    /// The returned path is canonical when the file exists. A missing file is not an
    /// error here; the caller decides how to degrade.
    pub fn candidate(&self, module: &str) -> Result<PathBuf, AppError> {
        validate_module_name(module)?;
        let candidate = self
            .root
            .join(format!("{}.{}", module, SCRIPT_EXTENSION));

        let anchor = match self.root.canonicalize() {
            Ok(anchor) => anchor,
            // Without an existing root nothing can be read from it.
            Err(_) => return Ok(candidate),
        };

        let resolved = match candidate.canonicalize() {
            Ok(resolved) => resolved,
            Err(_) => anchor.join(format!("{}.{}", module, SCRIPT_EXTENSION)),
        };
        if !resolved.starts_with(&anchor) || resolved == anchor {
            return Err(trust_violation(
                module,
                &format!("resolves outside rule directory {}", anchor.display()),
            ));
        }
        Ok(resolved)
    }
}

/// Resolves node rule references into transforms.
///
/// Lookup order: trust check, registered-plugin table, script module in the
/// trusted directory, pass-through fallback. Results are cached per key.
pub struct RuleResolver {
    registry: RuleRegistry,
    rule_dir: Option<TrustedRuleDir>,
    scripts: ScriptEngine,
    cache: HashMap<RuleKey, Transform>,
    modules: HashMap<String, Option<Arc<AST>>>,
}

impl RuleResolver {
    /// Resolver over registered rules only.
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            rule_dir: None,
            scripts: ScriptEngine::default(),
            cache: HashMap::new(),
            modules: HashMap::new(),
        }
    }

    /// Also resolve script modules from `dir`.
    pub fn with_rule_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rule_dir = Some(TrustedRuleDir::new(dir));
        self
    }

    pub fn rule_dir(&self) -> Option<&TrustedRuleDir> {
        self.rule_dir.as_ref()
    }

    /// Number of distinct `(module, function)` pairs resolved so far.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve `module.function`.
    ///
    /// Only trust-boundary violations are returned as errors; every other failure
    /// yields a logged pass-through transform.
    pub fn resolve(&mut self, module: &str, function: &str) -> Result<Transform, AppError> {
        validate_module_name(module)?;
        let key = RuleKey::new(module, function);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let candidate = match &self.rule_dir {
            Some(dir) => Some(dir.candidate(module)?),
            None => None,
        };

        let transform = match self.lookup(module, function, candidate.as_deref()) {
            Ok(transform) => {
                tracing::info!(rule = %key, "resolved rule");
                transform
            }
            Err(err) => {
                tracing::warn!(
                    module = module,
                    function = function,
                    reason = %err.message,
                    "rule could not be loaded, substituting pass-through"
                );
                Arc::new(PassThrough::new(module, function))
            }
        };
        self.cache.insert(key, Arc::clone(&transform));
        Ok(transform)
    }

    fn lookup(
        &mut self,
        module: &str,
        function: &str,
        candidate: Option<&Path>,
    ) -> Result<Transform, AppError> {
        if let Some(rule) = self.registry.get(module, function) {
            return Ok(rule);
        }

        let path = match candidate {
            Some(path) if path.is_file() => path,
            Some(path) => {
                return Err(resolution_failure(
                    module,
                    function,
                    format!("rule module {} does not exist", path.display()),
                ));
            }
            None if self.registry.contains_module(module) => {
                return Err(resolution_failure(
                    module,
                    function,
                    format!("function {} is not registered in module {}", function, module),
                ));
            }
            None => {
                return Err(resolution_failure(
                    module,
                    function,
                    format!("module {} is not registered", module),
                ));
            }
        };

        let ast = self.load_module(module, path)?;
        match self.scripts.bind(module, ast, function) {
            Some(rule) => Ok(Arc::new(rule)),
            None => Err(resolution_failure(
                module,
                function,
                format!("function {} is not defined in {}", function, path.display()),
            )),
        }
    }

    fn load_module(&mut self, module: &str, path: &Path) -> Result<Arc<AST>, AppError> {
        if let Some(entry) = self.modules.get(module) {
            return entry.clone().ok_or_else(|| {
                resolution_failure(module, "*", "module failed to compile earlier".to_string())
            });
        }
        match self.scripts.compile_file(path) {
            Ok(ast) => {
                let ast = Arc::new(ast);
                self.modules
                    .insert(module.to_string(), Some(Arc::clone(&ast)));
                Ok(ast)
            }
            Err(err) => {
                self.modules.insert(module.to_string(), None);
                Err(err)
            }
        }
    }
}

fn resolution_failure(module: &str, function: &str, message: String) -> AppError {
    AppError::new(ErrorCategory::ResolutionFailure, message)
        .with_code("SFL-RESOLVE-001")
        .with_context("module", module)
        .with_context("function", function)
}
