//! Built-in record rules and their registration.

pub mod calculate_totals;
pub mod field_mapping;
pub mod fill_missing_values;
pub mod format_fba_id;
pub mod price_validation;
pub mod replace_parentheses;

use crate::core::workflow_graph::rule::{RuleRegistry, RuleRegistryBuilder, Transform};
use std::sync::Arc;

pub use field_mapping::{FieldMappingContext, FieldMappingRule, MappingBackend};

/// Optional collaborators for rules that talk to external services.
#[derive(Default)]
pub struct BuiltinRuleDeps {
    /// Backend for `field_mapping_llm`. The rule is not registered without one.
    pub mapping_backend: Option<Arc<dyn MappingBackend>>,
}

/// Register built-in rules into the supplied builder under every alias.
pub fn register_builtins(builder: &mut RuleRegistryBuilder) {
    register_builtins_with_deps(builder, BuiltinRuleDeps::default());
}

pub fn register_builtins_with_deps(builder: &mut RuleRegistryBuilder, deps: BuiltinRuleDeps) {
    let fba: Transform = Arc::new(format_fba_id::FormatFbaIdRule::new());
    let parentheses: Transform = Arc::new(replace_parentheses::ReplaceParenthesesRule::new());
    let totals: Transform = Arc::new(calculate_totals::CalculateTotalsRule::new());
    let fill: Transform = Arc::new(fill_missing_values::FillMissingValuesRule::new());
    let price: Transform = Arc::new(price_validation::PriceValidationRule::new());

    builder
        .register_shared(
            "format_fba_id",
            &["apply_fba_rule", "apply_format_fba_id_rule", "format_fba_id"],
            fba,
        )
        .register_shared(
            "replace_parentheses",
            &["apply_parentheses_rule", "replace_parentheses"],
            parentheses,
        )
        .register_shared(
            "calculate_totals",
            &["apply_calculate_rules", "apply_calculate_totals_rule"],
            totals,
        )
        .register_shared(
            "fill_missing_values",
            &["apply_fill_missing_values_rule", "fill_missing_values"],
            fill,
        )
        .register_shared(
            "price_validation",
            &["apply_price_validation_rule", "apply_price_validation"],
            price,
        );

    if let Some(backend) = deps.mapping_backend {
        // One context per registry, so cache and breaker never outlive the build.
        let rule: Transform = Arc::new(FieldMappingRule::new(
            backend,
            Arc::new(FieldMappingContext::new()),
        ));
        builder.register_shared(
            "field_mapping_llm",
            &["apply_field_mapping_llm_rule", "apply_field_mapping_rule"],
            rule,
        );
    }
}

/// Registry holding only the built-in rules.
pub fn builtin_registry() -> RuleRegistry {
    let mut builder = RuleRegistry::builder();
    register_builtins(&mut builder);
    builder.build()
}
