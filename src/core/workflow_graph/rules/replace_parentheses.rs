use crate::core::error::AppError;
use crate::core::workflow_graph::record::Record;
use crate::core::workflow_graph::rule::Rule;
use serde_json::Value;

/// Swaps ASCII parentheses for their full-width forms in every string field.
pub struct ReplaceParenthesesRule;

impl Default for ReplaceParenthesesRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaceParenthesesRule {
    pub fn new() -> Self {
        Self
    }
}

fn full_width(value: &str) -> String {
    value.replace('(', "（").replace(')', "）")
}

impl Rule for ReplaceParenthesesRule {
    fn name(&self) -> &str {
        "replace_parentheses"
    }

    fn apply(&self, mut record: Record) -> Result<Record, AppError> {
        let mut changed = 0usize;
        for (key, value) in record.iter_mut() {
            if let Value::String(text) = value {
                if text.contains(['(', ')']) {
                    *text = full_width(text);
                    changed += 1;
                    tracing::debug!(field = %key, "replaced parentheses");
                }
            }
        }
        if changed > 0 {
            tracing::info!(fields = changed, "parentheses replaced with full-width forms");
        }
        Ok(record)
    }
}
