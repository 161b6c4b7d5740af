use crate::core::error::AppError;
use crate::core::workflow_graph::record::{is_falsy, numeric, rounded, Record};
use crate::core::workflow_graph::rule::Rule;
use serde_json::Value;

pub const DECLARED_UNIT_PRICE: &str = "申报单价";
pub const PURCHASE_UNIT_PRICE: &str = "采购单价";
pub const PROFIT_MARGIN: &str = "利润率";
pub const PROFIT_WARNING: &str = "利润警告";

/// Margins below this percentage are flagged as low.
const LOW_MARGIN_PERCENT: f64 = 10.0;

/// Profit classification written to `利润警告`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginLevel {
    Negative,
    Low,
    Normal,
}

impl MarginLevel {
    pub fn classify(margin_percent: f64) -> Self {
        if margin_percent < 0.0 {
            MarginLevel::Negative
        } else if margin_percent < LOW_MARGIN_PERCENT {
            MarginLevel::Low
        } else {
            MarginLevel::Normal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarginLevel::Negative => "负利润",
            MarginLevel::Low => "低利润",
            MarginLevel::Normal => "正常",
        }
    }
}

/// Annotates a record with its profit margin relative to the purchase price.
pub struct PriceValidationRule;

impl Default for PriceValidationRule {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceValidationRule {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for PriceValidationRule {
    fn name(&self) -> &str {
        "price_validation"
    }

    fn apply(&self, mut record: Record) -> Result<Record, AppError> {
        if is_falsy(record.get(DECLARED_UNIT_PRICE)) || is_falsy(record.get(PURCHASE_UNIT_PRICE)) {
            return Ok(record);
        }
        let (Some(declared), Some(purchase)) = (
            numeric(record.get(DECLARED_UNIT_PRICE)),
            numeric(record.get(PURCHASE_UNIT_PRICE)),
        ) else {
            return Ok(record);
        };
        if purchase <= 0.0 {
            return Ok(record);
        }

        let margin = (declared - purchase) / purchase * 100.0;
        let level = MarginLevel::classify(margin);
        if level != MarginLevel::Normal {
            tracing::warn!(margin = %format!("{margin:.2}"), declared, purchase, "low profit margin");
        }
        record.insert(PROFIT_MARGIN.to_string(), rounded(margin, 2));
        record.insert(PROFIT_WARNING.to_string(), Value::String(level.label().to_string()));
        tracing::debug!(margin = %format!("{margin:.2}"), "price validation completed");
        Ok(record)
    }
}
