use crate::core::error::AppError;
use crate::core::workflow_graph::record::{is_blank, is_falsy, numeric, rounded, Record};
use crate::core::workflow_graph::rule::Rule;
use serde_json::{json, Value};

const PIECES_PER_BOX: [&str; 2] = ["单箱个数", "单箱\n个数"];
const NET_WEIGHT: [&str; 2] = ["单箱净重", "单箱\n净重"];
const GROSS_WEIGHT: [&str; 2] = ["单箱毛重", "单箱\n毛重"];
const TOTAL_PIECES: &str = "产品总个数";
const TOTAL_BOXES: &str = "总箱数";

/// Packaging weight subtracted from gross weight, in kilograms.
const PACKAGING_WEIGHT: f64 = 1.0;

const NONE_TEXT: &str = "无";
const NO_BRAND_TEXT: &str = "无品牌";
const NO_LINK_TEXT: &str = "/";

/// Fills derivable quantities and placeholder text for empty cells.
pub struct FillMissingValuesRule;

impl Default for FillMissingValuesRule {
    fn default() -> Self {
        Self::new()
    }
}

impl FillMissingValuesRule {
    pub fn new() -> Self {
        Self
    }
}

/// First of `keys` that is present in the record.
fn existing_key<'a>(record: &Record, keys: &[&'a str]) -> Option<&'a str> {
    keys.iter().copied().find(|key| record.contains_key(*key))
}

fn all_falsy(record: &Record, keys: &[&str]) -> bool {
    keys.iter().all(|key| is_falsy(record.get(*key)))
}

fn fill_pieces_per_box(record: &mut Record, filled: &mut Vec<String>) {
    if !all_falsy(record, &PIECES_PER_BOX) {
        return;
    }
    let (Some(total), Some(boxes)) = (
        numeric(record.get(TOTAL_PIECES)),
        numeric(record.get(TOTAL_BOXES)),
    ) else {
        return;
    };
    if boxes <= 0.0 {
        return;
    }
    let per_box = (total / boxes).trunc() as i64;
    if let Some(key) = existing_key(record, &PIECES_PER_BOX) {
        record.insert(key.to_string(), json!(per_box));
        filled.push(format!("单箱个数={per_box}"));
    }
}

fn fill_net_weight(record: &mut Record, filled: &mut Vec<String>) {
    if !all_falsy(record, &NET_WEIGHT) {
        return;
    }
    let gross = GROSS_WEIGHT
        .iter()
        .map(|key| record.get(*key))
        .find(|value| !is_falsy(*value))
        .and_then(numeric);
    let Some(gross) = gross else {
        return;
    };
    let net = rounded(gross - PACKAGING_WEIGHT, 4);
    if let Some(key) = existing_key(record, &NET_WEIGHT) {
        filled.push(format!("单箱净重={net}"));
        record.insert(key.to_string(), net);
    }
}

fn placeholder_for(key: &str, value: Option<&Value>) -> Option<&'static str> {
    if key.contains("品牌类型") {
        let is_none_text = matches!(value, Some(Value::String(s)) if s.trim() == NONE_TEXT);
        return (is_blank(value) || is_none_text).then_some(NO_BRAND_TEXT);
    }
    if !is_blank(value) {
        return None;
    }
    if key.contains("品牌") || key.contains("型号") || key.contains("SKU码") {
        Some(NONE_TEXT)
    } else if key.contains("平台链接") {
        Some(NO_LINK_TEXT)
    } else {
        None
    }
}

fn fill_placeholders(record: &mut Record, filled: &mut Vec<String>) {
    for (key, value) in record.iter_mut() {
        if let Some(text) = placeholder_for(key, Some(&*value)) {
            *value = Value::String(text.to_string());
            filled.push(format!("{key}={text}"));
        }
    }
}

impl Rule for FillMissingValuesRule {
    fn name(&self) -> &str {
        "fill_missing_values"
    }

    fn apply(&self, mut record: Record) -> Result<Record, AppError> {
        let mut filled = Vec::new();
        fill_pieces_per_box(&mut record, &mut filled);
        fill_net_weight(&mut record, &mut filled);
        fill_placeholders(&mut record, &mut filled);
        if !filled.is_empty() {
            tracing::info!(filled = %filled.join(", "), "filled missing values");
        }
        Ok(record)
    }
}
