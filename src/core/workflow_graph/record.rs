//! Record representation shared by every rule.
//!
//! A record is one logical spreadsheet row: an ordered map from field name to a
//! dynamically typed JSON value. Rules may add, rename or remove keys freely.

use serde_json::{Map, Number, Value};

/// One row flowing through a pipeline.
pub type Record = Map<String, Value>;

/// Literal spreadsheet exports use in place of an empty cell.
const NULL_LITERAL: &str = "null";

/// Build a record from `(key, value)` pairs, keeping their order.
pub fn record_from<I, K>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// True for values a spreadsheet would show as an empty cell.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed.is_empty() || trimmed == NULL_LITERAL
        }
        _ => false,
    }
}

/// Blank values plus zero, `false` and empty containers.
pub fn is_falsy(value: Option<&Value>) -> bool {
    if is_blank(value) {
        return true;
    }
    match value {
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

/// Parse a numeric cell, accepting numbers and numeric strings.
pub fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == NULL_LITERAL {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Parse an integer cell; fractional numbers are truncated, fractional strings rejected.
pub fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Wrap a float, rounded to `places` decimals. Non-finite values become null.
pub fn rounded(value: f64, places: i32) -> Value {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    Number::from_f64(rounded)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
