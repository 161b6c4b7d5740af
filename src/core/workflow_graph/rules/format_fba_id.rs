use crate::core::error::AppError;
use crate::core::workflow_graph::record::{integer, Record};
use crate::core::workflow_graph::rule::Rule;
use regex::Regex;
use serde_json::Value;

const TOTAL_BOXES: &str = "总箱数";
/// Length of a bare shipment id such as `FBA15L4KXSK8`.
const SHIPMENT_ID_LEN: usize = 12;
const BOX_DIGITS: usize = 6;

/// Expands shorthand FBA box id ranges into `FIRST-LAST` form.
///
/// Accepted inputs:
/// - `FBA1915DRGZJU000001-U000002`
/// - `FBA193ZMDQGPU000001-10`
/// - `FBA15L4KXSK8U000001,FBA15L4KXSK8U000002`
/// - `FBA15L4KXSK8` together with a total box count
pub struct FormatFbaIdRule {
    trailing_number: Regex,
}

impl Default for FormatFbaIdRule {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatFbaIdRule {
    pub fn new() -> Self {
        Self {
            trailing_number: Regex::new(r"^(.*?)(\d+)$").expect("static regex"),
        }
    }

    /// Normalized id, or `None` when the input is already canonical or unrecognized.
    pub fn normalize(&self, id: &str, total_boxes: Option<i64>) -> Option<String> {
        if let Some(formatted) = u_separated(id) {
            return Some(formatted);
        }
        if let Some(formatted) = self.short_hyphen(id) {
            return Some(formatted);
        }
        if let Some(formatted) = comma_separated(id) {
            return Some(formatted);
        }
        bare_shipment_id(id, total_boxes)
    }

    fn short_hyphen(&self, id: &str) -> Option<String> {
        if id.contains("-U") {
            return None;
        }
        let (start, end) = split_exactly_two(id, "-")?;
        if !start.contains("FBA") || end.is_empty() || !end.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let captures = self.trailing_number.captures(start)?;
        let prefix = captures.get(1)?.as_str();
        let width = captures.get(2)?.as_str().len();
        Some(format!("{}-{}{}", start, prefix, zero_fill(end, width)))
    }
}

fn split_exactly_two<'a>(value: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    let mut parts = value.split(separator);
    let first = parts.next()?;
    let second = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

fn zero_fill(value: &str, width: usize) -> String {
    format!("{:0>width$}", value, width = width)
}

fn u_separated(id: &str) -> Option<String> {
    let (start, end) = split_exactly_two(id, "-U")?;
    let (base, _) = start.rsplit_once('U')?;
    Some(format!("{}-{}U{}", start, base, zero_fill(end, BOX_DIGITS)))
}

fn comma_separated(id: &str) -> Option<String> {
    if !id.contains(',') {
        return None;
    }
    let ids: Vec<&str> = id.split(',').map(str::trim).collect();
    let (first, last) = (ids.first()?, ids.last()?);
    Some(format!("{}-{}", first, last))
}

fn bare_shipment_id(id: &str, total_boxes: Option<i64>) -> Option<String> {
    if id.chars().count() != SHIPMENT_ID_LEN || !id.starts_with("FBA") {
        return None;
    }
    let boxes = total_boxes.filter(|boxes| *boxes > 0)?;
    Some(format!(
        "{id}U{first:0>width$}-{id}U{last:0>width$}",
        id = id,
        first = 1,
        last = boxes,
        width = BOX_DIGITS
    ))
}

/// First field whose name mentions both `FBA` and `箱号`.
fn fba_field(record: &Record) -> Option<String> {
    record
        .keys()
        .find(|key| key.contains("FBA") && key.contains("箱号"))
        .cloned()
}

fn total_boxes(record: &Record) -> Option<i64> {
    match record.get(TOTAL_BOXES) {
        Some(value) => integer(Some(value)),
        None => record
            .iter()
            .find(|(key, _)| key.contains("箱数") && key.contains('总'))
            .and_then(|(_, value)| integer(Some(value))),
    }
}

impl Rule for FormatFbaIdRule {
    fn name(&self) -> &str {
        "format_fba_id"
    }

    fn apply(&self, mut record: Record) -> Result<Record, AppError> {
        let Some(field) = fba_field(&record) else {
            return Ok(record);
        };
        let id = match record.get(&field) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Ok(record),
        };

        if let Some(formatted) = self.normalize(&id, total_boxes(&record)) {
            tracing::debug!(field = %field, from = %id, to = %formatted, "formatted FBA box id");
            record.insert(field, Value::String(formatted));
        } else if id.chars().count() == SHIPMENT_ID_LEN && id.starts_with("FBA") {
            tracing::warn!(field = %field, id = %id, "cannot expand FBA id without a total box count");
        }
        Ok(record)
    }
}
