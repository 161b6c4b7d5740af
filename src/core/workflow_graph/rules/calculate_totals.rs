use crate::core::error::AppError;
use crate::core::workflow_graph::record::{numeric, rounded, Record};
use crate::core::workflow_graph::rule::Rule;
use serde_json::{json, Value};

pub const TOTAL_BOXES: &str = "总箱数";
pub const PIECES_PER_BOX: &str = "单箱个数";
/// Header variant produced by cells with a manual line break.
pub const PIECES_PER_BOX_WRAPPED: &str = "单箱\n个数";
pub const TOTAL_PIECES: &str = "产品总个数";
pub const DECLARED_UNIT_PRICE: &str = "申报单价";
pub const DECLARED_TOTAL_PRICE: &str = "申报总价";
pub const PURCHASE_UNIT_PRICE: &str = "采购单价";
pub const PURCHASE_TOTAL_PRICE: &str = "采购总价";

/// Derives piece and price totals:
/// `产品总个数 = 总箱数 × 单箱个数`, then declared and purchase totals from it.
pub struct CalculateTotalsRule;

impl Default for CalculateTotalsRule {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculateTotalsRule {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for CalculateTotalsRule {
    fn name(&self) -> &str {
        "calculate_totals"
    }

    fn apply(&self, mut record: Record) -> Result<Record, AppError> {
        let boxes = numeric(record.get(TOTAL_BOXES));
        let per_box = numeric(record.get(PIECES_PER_BOX))
            .or_else(|| numeric(record.get(PIECES_PER_BOX_WRAPPED)));
        if let (Some(boxes), Some(per_box)) = (boxes, per_box) {
            if boxes > 0.0 && per_box > 0.0 {
                let total = (boxes * per_box).trunc() as i64;
                record.insert(TOTAL_PIECES.to_string(), json!(total));
                tracing::debug!(boxes, per_box, total, "computed total pieces");
            }
        }

        let Some(total_pieces) = numeric(record.get(TOTAL_PIECES)) else {
            return Ok(record);
        };

        for (unit_key, total_key) in [
            (DECLARED_UNIT_PRICE, DECLARED_TOTAL_PRICE),
            (PURCHASE_UNIT_PRICE, PURCHASE_TOTAL_PRICE),
        ] {
            if let Some(unit_price) = numeric(record.get(unit_key)) {
                let total: Value = rounded(unit_price * total_pieces, 4);
                tracing::debug!(field = total_key, unit_price, total_pieces, "computed total price");
                record.insert(total_key.to_string(), total);
            }
        }
        Ok(record)
    }
}
