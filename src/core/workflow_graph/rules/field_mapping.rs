//! Renames non-standard spreadsheet headers to the standard field set.
//!
//! Header names are first cleaned locally, then every name that is neither a
//! standard field nor cached is sent to a [`MappingBackend`] in one batch. A
//! transport-level backend failure trips a breaker that disables further calls
//! for the lifetime of the owning [`FieldMappingContext`].

use crate::core::error::AppError;
use crate::core::workflow_graph::record::Record;
use crate::core::workflow_graph::rule::Rule;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Target header names a mapping may produce.
pub const STANDARD_FIELDS: [&str; 31] = [
    "FBA箱号",
    "中文品名",
    "英文品名",
    "SKU码",
    "海关编码",
    "材质（中文）",
    "材质（英文）",
    "品牌",
    "品牌类型",
    "型号",
    "用途",
    "带电、磁",
    "总箱数",
    "单箱净重",
    "单箱毛重",
    "单箱个数",
    "产品总个数",
    "申报单价",
    "申报总价",
    "申报币种",
    "采购单价",
    "采购总价",
    "采购币种",
    "长 cm",
    "宽 cm",
    "高 cm",
    "亚马逊内部编号 REFERENCE ID（PO）",
    "仓库代码 AMAZON",
    "FBA仓库地址",
    "图片",
    "产品在平台链接",
];

const REMARK_MARKER: &str = "备注";
const PLEASE_PROVIDE_MARKER: &str = "：请提供";
const FULL_WIDTH_COLON: char = '：';
const EXPLANATION_WORDS: [&str; 4] = ["请提供", "默认", "单位", "说明"];

pub fn is_standard_field(name: &str) -> bool {
    STANDARD_FIELDS.contains(&name)
}

#[derive(Debug, Error)]
pub enum FieldMappingError {
    #[error("mapping backend timed out")]
    Timeout,
    #[error("mapping backend unreachable: {0}")]
    Transport(String),
    #[error("mapping backend returned status {0}")]
    Status(u16),
    #[error("mapping backend returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl FieldMappingError {
    /// Whether the failure should stop further backend calls.
    pub fn trips_breaker(&self) -> bool {
        !matches!(self, FieldMappingError::InvalidResponse(_))
    }
}

/// Suggests standard names for a batch of header names.
pub trait MappingBackend: Send + Sync {
    /// Returns `{original: suggested}` for the names it can map.
    fn map_fields(&self, fields: &[String]) -> Result<HashMap<String, String>, FieldMappingError>;
}

/// Parse a backend reply that may be wrapped in a markdown fence or doubled braces.
pub fn parse_mapping_response(content: &str) -> Result<HashMap<String, String>, FieldMappingError> {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    }
    if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body = body.trim();
    if body.starts_with("{{") && body.ends_with("}}") {
        body = &body[1..body.len() - 1];
    }

    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(body)
        .map_err(|err| FieldMappingError::InvalidResponse(err.to_string()))?;
    Ok(parsed
        .into_iter()
        .filter_map(|(original, mapped)| match mapped {
            serde_json::Value::String(mapped) => Some((original, mapped)),
            _ => None,
        })
        .collect())
}

/// Mapping cache and breaker shared by every record of one pipeline build.
#[derive(Debug, Default)]
pub struct FieldMappingContext {
    cache: Mutex<HashMap<String, String>>,
    backend_failed: AtomicBool,
}

impl FieldMappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend_failed(&self) -> bool {
        self.backend_failed.load(Ordering::Acquire)
    }

    pub fn cached(&self, field: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(field)
            .cloned()
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn remember(&self, original: &str, mapped: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(original.to_string(), mapped.to_string());
    }

    fn trip(&self) {
        self.backend_failed.store(true, Ordering::Release);
    }
}

/// Strip control characters and trailing annotations from a header name.
pub fn clean_field_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();

    let cleaned = if let Some((head, _)) = cleaned.split_once(REMARK_MARKER) {
        head.to_string()
    } else if let Some((head, _)) = cleaned.split_once(PLEASE_PROVIDE_MARKER) {
        head.to_string()
    } else {
        let mut parts = cleaned.split(FULL_WIDTH_COLON);
        let head = parts.next().unwrap_or_default();
        match parts.next() {
            Some(note) if EXPLANATION_WORDS.iter().any(|word| note.contains(word)) => head.to_string(),
            _ => cleaned.clone(),
        }
    };
    cleaned.trim().to_string()
}

pub struct FieldMappingRule {
    backend: Arc<dyn MappingBackend>,
    context: Arc<FieldMappingContext>,
}

impl FieldMappingRule {
    pub fn new(backend: Arc<dyn MappingBackend>, context: Arc<FieldMappingContext>) -> Self {
        Self { backend, context }
    }

    pub fn context(&self) -> &FieldMappingContext {
        &self.context
    }

    /// Resolve `{original: standard}` for the given cleaned header names.
    ///
    /// Every target is claimed at most once, and never when a field of that name
    /// already exists, so renaming cannot overwrite a column.
    fn resolve_names(&self, fields: &[String]) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        if self.context.backend_failed() {
            tracing::debug!("mapping backend failed earlier, skipping field mapping");
            return mapping;
        }

        let mut claimed: HashSet<String> = fields.iter().cloned().collect();
        let mut pending = Vec::new();
        for field in fields {
            if is_standard_field(field) {
                continue;
            }
            match self.context.cached(field) {
                Some(mapped) => {
                    if claim(&mut claimed, field, &mapped) {
                        mapping.insert(field.clone(), mapped);
                    }
                }
                None => pending.push(field.clone()),
            }
        }
        if pending.is_empty() {
            return mapping;
        }

        tracing::info!(fields = pending.len(), "requesting field mapping");
        let mut suggestions = match self.backend.map_fields(&pending) {
            Ok(suggestions) => suggestions,
            Err(err) => {
                if err.trips_breaker() {
                    self.context.trip();
                }
                tracing::warn!(error = %err, "field mapping request failed");
                return mapping;
            }
        };

        // Header order decides which of several claimants wins a target.
        for original in pending {
            let Some(mapped) = suggestions.remove(&original) else {
                continue;
            };
            if !is_standard_field(&mapped) || !claim(&mut claimed, &original, &mapped) {
                continue;
            }
            tracing::debug!(from = %original, to = %mapped, "mapped field");
            self.context.remember(&original, &mapped);
            mapping.insert(original, mapped);
        }
        mapping
    }
}

/// Reserve `target` for `original`; false when another field already holds it.
fn claim(claimed: &mut HashSet<String>, original: &str, target: &str) -> bool {
    if claimed.insert(target.to_string()) {
        return true;
    }
    tracing::warn!(from = %original, to = %target, "mapping target already taken, keeping original name");
    false
}

/// Clean every key unless the cleaned name would collide with another column.
fn clean_keys(record: Record) -> Record {
    let originals: HashSet<String> = record.keys().cloned().collect();
    let mut cleaned = Record::new();
    for (key, value) in record {
        let name = clean_field_name(&key);
        if name != key && (originals.contains(&name) || cleaned.contains_key(&name)) {
            tracing::warn!(field = %key, cleaned = %name, "cleaned header collides with another column, keeping it as is");
            cleaned.insert(key, value);
        } else {
            cleaned.insert(name, value);
        }
    }
    cleaned
}

impl Rule for FieldMappingRule {
    fn name(&self) -> &str {
        "field_mapping_llm"
    }

    fn apply(&self, record: Record) -> Result<Record, AppError> {
        let cleaned = clean_keys(record);
        let fields: Vec<String> = cleaned.keys().cloned().collect();
        let mapping = self.resolve_names(&fields);

        let mut renamed = 0usize;
        let mapped: Record = cleaned
            .into_iter()
            .map(|(key, value)| match mapping.get(&key) {
                Some(target) if target != &key => {
                    renamed += 1;
                    (target.clone(), value)
                }
                _ => (key, value),
            })
            .collect();
        tracing::info!(fields = fields.len(), renamed, "field mapping completed");
        Ok(mapped)
    }
}
