//! Column-to-field mapping: automatic proposal and user edits.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fields::{find_field, FieldDescriptor};
use crate::matcher::match_field;

/// Association between one spreadsheet column and one target field.
///
/// `target_field_key == None` means the column is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source_header: String,
    #[serde(default)]
    pub target_field_key: Option<String>,
}

impl ColumnMapping {
    pub fn skipped(source_header: impl Into<String>) -> Self {
        Self {
            source_header: source_header.into(),
            target_field_key: None,
        }
    }

    pub fn mapped(source_header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source_header: source_header.into(),
            target_field_key: Some(key.into()),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target_field_key.as_deref()
    }
}

/// Propose a mapping for every header, in file column order.
///
/// The first header that matches a field claims it; later headers matching
/// the same field are left unmapped, regardless of how strong their match is.
pub fn auto_detect_mappings(headers: &[String], fields: &[FieldDescriptor]) -> Vec<ColumnMapping> {
    let mut claimed: HashSet<&'static str> = HashSet::new();

    headers
        .iter()
        .map(|header| match match_field(header, fields) {
            Some(key) if claimed.insert(key) => ColumnMapping::mapped(header.as_str(), key),
            _ => ColumnMapping::skipped(header.as_str()),
        })
        .collect()
}

/// Point `source_header` at `target` (or skip it when `None`).
///
/// A target already held by another column moves to this one and the other
/// column becomes skipped, so keys stay unique across the list.
pub fn assign_target(
    mappings: &mut [ColumnMapping],
    fields: &[FieldDescriptor],
    source_header: &str,
    target: Option<&str>,
) -> Result<(), CoreError> {
    let target = target.map(str::trim).filter(|t| !t.is_empty());
    if let Some(key) = target {
        if find_field(fields, key).is_none() {
            return Err(CoreError::Validation(format!("Unknown target field '{key}'")));
        }
    }

    let index = mappings
        .iter()
        .position(|m| m.source_header == source_header)
        .ok_or_else(|| {
            CoreError::Validation(format!("Unknown source column '{source_header}'"))
        })?;

    if let Some(key) = target {
        for (i, other) in mappings.iter_mut().enumerate() {
            if i != index && other.target() == Some(key) {
                other.target_field_key = None;
            }
        }
    }
    mappings[index].target_field_key = target.map(String::from);
    Ok(())
}

/// Replace the whole mapping list after checking it lines up with the file.
///
/// The incoming list must name exactly the decoded headers in the same order
/// and must not reuse a target key.
pub fn replace_mappings(
    headers: &[String],
    fields: &[FieldDescriptor],
    incoming: Vec<ColumnMapping>,
) -> Result<Vec<ColumnMapping>, CoreError> {
    if incoming.len() != headers.len()
        || incoming
            .iter()
            .zip(headers)
            .any(|(m, h)| &m.source_header != h)
    {
        return Err(CoreError::Validation(
            "Mappings must list every file column in file order".to_string(),
        ));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(incoming.len());
    for mut mapping in incoming {
        mapping.target_field_key = mapping
            .target_field_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(key) = mapping.target() {
            if find_field(fields, key).is_none() {
                return Err(CoreError::Validation(format!("Unknown target field '{key}'")));
            }
            if !seen.insert(key.to_string()) {
                return Err(CoreError::Validation(format!(
                    "Target field '{key}' is mapped more than once"
                )));
            }
        }
        result.push(mapping);
    }
    Ok(result)
}
