//! Mapping validation: every required field must be mapped before submit.

use crate::fields::FieldDescriptor;
use crate::mapping::ColumnMapping;

/// Return one message per required field that no column maps to, in field
/// order. An empty list means the mapping can be submitted.
pub fn validate_mappings(mappings: &[ColumnMapping], fields: &[FieldDescriptor]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| !mappings.iter().any(|m| m.target() == Some(f.key)))
        .map(|f| format!("Required field \"{}\" is not mapped to any column", f.label))
        .collect()
}
