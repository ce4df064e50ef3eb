//! Row transformation: decoded rows to typed creation payloads.
//!
//! Coercion never fails a row. Unparseable numbers and blank booleans become
//! absent fields. A non-blank reference that matches nothing becomes an
//! empty-string id so the backend rejects that row instead of creating a
//! record with the link silently dropped.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::fields::ImportMode;
use crate::mapping::ColumnMapping;
use crate::types::{DecodedRow, RecordId};

/// Lease currency when the mapped column is blank.
pub const DEFAULT_LEASE_CURRENCY: &str = "PYG";

/// Tokens read as `false` by [`parse_boolean`] (compared lowercase).
pub const FALSE_TOKENS: &[&str] = &["false", "0", "no", "inactivo"];

/// Mapped cell text keyed by target field.
pub type RawFields = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

/// An already-fetched record a free-text column can refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Owning property for unit entries.
    #[serde(default, alias = "property_id")]
    pub parent_id: Option<RecordId>,
}

/// Resolve a name/code cell against a lookup table.
///
/// Case-insensitive name equality first, then case-insensitive code
/// equality, then exact id equality. Blank input never resolves.
pub fn resolve_reference<'a>(value: &str, table: &'a [LookupEntry]) -> Option<&'a LookupEntry> {
    let needle = value.trim();
    if needle.is_empty() {
        return None;
    }
    let lowered = needle.to_lowercase();

    table
        .iter()
        .find(|e| e.name.trim().to_lowercase() == lowered)
        .or_else(|| {
            table.iter().find(|e| {
                e.code
                    .as_deref()
                    .is_some_and(|c| c.trim().to_lowercase() == lowered)
            })
        })
        .or_else(|| table.iter().find(|e| e.id == needle))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitPayload {
    /// Empty when the property cell matched nothing; `None` when blank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<RecordId>,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_guests: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeasePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<RecordId>,
    pub tenant_full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_phone_e164: Option<String>,
    pub starts_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_rent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_deposit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_fee_flat: Option<f64>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A creation request body for one row, shaped by the import mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImportPayload {
    Property(PropertyPayload),
    Unit(UnitPayload),
    Lease(LeasePayload),
}

impl ImportPayload {
    pub fn mode(&self) -> ImportMode {
        match self {
            Self::Property(_) => ImportMode::Properties,
            Self::Unit(_) => ImportMode::Units,
            Self::Lease(_) => ImportMode::Leases,
        }
    }
}

// ---------------------------------------------------------------------------
// Transformation
// ---------------------------------------------------------------------------

/// Apply a mapping to one row. Unmapped columns are dropped; a mapped header
/// missing from the row yields an empty string.
pub fn transform_row(row: &DecodedRow, mappings: &[ColumnMapping]) -> RawFields {
    mappings
        .iter()
        .filter_map(|m| {
            m.target().map(|key| {
                let value = row.get(&m.source_header).cloned().unwrap_or_default();
                (key.to_string(), value)
            })
        })
        .collect()
}

/// Convert mapped fields into the mode's typed payload.
///
/// `lookup` is the property table for units and the unit table for leases;
/// it is ignored for properties.
pub fn build_payload(mode: ImportMode, raw: &RawFields, lookup: &[LookupEntry]) -> ImportPayload {
    match mode {
        ImportMode::Properties => ImportPayload::Property(PropertyPayload {
            name: text(raw, "name").unwrap_or_default(),
            code: text(raw, "code"),
            address_line1: text(raw, "address_line1"),
            city: text(raw, "city"),
            latitude: number(raw, "latitude"),
            longitude: number(raw, "longitude"),
        }),
        ImportMode::Units => {
            let (_, property_id) = reference(raw, "property_name", lookup);
            ImportPayload::Unit(UnitPayload {
                property_id,
                code: text(raw, "code").unwrap_or_default(),
                name: text(raw, "name").unwrap_or_default(),
                max_guests: integer(raw, "max_guests"),
                bedrooms: integer(raw, "bedrooms"),
                bathrooms: number(raw, "bathrooms"),
                square_meters: number(raw, "square_meters"),
                currency: text(raw, "currency").map(|c| c.to_uppercase()),
                is_active: raw.get("is_active").and_then(|v| parse_boolean(v)),
            })
        }
        ImportMode::Leases => {
            let (unit, unit_id) = reference(raw, "unit_name", lookup);
            ImportPayload::Lease(LeasePayload {
                unit_id,
                property_id: unit.and_then(|u| u.parent_id.clone()),
                tenant_full_name: text(raw, "tenant_full_name").unwrap_or_default(),
                tenant_email: text(raw, "tenant_email"),
                tenant_phone_e164: text(raw, "tenant_phone_e164"),
                starts_on: date(raw, "starts_on").unwrap_or_default(),
                ends_on: date(raw, "ends_on"),
                monthly_rent: number(raw, "monthly_rent"),
                security_deposit: number(raw, "security_deposit"),
                service_fee_flat: number(raw, "service_fee_flat"),
                currency: text(raw, "currency")
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| DEFAULT_LEASE_CURRENCY.to_string()),
                lease_status: text(raw, "lease_status").map(|s| s.to_lowercase()),
                notes: text(raw, "notes"),
            })
        }
    }
}

/// Transform every row, preserving row order and count.
pub fn transform_rows(
    mode: ImportMode,
    rows: &[DecodedRow],
    mappings: &[ColumnMapping],
    lookup: &[LookupEntry],
) -> Vec<ImportPayload> {
    rows.iter()
        .map(|row| build_payload(mode, &transform_row(row, mappings), lookup))
        .collect()
}

// ── Coercions ────────────────────────────────────────────────────────

/// Parse a finite number; blank or non-numeric text is `None`, never zero.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a whole number. Fractional input is `None`.
pub fn parse_integer(value: &str) -> Option<i64> {
    parse_number(value)
        .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
        .map(|n| n as i64)
}

/// `false`, `0`, `no`, `inactivo` (any case) are false; other non-blank
/// text is true; blank is `None`.
pub fn parse_boolean(value: &str) -> Option<bool> {
    let token = value.trim().to_lowercase();
    if token.is_empty() {
        None
    } else {
        Some(!FALSE_TOKENS.contains(&token.as_str()))
    }
}

/// Normalize a date cell to `YYYY-MM-DD`.
///
/// Accepts ISO dates, ISO-8601 timestamps (as workbook decoding produces),
/// and `DD/MM/YYYY` or `DD-MM-YYYY`. Anything else passes through trimmed
/// for the backend to judge; blank is `None`.
pub fn parse_date(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y").ok())
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%d-%m-%Y").ok());

    Some(match parsed {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => trimmed.to_string(),
    })
}

/// Resolve a reference cell. Blank is `(None, None)`; a non-blank value
/// that matches nothing is `(None, Some(""))`.
fn reference<'a>(
    raw: &RawFields,
    key: &str,
    lookup: &'a [LookupEntry],
) -> (Option<&'a LookupEntry>, Option<RecordId>) {
    let Some(value) = raw.get(key).filter(|v| !v.trim().is_empty()) else {
        return (None, None);
    };
    match resolve_reference(value, lookup) {
        Some(entry) => (Some(entry), Some(entry.id.clone())),
        None => (None, Some(String::new())),
    }
}

fn text(raw: &RawFields, key: &str) -> Option<String> {
    raw.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn number(raw: &RawFields, key: &str) -> Option<f64> {
    raw.get(key).and_then(|v| parse_number(v))
}

fn integer(raw: &RawFields, key: &str) -> Option<i64> {
    raw.get(key).and_then(|v| parse_integer(v))
}

fn date(raw: &RawFields, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| parse_date(v))
}

// ── Tests ────────────────────────────────────────────────────────────
