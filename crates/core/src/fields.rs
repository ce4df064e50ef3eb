//! Field schema registry: the target fields each import mode accepts.
//!
//! These are compile-time tables. The matcher, the mapping validator, and
//! the row transformer all read from here; nothing mutates them.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Import mode
// ---------------------------------------------------------------------------

pub const MODE_PROPERTIES: &str = "properties";
pub const MODE_UNITS: &str = "units";
pub const MODE_LEASES: &str = "leases";

/// All valid import mode strings.
pub const VALID_MODES: &[&str] = &[MODE_PROPERTIES, MODE_UNITS, MODE_LEASES];

/// Which entity type an import session creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Properties,
    Units,
    Leases,
}

impl ImportMode {
    /// Parse a mode from its wire value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            MODE_PROPERTIES => Ok(Self::Properties),
            MODE_UNITS => Ok(Self::Units),
            MODE_LEASES => Ok(Self::Leases),
            other => Err(format!(
                "Invalid import mode '{other}'. Must be one of: {}",
                VALID_MODES.join(", ")
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Properties => MODE_PROPERTIES,
            Self::Units => MODE_UNITS,
            Self::Leases => MODE_LEASES,
        }
    }

    /// Target fields for this mode, in display order.
    pub fn fields(&self) -> &'static [FieldDescriptor] {
        match self {
            Self::Properties => PROPERTY_FIELDS,
            Self::Units => UNIT_FIELDS,
            Self::Leases => LEASE_FIELDS,
        }
    }
}

impl std::fmt::Display for ImportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field descriptor
// ---------------------------------------------------------------------------

/// How the row transformer coerces a field's cell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Boolean,
    Date,
    /// Free-text name/code resolved against a lookup table.
    Reference,
}

/// A single importable target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Machine key, unique within a mode (matches the payload key).
    pub key: &'static str,
    /// Bilingual display label.
    pub label: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

const fn field(
    key: &'static str,
    label: &'static str,
    required: bool,
    kind: FieldKind,
) -> FieldDescriptor {
    FieldDescriptor {
        key,
        label,
        required,
        kind,
    }
}

/// Find a descriptor by key within a field list.
pub fn find_field<'a>(fields: &'a [FieldDescriptor], key: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.key == key)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub const PROPERTY_FIELDS: &[FieldDescriptor] = &[
    field("name", "Nombre / Name", true, FieldKind::Text),
    field("code", "Código / Code", false, FieldKind::Text),
    field("address_line1", "Dirección / Address", false, FieldKind::Text),
    field("city", "Ciudad / City", false, FieldKind::Text),
    field("latitude", "Latitud / Latitude", false, FieldKind::Number),
    field("longitude", "Longitud / Longitude", false, FieldKind::Number),
];

pub const UNIT_FIELDS: &[FieldDescriptor] = &[
    field("property_name", "Propiedad / Property", true, FieldKind::Reference),
    field("code", "Código / Code", true, FieldKind::Text),
    field("name", "Nombre / Name", true, FieldKind::Text),
    field("max_guests", "Huéspedes máx. / Max guests", false, FieldKind::Integer),
    field("bedrooms", "Dormitorios / Bedrooms", false, FieldKind::Integer),
    field("bathrooms", "Baños / Bathrooms", false, FieldKind::Number),
    field("square_meters", "Metros cuadrados / Square meters", false, FieldKind::Number),
    field("currency", "Moneda / Currency", false, FieldKind::Text),
    field("is_active", "Activo / Active", false, FieldKind::Boolean),
];

pub const LEASE_FIELDS: &[FieldDescriptor] = &[
    field("unit_name", "Unidad / Unit", false, FieldKind::Reference),
    field("tenant_full_name", "Inquilino / Tenant name", true, FieldKind::Text),
    field("tenant_email", "Email del inquilino / Tenant email", false, FieldKind::Text),
    field("tenant_phone_e164", "Teléfono / Phone", false, FieldKind::Text),
    field("starts_on", "Fecha de inicio / Start date", true, FieldKind::Date),
    field("ends_on", "Fecha de fin / End date", false, FieldKind::Date),
    field("monthly_rent", "Alquiler mensual / Monthly rent", true, FieldKind::Number),
    field("security_deposit", "Depósito / Security deposit", false, FieldKind::Number),
    field("service_fee_flat", "Tarifa de servicio / Service fee", false, FieldKind::Number),
    field("currency", "Moneda / Currency", false, FieldKind::Text),
    field("lease_status", "Estado / Status", false, FieldKind::Text),
    field("notes", "Notas / Notes", false, FieldKind::Text),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique_per_mode() {
        for mode in [ImportMode::Properties, ImportMode::Units, ImportMode::Leases] {
            let keys: HashSet<_> = mode.fields().iter().map(|f| f.key).collect();
            assert_eq!(keys.len(), mode.fields().len(), "mode: {mode}");
        }
    }

    #[test]
    fn every_mode_has_a_required_field() {
        for mode in [ImportMode::Properties, ImportMode::Units, ImportMode::Leases] {
            assert!(mode.fields().iter().any(|f| f.required), "mode: {mode}");
        }
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(ImportMode::from_str_value("Units"), Ok(ImportMode::Units));
        assert_eq!(
            ImportMode::from_str_value(" leases "),
            Ok(ImportMode::Leases)
        );
        assert!(ImportMode::from_str_value("tasks").is_err());
    }

    #[test]
    fn find_field_by_key() {
        let f = find_field(UNIT_FIELDS, "is_active").unwrap();
        assert_eq!(f.kind, FieldKind::Boolean);
        assert!(find_field(PROPERTY_FIELDS, "is_active").is_none());
    }
}
