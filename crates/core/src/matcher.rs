//! Header normalization and alias-based field matching.
//!
//! This is a substring heuristic, not similarity scoring. False positives are
//! expected and get corrected when the user reviews the proposed mapping.

use crate::fields::FieldDescriptor;

// ── Alias table ──────────────────────────────────────────────────────

/// Bilingual aliases per field key, already in normalized form.
///
/// Declaration order is the tie-break: when several fields could claim a
/// header, the entry listed first wins. Compound fields (`property_name`,
/// `unit_name`, tenant contact fields) sit above the generic `name` for that
/// reason. Accented letters are dropped by [`normalize`], so aliases carry
/// both the plain spelling and the accent-stripped one where they differ.
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("property_name", &["propiedad", "property", "edificio", "building"]),
    ("unit_name", &["unidad", "unit", "departamento", "depto"]),
    ("tenant_email", &["email", "correo", "mail"]),
    ("tenant_phone_e164", &["telefono", "telfono", "phone", "celular", "whatsapp"]),
    ("tenant_full_name", &["inquilino", "tenant", "arrendatario", "fullname", "nombrecompleto"]),
    ("name", &["nombre", "name", "propiedad", "property"]),
    ("code", &["codigo", "cdigo", "code", "ref"]),
    ("address_line1", &["direcci", "address", "calle", "street"]),
    ("city", &["ciudad", "city", "localidad"]),
    ("latitude", &["latitud", "latitude", "lat"]),
    ("longitude", &["longitud", "longitude", "lng", "lon"]),
    ("max_guests", &["huespedes", "huspedes", "guests", "capacidad", "capacity"]),
    ("bedrooms", &["dormitorios", "habitaciones", "bedrooms", "cuartos"]),
    ("bathrooms", &["banos", "baos", "bathrooms", "bath"]),
    ("square_meters", &["m2", "metros", "superficie", "area", "sqm"]),
    ("is_active", &["activo", "active"]),
    ("starts_on", &["inicio", "start", "desde"]),
    ("ends_on", &["fin", "end", "hasta", "until"]),
    ("monthly_rent", &["alquiler", "renta", "rent", "mensual", "monthly"]),
    ("security_deposit", &["deposito", "depsito", "deposit", "garantia", "garanta"]),
    ("service_fee_flat", &["tarifa", "servicio", "fee"]),
    ("currency", &["moneda", "currency", "divisa"]),
    ("lease_status", &["estado", "status"]),
    ("notes", &["notas", "notes", "observaciones", "comentarios"]),
];

// ── Pure Functions ───────────────────────────────────────────────────

/// Lowercase, trim, and drop every character outside `[a-z0-9]`.
///
/// Total and idempotent; empty input yields an empty string.
pub fn normalize(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Propose a target field for a raw header, or `None` for "skip".
///
/// Rules, first hit wins:
/// 1. the normalized header equals a field's normalized key or label;
/// 2. an alias of a field present in `fields` is a substring of the
///    normalized header, scanning [`FIELD_ALIASES`] in declaration order.
pub fn match_field(header: &str, fields: &[FieldDescriptor]) -> Option<&'static str> {
    let normalized = normalize(header);
    if normalized.is_empty() {
        return None;
    }

    if let Some(field) = fields
        .iter()
        .find(|f| normalize(f.key) == normalized || normalize(f.label) == normalized)
    {
        return Some(field.key);
    }

    FIELD_ALIASES
        .iter()
        .filter_map(|(key, aliases)| {
            fields
                .iter()
                .find(|f| f.key == *key)
                .map(|f| (f.key, *aliases))
        })
        .find(|(_, aliases)| aliases.iter().any(|alias| normalized.contains(alias)))
        .map(|(key, _)| key)
}

// ── Tests ────────────────────────────────────────────────────────────
