use std::collections::HashMap;

/// Backend record identifiers are opaque strings (UUIDs on the wire).
pub type RecordId = String;

/// One decoded data row: source header (exact, case-sensitive) to cell text.
/// Blank cells are empty strings.
pub type DecodedRow = HashMap<String, String>;
