//! Spreadsheet decoding: delimited text and workbooks, both reduced to a
//! header list plus string-valued rows.

pub mod delimited;
pub mod workbook;

use std::collections::HashSet;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::DecodedRow;

pub use delimited::decode_delimited;
pub use workbook::{decode_sheet, decode_workbook, list_sheets, WorkbookDecode};

/// Extensions read as delimited text.
pub const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Extensions read as workbooks.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Decoder output shared by both input paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedSheet {
    /// Column headers in file order, unique after de-duplication.
    pub headers: Vec<String>,
    pub rows: Vec<DecodedRow>,
}

/// Which decoder an uploaded file goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// CSV/TXT with a sniffed delimiter, or TSV when `tab_separated`.
    Delimited { tab_separated: bool },
    Workbook,
}

/// Pick the decoder from the file name's extension (case-insensitive).
pub fn detect_format(file_name: &str) -> Result<FileFormat, CoreError> {
    let ext = match file_name.rfind('.') {
        Some(pos) => file_name[pos + 1..].to_lowercase(),
        None => String::new(),
    };

    if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(FileFormat::Delimited {
            tab_separated: ext == "tsv",
        })
    } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        Ok(FileFormat::Workbook)
    } else {
        Err(CoreError::UnsupportedFormat(format!(
            "'{file_name}'. Supported: {}, {}",
            DELIMITED_EXTENSIONS.join(", "),
            WORKBOOK_EXTENSIONS.join(", ")
        )))
    }
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Trim headers, name blank ones `Column N`, and suffix repeats with `_1`,
/// `_2`, ... so every row key is unique.
pub(crate) fn finalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = match h.trim() {
                "" => format!("Column {}", i + 1),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Zip raw cell rows with the headers, dropping rows with no content.
/// Short rows are padded with empty strings; surplus cells are ignored.
pub(crate) fn build_rows(headers: &[String], raw_rows: Vec<Vec<String>>) -> Vec<DecodedRow> {
    raw_rows
        .into_iter()
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|mut cells| {
            cells.resize(headers.len(), String::new());
            headers.iter().cloned().zip(cells).collect()
        })
        .collect()
}
