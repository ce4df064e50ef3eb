//! CSV / TSV decoding via the `csv` crate.

use std::borrow::Cow;

use crate::error::CoreError;

use super::{build_rows, finalize_headers, DecodedSheet};

/// Delimiters considered when sniffing, in tie-break order.
const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode delimited text. The first non-blank record is the header row.
///
/// `delimiter` forces a separator; `None` sniffs it from the header line.
/// Zero data rows after the header is [`CoreError::EmptyFile`].
pub fn decode_delimited(bytes: &[u8], delimiter: Option<u8>) -> Result<DecodedSheet, CoreError> {
    let text = decode_text(bytes);
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&text));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| CoreError::Parse(e.to_string()))?;
        records.push(record.iter().map(String::from).collect());
    }

    let mut records = records
        .into_iter()
        .skip_while(|cells| cells.iter().all(|c| c.trim().is_empty()));

    let headers = match records.next() {
        Some(raw) => finalize_headers(raw),
        None => return Err(CoreError::EmptyFile),
    };
    let rows = build_rows(&headers, records.collect());
    if rows.is_empty() {
        return Err(CoreError::EmptyFile);
    }

    tracing::debug!(
        columns = headers.len(),
        rows = rows.len(),
        delimiter = %(delimiter as char).escape_default(),
        "Decoded delimited file"
    );
    Ok(DecodedSheet { headers, rows })
}

/// Pick the candidate delimiter that occurs most often in the first line.
/// Falls back to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, first_line.bytes().filter(|b| *b == d).count()))
        .fold((b',', 0), |best, (d, count)| if count > best.1 { (d, count) } else { best })
        .0
}

/// Strip a UTF-8 BOM; read anything that isn't UTF-8 as Latin-1.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}
