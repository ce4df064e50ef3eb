//! Excel / ODS workbook decoding via `calamine`.
//!
//! Workbooks with more than one sheet are never decoded implicitly: the
//! caller gets the sheet names back and must choose one by 1-based index.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};

use crate::error::CoreError;

use super::{build_rows, finalize_headers, DecodedSheet};

/// OLE compound-file signature. Encrypted OOXML workbooks are stored in one.
const CFB_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Name of the stream holding an encrypted OOXML package, as it appears in
/// the compound-file directory (UTF-16LE, no terminator).
const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

/// Result of opening a workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkbookDecode {
    /// More than one sheet: decoding paused until the caller picks one.
    SheetSelection(Vec<String>),
    /// Exactly one sheet, already decoded.
    Decoded {
        sheet_name: String,
        sheet: DecodedSheet,
    },
}

/// Enumerate sheet names in workbook order.
pub fn list_sheets(bytes: &[u8]) -> Result<Vec<String>, CoreError> {
    Ok(open(bytes)?.sheet_names())
}

/// Open a workbook, decoding it directly only when it has a single sheet.
pub fn decode_workbook(bytes: &[u8]) -> Result<WorkbookDecode, CoreError> {
    let mut workbook = open(bytes)?;
    let names = workbook.sheet_names();
    match names.len() {
        0 => Err(CoreError::EmptyFile),
        1 => {
            let sheet_name = names[0].clone();
            let sheet = read_sheet(&mut workbook, &sheet_name)?;
            Ok(WorkbookDecode::Decoded { sheet_name, sheet })
        }
        count => {
            tracing::debug!(sheets = count, "Workbook needs a sheet selection");
            Ok(WorkbookDecode::SheetSelection(names))
        }
    }
}

/// Decode one sheet chosen by 1-based index.
pub fn decode_sheet(bytes: &[u8], sheet_number: usize) -> Result<DecodedSheet, CoreError> {
    let mut workbook = open(bytes)?;
    let names = workbook.sheet_names();
    let sheet_name = sheet_number
        .checked_sub(1)
        .and_then(|i| names.get(i))
        .cloned()
        .ok_or(CoreError::SheetOutOfRange {
            index: sheet_number,
            count: names.len(),
        })?;
    read_sheet(&mut workbook, &sheet_name)
}

// ── Private helpers ──────────────────────────────────────────────────

fn open(bytes: &[u8]) -> Result<Sheets<Cursor<&[u8]>>, CoreError> {
    if is_encrypted_package(bytes) {
        return Err(CoreError::PasswordProtected);
    }
    open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("password") || lower.contains("encrypt") {
            CoreError::PasswordProtected
        } else {
            CoreError::Parse(message)
        }
    })
}

fn read_sheet(
    workbook: &mut Sheets<Cursor<&[u8]>>,
    sheet_name: &str,
) -> Result<DecodedSheet, CoreError> {
    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| CoreError::Parse(e.to_string()))?;

    let sheet = range_to_sheet(&range);
    if sheet.rows.is_empty() {
        return Err(CoreError::EmptySheet(sheet_name.to_string()));
    }
    tracing::debug!(
        sheet = sheet_name,
        columns = sheet.headers.len(),
        rows = sheet.rows.len(),
        "Decoded worksheet"
    );
    Ok(sheet)
}

fn range_to_sheet(range: &Range<Data>) -> DecodedSheet {
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .skip_while(|cells| cells.iter().all(|c| c.trim().is_empty()));

    let Some(raw_headers) = rows.next() else {
        return DecodedSheet::default();
    };
    let headers = finalize_headers(raw_headers);
    let rows = build_rows(&headers, rows.collect());
    DecodedSheet { headers, rows }
}

/// Render a cell as text: dates as ISO-8601 UTC timestamps, booleans as
/// `true`/`false`, whole floats without a fractional part, blanks and cell
/// errors as empty strings.
pub(crate) fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => naive.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// An OLE container holding an `EncryptedPackage` stream is a
/// password-protected OOXML file.
fn is_encrypted_package(bytes: &[u8]) -> bool {
    if !bytes.starts_with(CFB_SIGNATURE) {
        return false;
    }
    let needle: Vec<u8> = ENCRYPTED_PACKAGE_STREAM
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    bytes.windows(needle.len()).any(|w| w == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_xlsxwriter::{Format, Workbook};

    fn workbook_bytes(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    worksheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn single_sheet_decodes_immediately() {
        let bytes = workbook_bytes(&[(
            "Props",
            vec![vec!["name", "code"], vec!["Casa Azul", "CA-1"]],
        )]);
        let decoded = decode_workbook(&bytes).unwrap();
        assert_matches!(decoded, WorkbookDecode::Decoded { sheet_name, sheet } => {
            assert_eq!(sheet_name, "Props");
            assert_eq!(sheet.headers, vec!["name", "code"]);
            assert_eq!(sheet.rows[0]["name"], "Casa Azul");
        });
    }

    #[test]
    fn multi_sheet_pauses_with_names() {
        let bytes = workbook_bytes(&[
            ("One", vec![vec!["name"], vec!["A"]]),
            ("Two", vec![vec!["name"], vec!["B"]]),
            ("Three", vec![vec!["name"], vec!["C"]]),
        ]);
        let decoded = decode_workbook(&bytes).unwrap();
        assert_eq!(
            decoded,
            WorkbookDecode::SheetSelection(vec!["One".into(), "Two".into(), "Three".into()])
        );

        let sheet = decode_sheet(&bytes, 2).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0]["name"], "B");
    }

    #[test]
    fn sheet_index_is_one_based_and_bounded() {
        let bytes = workbook_bytes(&[
            ("One", vec![vec!["name"], vec!["A"]]),
            ("Two", vec![vec!["name"], vec!["B"]]),
        ]);
        assert_matches!(
            decode_sheet(&bytes, 0),
            Err(CoreError::SheetOutOfRange { index: 0, count: 2 })
        );
        assert_matches!(
            decode_sheet(&bytes, 3),
            Err(CoreError::SheetOutOfRange { index: 3, count: 2 })
        );
    }

    #[test]
    fn header_only_sheet_is_empty_sheet() {
        let bytes = workbook_bytes(&[("Solo", vec![vec!["name", "code"]])]);
        assert_matches!(decode_workbook(&bytes), Err(CoreError::EmptySheet(name)) if name == "Solo");
    }

    #[test]
    fn typed_cells_become_strings() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let date = rust_xlsxwriter::ExcelDateTime::from_ymd(2024, 3, 1).unwrap();
        worksheet.write_string(0, 0, "bedrooms").unwrap();
        worksheet.write_string(0, 1, "is_active").unwrap();
        worksheet.write_string(0, 2, "starts_on").unwrap();
        worksheet.write_string(0, 3, "bathrooms").unwrap();
        worksheet.write_number(1, 0, 3.0).unwrap();
        worksheet.write_boolean(1, 1, false).unwrap();
        worksheet
            .write_datetime_with_format(1, 2, &date, &date_format)
            .unwrap();
        worksheet.write_number(1, 3, 1.5).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = decode_sheet(&bytes, 1).unwrap();
        let row = &sheet.rows[0];
        assert_eq!(row["bedrooms"], "3");
        assert_eq!(row["is_active"], "false");
        assert_eq!(row["starts_on"], "2024-03-01T00:00:00.000Z");
        assert_eq!(row["bathrooms"], "1.5");
    }

    #[test]
    fn encrypted_package_is_password_protected() {
        let mut bytes = CFB_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        for unit in ENCRYPTED_PACKAGE_STREAM.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_matches!(list_sheets(&bytes), Err(CoreError::PasswordProtected));
        assert_matches!(decode_workbook(&bytes), Err(CoreError::PasswordProtected));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert_matches!(
            decode_workbook(b"definitely not a workbook"),
            Err(CoreError::Parse(_))
        );
    }

    #[test]
    fn cell_conversion() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Float(-2.0)), "-2");
        assert_eq!(cell_to_string(&Data::String(" x ".into())), " x ");
    }
}
