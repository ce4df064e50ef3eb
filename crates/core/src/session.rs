//! Import session state machine.
//!
//! ```text
//! Idle -> FileSelected -> (MultiSheetPending ->) Decoded -> MappingReview <-> Validated
//!      -> Submitting -> Completed
//! ```
//!
//! `Decoded` is transient: a decoded file immediately gets a proposed mapping
//! and lands in `MappingReview`, or in `Validated` when every required field
//! is already mapped. Only `Idle` and `Completed` accept a full reset; every
//! other non-idle state can be cancelled back to `Idle`.

use serde::Serialize;

use crate::decoder::{
    decode_delimited, decode_sheet, decode_workbook, detect_format, DecodedSheet, FileFormat,
    WorkbookDecode,
};
use crate::error::CoreError;
use crate::fields::{FieldDescriptor, ImportMode};
use crate::mapping::{assign_target, auto_detect_mappings, replace_mappings, ColumnMapping};
use crate::submission::ImportSummary;
use crate::transform::{transform_rows, ImportPayload, LookupEntry};
use crate::types::DecodedRow;
use crate::validation::validate_mappings;

// ── Status ───────────────────────────────────────────────────────────

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_FILE_SELECTED: &str = "file_selected";
pub const STATUS_MULTI_SHEET_PENDING: &str = "multi_sheet_pending";
pub const STATUS_DECODED: &str = "decoded";
pub const STATUS_MAPPING_REVIEW: &str = "mapping_review";
pub const STATUS_VALIDATED: &str = "validated";
pub const STATUS_SUBMITTING: &str = "submitting";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    FileSelected,
    MultiSheetPending,
    Decoded,
    MappingReview,
    Validated,
    Submitting,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => STATUS_IDLE,
            Self::FileSelected => STATUS_FILE_SELECTED,
            Self::MultiSheetPending => STATUS_MULTI_SHEET_PENDING,
            Self::Decoded => STATUS_DECODED,
            Self::MappingReview => STATUS_MAPPING_REVIEW,
            Self::Validated => STATUS_VALIDATED,
            Self::Submitting => STATUS_SUBMITTING,
            Self::Completed => STATUS_COMPLETED,
        }
    }

    /// Whether the mapping can be edited in this state.
    pub fn is_reviewing(&self) -> bool {
        matches!(self, Self::MappingReview | Self::Validated)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// One user's import, from file selection to the final summary.
///
/// The mode is fixed at creation. Everything else is cleared on cancel and
/// reset.
#[derive(Debug, Clone)]
pub struct ImportSession {
    mode: ImportMode,
    status: SessionStatus,
    file_name: Option<String>,
    file_format: Option<FileFormat>,
    file_bytes: Vec<u8>,
    sheet_names: Vec<String>,
    sheet_name: Option<String>,
    sheet: DecodedSheet,
    mappings: Vec<ColumnMapping>,
    validation_errors: Vec<String>,
    summary: Option<ImportSummary>,
}

impl ImportSession {
    pub fn new(mode: ImportMode) -> Self {
        Self {
            mode,
            status: SessionStatus::Idle,
            file_name: None,
            file_format: None,
            file_bytes: Vec::new(),
            sheet_names: Vec::new(),
            sheet_name: None,
            sheet: DecodedSheet::default(),
            mappings: Vec::new(),
            validation_errors: Vec::new(),
            summary: None,
        }
    }

    // -- Accessors --

    pub fn mode(&self) -> ImportMode {
        self.mode
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.mode.fields()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Sheet names offered while a workbook waits for a sheet choice.
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// The decoded sheet's name (workbooks only).
    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet_name.as_deref()
    }

    pub fn headers(&self) -> &[String] {
        &self.sheet.headers
    }

    pub fn rows(&self) -> &[DecodedRow] {
        &self.sheet.rows
    }

    pub fn row_count(&self) -> usize {
        self.sheet.rows.len()
    }

    /// The first `limit` decoded rows.
    pub fn preview(&self, limit: usize) -> &[DecodedRow] {
        &self.sheet.rows[..self.sheet.rows.len().min(limit)]
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    pub fn summary(&self) -> Option<&ImportSummary> {
        self.summary.as_ref()
    }

    // -- File selection and decoding --

    /// Attach an uploaded file. The extension picks the decoder; an
    /// unsupported extension leaves the session idle.
    pub fn select_file(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), CoreError> {
        self.require(&[SessionStatus::Idle], "select a file")?;
        let format = detect_format(file_name)?;

        self.file_name = Some(file_name.to_string());
        self.file_format = Some(format);
        self.file_bytes = bytes;
        self.status = SessionStatus::FileSelected;
        tracing::debug!(file_name, mode = %self.mode, "Import file selected");
        Ok(())
    }

    /// Decode the selected file. A workbook with several sheets stops in
    /// `MultiSheetPending`. Any decode error returns the session to `Idle`.
    pub fn decode(&mut self) -> Result<SessionStatus, CoreError> {
        self.require(&[SessionStatus::FileSelected], "decode the file")?;

        let decoded = match self.file_format {
            Some(FileFormat::Delimited { tab_separated }) => {
                let delimiter = tab_separated.then_some(b'\t');
                decode_delimited(&self.file_bytes, delimiter).map(|sheet| WorkbookDecode::Decoded {
                    sheet_name: String::new(),
                    sheet,
                })
            }
            Some(FileFormat::Workbook) => decode_workbook(&self.file_bytes),
            None => Err(CoreError::Validation("No file selected".to_string())),
        };

        match decoded {
            Ok(WorkbookDecode::SheetSelection(names)) => {
                self.sheet_names = names;
                self.status = SessionStatus::MultiSheetPending;
            }
            Ok(WorkbookDecode::Decoded { sheet_name, sheet }) => {
                let sheet_name = (!sheet_name.is_empty()).then_some(sheet_name);
                self.on_decoded(sheet_name, sheet);
            }
            Err(e) => {
                tracing::info!(error = %e, "Import file could not be decoded");
                self.clear();
                return Err(e);
            }
        }
        Ok(self.status)
    }

    /// Pick the workbook sheet (1-based). An out-of-range index keeps the
    /// choice pending; any other decode error returns the session to `Idle`.
    pub fn choose_sheet(&mut self, sheet_number: usize) -> Result<SessionStatus, CoreError> {
        self.require(&[SessionStatus::MultiSheetPending], "choose a sheet")?;

        match decode_sheet(&self.file_bytes, sheet_number) {
            Ok(sheet) => {
                let sheet_name = self.sheet_names.get(sheet_number - 1).cloned();
                self.on_decoded(sheet_name, sheet);
                Ok(self.status)
            }
            Err(e @ CoreError::SheetOutOfRange { .. }) => Err(e),
            Err(e) => {
                tracing::info!(error = %e, sheet_number, "Selected sheet could not be decoded");
                self.clear();
                Err(e)
            }
        }
    }

    // -- Mapping review --

    /// Point one column at a field (or skip it) and re-validate.
    pub fn assign_mapping(
        &mut self,
        source_header: &str,
        target_field_key: Option<&str>,
    ) -> Result<&[String], CoreError> {
        self.require_reviewing("edit the mapping")?;
        assign_target(&mut self.mappings, self.mode.fields(), source_header, target_field_key)?;
        self.revalidate();
        Ok(&self.validation_errors)
    }

    /// Replace the whole mapping and re-validate.
    pub fn replace_mappings(
        &mut self,
        mappings: Vec<ColumnMapping>,
    ) -> Result<&[String], CoreError> {
        self.require_reviewing("edit the mapping")?;
        self.mappings = replace_mappings(&self.sheet.headers, self.mode.fields(), mappings)?;
        self.revalidate();
        Ok(&self.validation_errors)
    }

    // -- Submission --

    /// Enter `Submitting`. Refused with every outstanding validation message
    /// while required fields are unmapped.
    pub fn begin_submission(&mut self) -> Result<(), CoreError> {
        if self.status == SessionStatus::MappingReview && !self.validation_errors.is_empty() {
            return Err(CoreError::Validation(self.validation_errors.join("; ")));
        }
        self.require(&[SessionStatus::Validated], "submit")?;
        self.status = SessionStatus::Submitting;
        tracing::info!(mode = %self.mode, rows = self.row_count(), "Import submission started");
        Ok(())
    }

    /// Transform every decoded row into its payload, in row order.
    pub fn build_payloads(&self, lookup: &[LookupEntry]) -> Result<Vec<ImportPayload>, CoreError> {
        self.require(&[SessionStatus::Submitting], "build payloads")?;
        Ok(transform_rows(self.mode, &self.sheet.rows, &self.mappings, lookup))
    }

    /// Return to `Validated` when submission could not start (for example the
    /// lookup table could not be fetched).
    pub fn abort_submission(&mut self) -> Result<(), CoreError> {
        self.require(&[SessionStatus::Submitting], "abort the submission")?;
        self.status = SessionStatus::Validated;
        Ok(())
    }

    /// Record the batch summary and finish.
    pub fn complete(&mut self, summary: ImportSummary) -> Result<(), CoreError> {
        self.require(&[SessionStatus::Submitting], "complete the import")?;
        tracing::info!(
            total = summary.total_rows,
            succeeded = summary.succeeded_count,
            "Import completed"
        );
        self.summary = Some(summary);
        self.status = SessionStatus::Completed;
        Ok(())
    }

    // -- Cancel / reset --

    /// Abandon whatever is in progress and return to `Idle`.
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        if matches!(self.status, SessionStatus::Idle | SessionStatus::Completed) {
            return Err(self.invalid("cancel"));
        }
        tracing::info!(from = %self.status, "Import cancelled");
        self.clear();
        Ok(())
    }

    /// Start over. Allowed only from `Idle` or `Completed`.
    pub fn reset(&mut self) -> Result<(), CoreError> {
        self.require(&[SessionStatus::Idle, SessionStatus::Completed], "reset")?;
        self.clear();
        Ok(())
    }

    // -- Private helpers --

    fn on_decoded(&mut self, sheet_name: Option<String>, sheet: DecodedSheet) {
        self.status = SessionStatus::Decoded;
        self.file_bytes = Vec::new();
        self.sheet_names.clear();
        self.sheet_name = sheet_name;
        self.mappings = auto_detect_mappings(&sheet.headers, self.mode.fields());
        self.sheet = sheet;
        tracing::debug!(
            columns = self.sheet.headers.len(),
            rows = self.sheet.rows.len(),
            mapped = self.mappings.iter().filter(|m| m.target().is_some()).count(),
            "Proposed column mapping"
        );
        self.revalidate();
    }

    fn revalidate(&mut self) {
        self.validation_errors = validate_mappings(&self.mappings, self.mode.fields());
        self.status = if self.validation_errors.is_empty() {
            SessionStatus::Validated
        } else {
            SessionStatus::MappingReview
        };
    }

    fn clear(&mut self) {
        *self = Self::new(self.mode);
    }

    fn require(&self, allowed: &[SessionStatus], action: &'static str) -> Result<(), CoreError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn require_reviewing(&self, action: &'static str) -> Result<(), CoreError> {
        if self.status.is_reviewing() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidTransition {
            action,
            state: self.status.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{RowResult, SubmissionOutcome};
    use assert_matches::assert_matches;
    use rust_xlsxwriter::Workbook;

    fn csv_session(data: &str) -> ImportSession {
        let mut session = ImportSession::new(ImportMode::Properties);
        session
            .select_file("props.csv", data.as_bytes().to_vec())
            .unwrap();
        session
    }

    fn two_sheet_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, value) in [("First", "A"), ("Second", "B")] {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name).unwrap();
            sheet.write_string(0, 0, "Nombre").unwrap();
            sheet.write_string(1, 0, value).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    // -- decode tests --

    #[test]
    fn csv_with_required_fields_lands_validated() {
        let mut session = csv_session("name,code\nCasa Azul,CA-1\n");
        assert_eq!(session.decode().unwrap(), SessionStatus::Validated);
        assert_eq!(session.row_count(), 1);
        assert_eq!(session.mappings()[0].target(), Some("name"));
        assert!(session.validation_errors().is_empty());
    }

    #[test]
    fn missing_required_field_lands_in_review() {
        let mut session = csv_session("code,city\nCA-1,Asunción\n");
        assert_eq!(session.decode().unwrap(), SessionStatus::MappingReview);
        assert_eq!(session.validation_errors().len(), 1);
    }

    #[test]
    fn decode_error_returns_to_idle() {
        let mut session = csv_session("name,code\n");
        assert_matches!(session.decode(), Err(CoreError::EmptyFile));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.file_name(), None);
    }

    #[test]
    fn unsupported_extension_stays_idle() {
        let mut session = ImportSession::new(ImportMode::Units);
        assert_matches!(
            session.select_file("units.pdf", vec![1, 2, 3]),
            Err(CoreError::UnsupportedFormat(_))
        );
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn multi_sheet_workbook_waits_for_choice() {
        let mut session = ImportSession::new(ImportMode::Properties);
        session
            .select_file("book.xlsx", two_sheet_workbook())
            .unwrap();
        assert_eq!(session.decode().unwrap(), SessionStatus::MultiSheetPending);
        assert_eq!(session.sheet_names(), ["First", "Second"]);
        assert_eq!(session.row_count(), 0);

        assert_matches!(
            session.choose_sheet(5),
            Err(CoreError::SheetOutOfRange { index: 5, count: 2 })
        );
        assert_eq!(session.status(), SessionStatus::MultiSheetPending);

        assert_eq!(session.choose_sheet(2).unwrap(), SessionStatus::Validated);
        assert_eq!(session.sheet_name(), Some("Second"));
        assert_eq!(session.rows()[0]["Nombre"], "B");
        assert!(session.sheet_names().is_empty());
    }

    #[test]
    fn cancel_from_sheet_choice_returns_to_idle() {
        let mut session = ImportSession::new(ImportMode::Properties);
        session
            .select_file("book.xlsx", two_sheet_workbook())
            .unwrap();
        session.decode().unwrap();
        session.cancel().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.sheet_names().is_empty());
    }

    // -- mapping tests --

    #[test]
    fn mapping_edits_revalidate() {
        let mut session = csv_session("Alias,code\nCasa,CA-1\n");
        assert_eq!(session.decode().unwrap(), SessionStatus::MappingReview);

        let errors = session.assign_mapping("Alias", Some("name")).unwrap();
        assert!(errors.is_empty());
        assert_eq!(session.status(), SessionStatus::Validated);

        session.assign_mapping("Alias", None).unwrap();
        assert_eq!(session.status(), SessionStatus::MappingReview);
    }

    #[test]
    fn mapping_edits_rejected_outside_review() {
        let mut session = ImportSession::new(ImportMode::Properties);
        assert_matches!(
            session.assign_mapping("name", Some("name")),
            Err(CoreError::InvalidTransition { state: "idle", .. })
        );
    }

    // -- submission tests --

    #[test]
    fn submit_requires_valid_mapping() {
        let mut session = csv_session("code\nCA-1\n");
        session.decode().unwrap();
        assert_matches!(
            session.begin_submission(),
            Err(CoreError::Validation(msg)) if msg.contains("Nombre / Name")
        );
        assert_eq!(session.status(), SessionStatus::MappingReview);
    }

    #[test]
    fn full_lifecycle() {
        let mut session = csv_session("name,code\nCasa Azul,CA-1\nCasa Roja,CR-2\n");
        session.decode().unwrap();
        session.begin_submission().unwrap();
        assert_eq!(session.status(), SessionStatus::Submitting);

        let payloads = session.build_payloads(&[]).unwrap();
        assert_eq!(payloads.len(), 2);

        let results: Vec<RowResult> = (0..2)
            .map(|i| RowResult::new(i, SubmissionOutcome::Created { record_id: None }))
            .collect();
        session.complete(ImportSummary::from_results(&results)).unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.summary().unwrap().succeeded_count, 2);

        assert_matches!(session.cancel(), Err(CoreError::InvalidTransition { .. }));
        session.reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.summary().is_none());
        assert_eq!(session.mode(), ImportMode::Properties);
    }

    #[test]
    fn abort_returns_to_validated() {
        let mut session = csv_session("name\nCasa\n");
        session.decode().unwrap();
        session.begin_submission().unwrap();
        session.abort_submission().unwrap();
        assert_eq!(session.status(), SessionStatus::Validated);
    }

    #[test]
    fn reset_only_from_idle_or_completed() {
        let mut session = csv_session("name\nCasa\n");
        assert_matches!(
            session.reset(),
            Err(CoreError::InvalidTransition { action: "reset", state: "file_selected" })
        );
        session.decode().unwrap();
        assert_matches!(session.reset(), Err(CoreError::InvalidTransition { .. }));
        session.cancel().unwrap();
        assert!(session.reset().is_ok());
    }

    #[test]
    fn preview_is_bounded() {
        let data: String = std::iter::once("name\n".to_string())
            .chain((0..25).map(|i| format!("Casa {i}\n")))
            .collect();
        let mut session = csv_session(&data);
        session.decode().unwrap();
        assert_eq!(session.row_count(), 25);
        assert_eq!(session.preview(10).len(), 10);
        assert_eq!(session.preview(100).len(), 25);
    }
}
