#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("The file could not be read: {0}")]
    Parse(String),

    #[error("The file contains no data rows")]
    EmptyFile,

    #[error("Sheet '{0}' contains no data rows")]
    EmptySheet(String),

    #[error("The workbook is password protected. Remove the password and upload it again")]
    PasswordProtected,

    #[error("Sheet {index} does not exist (the workbook has {count} sheets)")]
    SheetOutOfRange { index: usize, count: usize },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {action} while the import is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("The import was cancelled")]
    Cancelled,
}

impl CoreError {
    /// Whether this error came from reading the uploaded file (as opposed to
    /// mapping, state, or lookup problems).
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::Parse(_)
                | Self::EmptyFile
                | Self::EmptySheet(_)
                | Self::PasswordProtected
                | Self::SheetOutOfRange { .. }
        )
    }
}
