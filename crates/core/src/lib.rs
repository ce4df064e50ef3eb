//! Spreadsheet import pipeline for properties, units, and leases.
//!
//! The building blocks, leaves first:
//!
//! - [`fields`]: target field registry per import mode.
//! - [`matcher`]: header normalization and alias matching.
//! - [`mapping`]: one-to-one automatic mapping and user edits.
//! - [`decoder`]: CSV/TSV and workbook decoding to string rows.
//! - [`validation`]: required-field checks that gate submission.
//! - [`transform`]: typed creation payloads and reference resolution.
//! - [`submission`]: the backend seam and per-row batch reconciliation.
//! - [`session`]: the import session state machine tying it together.

pub mod decoder;
pub mod error;
pub mod fields;
pub mod mapping;
pub mod matcher;
pub mod session;
pub mod submission;
pub mod transform;
pub mod types;
pub mod validation;

pub use error::CoreError;
pub use fields::ImportMode;
pub use session::{ImportSession, SessionStatus};
pub use submission::{BackendScope, ImportBackend, ImportSummary, RecordError, RowResult};
