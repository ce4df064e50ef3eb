//! REST client for the property-management backend.
//!
//! Creates properties, units, and leases one row at a time and fetches the
//! lookup tables rows refer to. [`BackendApi`] implements the core
//! [`ImportBackend`](propimport_core::ImportBackend) seam.

pub mod api;
pub mod config;

pub use api::{BackendApi, BackendApiError};
pub use config::BackendConfig;
