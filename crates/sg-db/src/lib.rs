//! MySQL connectivity checks for the soar gateway.
//!
//! Only single, short-lived connections are opened here; nothing is pooled.

pub mod datasource;
pub mod probe;

pub use datasource::{DataSource, DatabaseMeta};
pub use probe::{probe, probe_with_metadata, DbError};
