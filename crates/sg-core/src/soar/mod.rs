//! Gatekeeper in front of the external `soar` SQL analysis binary.
//!
//! The allow-list is discovered once at startup from `soar --help`, narrowed by the
//! configured deny-list, and then shared read-only by every [`runner::SoarRunner`].
//! Client-supplied flags never reach the binary unless the allow-list permits them.

pub mod allowlist;
pub mod runner;
pub mod scratch;

use std::collections::BTreeMap;

pub use allowlist::SoarArgsAllowList;
pub use runner::{SoarError, SoarOutput, SoarRunner};

/// Client-supplied flag name (without the leading dash) to value.
///
/// An empty value denotes a boolean flag.
pub type ArgumentMap = BTreeMap<String, String>;
