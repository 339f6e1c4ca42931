//! Core building blocks of the soar gateway.
//!
//! - [`soar`]: the argument gatekeeper that turns a client parameter map into an
//!   allow-listed `soar` invocation, plus the scratch files it needs.
//! - [`security`]: hybrid RSA + AES-CBC payload decryption.
//! - [`config`]: gateway configuration loaded from JSON and the environment.

pub mod config;
pub mod security;
pub mod soar;
