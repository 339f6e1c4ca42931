//! Request handling for the soar gateway.
//!
//! [`analysis::AnalysisService`] runs the decrypt → gatekeeper → `soar` pipeline,
//! [`connection::ConnectionService`] runs MySQL connectivity probes, and
//! [`gateway::Gateway`] dispatches one client request to either of them.

pub mod analysis;
pub mod connection;
pub mod error;
pub mod gateway;

pub use error::ServiceError;
