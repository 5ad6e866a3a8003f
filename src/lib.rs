//! Profile Maintainer - weekly maintenance runner for therapist profiles
//!
//! Walks the active accounts once a week (or on demand), drives the
//! browser-automation sidecar for each one with bounded retries, records an
//! outcome per account and notifies the operator. A small REST surface
//! starts, stops and inspects the runner.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod api;

#[cfg(test)]
pub(crate) mod test_utils;

pub use application::{MaintenanceController, MaintenanceServices, MaintenanceSettings};
