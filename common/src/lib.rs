//! Shared types and defaults for the packet loss monitor
//!
//! This crate provides the probe outcome types exchanged between the
//! transport and the statistics engine, plus the default settings used
//! by the command line front end.

pub mod types;
pub mod constants;

// Re-export commonly used types
pub use types::{FailureReason, ProbeOutcome};
pub use constants::*;
