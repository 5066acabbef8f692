//! Shared DTOs for the pushpatch workspace.
//!
//! # Design constraints
//! - The run report is serialized to disk; prefer adding optional fields over
//!   changing semantics.
//! - Desired settings are produced by an external collaborator and only read here.

pub mod outcome;
pub mod platform;
pub mod settings;
pub mod tool;

/// Schema identifiers.
pub mod schema {
    pub const PUSHPATCH_REPORT_V1: &str = "pushpatch.report.v1";
}
