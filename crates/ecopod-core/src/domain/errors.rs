//! Domain error types
//!
//! Validation failures for identifiers, object keys and directory layouts.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Empty or malformed identifier (device, project or config id)
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Remote object key is empty, absolute or contains `..`
    #[error("Invalid object key: {0}")]
    InvalidObjectKey(String),

    /// Directory layout violates the containment invariant
    #[error("Invalid directory layout: {0}")]
    InvalidLayout(String),

    /// Reboot hour outside 0..=23
    #[error("Invalid reboot hour: {0}")]
    InvalidRebootHour(u32),
}
