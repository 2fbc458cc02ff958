//! Error types for the synchronization engine.

use crate::types::Domain;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum LocusError {
    /// A reconciler was called without a value it requires. Caller bug.
    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Malformed {domain} payload: {message}")]
    Decode { domain: Domain, message: String },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("A full resync is already in flight")]
    ResyncInProgress,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session has already ended")]
    SessionEnded,
}

impl LocusError {
    /// Build a decode error for a domain from any displayable cause.
    pub fn decode(domain: Domain, cause: impl std::fmt::Display) -> Self {
        LocusError::Decode {
            domain,
            message: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for LocusError {
    fn from(e: serde_json::Error) -> Self {
        LocusError::InvalidSnapshot(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, LocusError>;
