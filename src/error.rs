//! Error types for lifesheet

use thiserror::Error;

use crate::period::DomainViolation;

#[derive(Error, Debug)]
pub enum SheetError {
    /// No identity at all (neither authenticated nor guest)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity present but it does not own the addressed resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid level/period coordinate; a caller bug when raised inside the core
    #[error("Domain violation: {0}")]
    Domain(#[from] DomainViolation),

    /// Guest-to-account merge aborted; the guest token is kept so it can be retried
    #[error("Reconciliation of guest {guest} failed: {source}")]
    Reconciliation {
        guest: String,
        #[source]
        source: Box<SheetError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SheetError {
    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SheetError::Reconciliation { .. } | SheetError::Database(_))
    }
}
