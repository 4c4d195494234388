//! Error types for the page-view statistics service

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while updating or reading statistics
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected before any state was touched
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote store failure during a read or scan
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One or both writes of an update failed; the other may have landed
    #[error("{0}")]
    WriteFailed(WriteFailures),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Input validation failures. Each variant names the offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),

    #[error("Invalid page name: {0}")]
    InvalidPageName(String),

    #[error("Views to add must be greater than 0: {0}")]
    NonPositiveDelta(i64),
}

// =============================================================================
// Store Errors
// =============================================================================

/// A remote store operation failed for `key`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Store operation failed for key {key}: {cause}")]
pub struct StoreError {
    pub key: String,
    pub cause: String,
}

impl StoreError {
    pub fn new(key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self {
            key: key.into(),
            cause: cause.to_string(),
        }
    }
}

/// Which writes of an update failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailures {
    pub page: Option<StoreError>,
    pub top: Option<StoreError>,
}

impl std::fmt::Display for WriteFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.page, &self.top) {
            (Some(page), Some(top)) => write!(
                f,
                "Page and top record writes failed: {}; {}",
                page, top
            ),
            (Some(page), None) => write!(f, "Page record write failed: {}", page),
            (None, Some(top)) => write!(f, "Top record write failed: {}", top),
            (None, None) => write!(f, "No write failures"),
        }
    }
}
