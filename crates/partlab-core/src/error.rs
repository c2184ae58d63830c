//! Error types for partlab-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in partlab-core
#[derive(Debug, Error)]
pub enum Error {
    /// Incompatible units in an arithmetic operation
    #[error("Unit mismatch: {0} vs {1}")]
    UnitMismatch(String, String),

    /// Illegal unit operation (e.g. non-integer exponent on a unit)
    #[error("Illegal unit operation: {0}")]
    IllegalUnit(String),

    /// Unknown unit symbol
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Document not found by name
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Object not found by name
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Property not found by name
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// Duplicate document name
    #[error("Document name already exists: {0}")]
    DuplicateDocumentName(String),

    /// Duplicate object name within a document
    #[error("Object name already exists: {0}")]
    DuplicateObjectName(String),

    /// Matrix cannot be inverted
    #[error("Cannot invert singular matrix")]
    SingularMatrix,

    /// Invalid value type for operation
    #[error("Invalid value type: expected {expected}, got {actual}")]
    InvalidValueType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
