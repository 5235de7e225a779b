//! Error types for the library.
//!
//! This module defines all error types that can occur during PDF parsing,
//! decryption and XFA processing.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while processing a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// Referenced object not found in the cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported feature (encryption version, security handler, ...)
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Decryption failure (bad password, malformed key material)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// XFA processing failure; carries the mutation stage that failed
    #[error("XFA error in stage {stage}: {reason}")]
    Xfa {
        /// Name of the mutator stage that failed
        stage: &'static str,
        /// Reason for the failure
        reason: String,
    },

    /// Circular reference detected in the object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an XFA error for the given mutator stage.
    pub(crate) fn xfa(stage: &'static str, reason: impl Into<String>) -> Self {
        Error::Xfa {
            stage,
            reason: reason.into(),
        }
    }
}
