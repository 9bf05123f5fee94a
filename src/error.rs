//! Error types for the suppression engine

use thiserror::Error;

/// Errors raised while parsing a hex-encoded hash key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashKeyError {
    #[error("Invalid hash length: expected 32 hex characters, got {len}")]
    InvalidHashLength { len: usize },

    #[error("Invalid hash encoding: not a hexadecimal string")]
    InvalidHashEncoding,
}

/// Errors that abort a bulk ingestion as a whole.
///
/// Individual malformed lines are never errors; they are counted and skipped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV input has no header row")]
    MissingHeader,

    #[error("CSV header has no email or hash column: {header}")]
    MissingColumn { header: String },
}
