//! Error and Result types for store operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value or record could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A frame's length prefix or payload ended before the announced size.
    #[error("Truncated record frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame {
        /// Number of bytes the frame announced.
        expected: usize,
        /// Bytes actually available before EOF.
        actual: usize,
    },

    /// The declared migration list disagrees with the persisted history.
    #[error(
        "Migration order error at position {position}: declared ({declared_name}, \
         {declared_version}), history has ({recorded_name}, {recorded_version})"
    )]
    MigrationOrder {
        /// Zero-based position of the offending migration.
        position: usize,
        /// Name of the declared migration.
        declared_name: String,
        /// Version of the declared migration.
        declared_version: String,
        /// Name recorded in the history log at that position.
        recorded_name: String,
        /// Version recorded in the history log at that position.
        recorded_version: String,
    },

    /// An operation was attempted on a closed memtable.
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Wraps an arbitrary error as a codec failure.
    pub fn codec(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Codec(Box::new(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::codec(err)
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(err: base64::DecodeError) -> Self {
        StoreError::codec(err)
    }
}
