//! Store errors.

use mart_core::SinkError;
use thiserror::Error;

/// Errors raised by the SQLite store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected a statement or could not be reached.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored integer does not fit the in-memory type.
    #[error("Column {column} holds out-of-range value {value}")]
    OutOfRange {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },
}

impl From<StoreError> for SinkError {
    fn from(err: StoreError) -> Self {
        SinkError::Backend(Box::new(err))
    }
}
