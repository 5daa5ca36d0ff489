//! Record store error types

use thiserror::Error;

use super::document::Table;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted blob is not a readable document. Never reset silently.
    #[error("Persisted document is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed row in {table}: {source}")]
    Decode {
        table: Table,
        #[source]
        source: serde_json::Error,
    },

    #[error("Fields for {0} must be a JSON object")]
    NotAnObject(Table),

    #[error("Record not found: {table}/{id}")]
    NotFound { table: Table, id: String },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "STORE_IO",
            StoreError::Corrupt(_) => "STORE_CORRUPT",
            StoreError::Serialization(_) => "STORE_SERIALIZATION",
            StoreError::Decode { .. } => "STORE_DECODE",
            StoreError::NotAnObject(_) => "STORE_NOT_AN_OBJECT",
            StoreError::NotFound { .. } => "STORE_NOT_FOUND",
        }
    }
}
