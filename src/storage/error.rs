//! Storage error types

use thiserror::Error;

use crate::storage::Rid;

/// Record and index manager errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// No heap file exists for the table
    #[error("No storage file for table '{0}'")]
    TableNotFound(String),

    /// A heap file for the table already exists
    #[error("Storage file for table '{0}' already exists")]
    TableExists(String),

    /// Row identifier does not name a live record
    #[error("Record {0} not found")]
    RecordNotFound(Rid),

    /// Record image does not match the table's fixed width
    #[error("Record is {got} bytes, table stores {expected}-byte records")]
    WrongRecordSize { expected: usize, got: usize },

    /// Record width does not fit a page
    #[error("Record width {len} exceeds page capacity {max}")]
    RecordTooLarge { len: usize, max: usize },

    /// No index exists for the key
    #[error("No index on {table}({})", .columns.join(", "))]
    IndexNotFound { table: String, columns: Vec<String> },

    /// An index with the key already exists
    #[error("Index on {table}({}) already exists", .columns.join(", "))]
    IndexExists { table: String, columns: Vec<String> },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
