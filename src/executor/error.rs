//! Executor error types

use std::fmt;

use crate::storage::StorageError;
use crate::txn::TxnError;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor errors
#[derive(Debug)]
pub enum ExecutorError {
    /// Storage layer error
    Storage(StorageError),

    /// Lock conflict or cancellation
    Txn(TxnError),

    /// Values of incompatible type reached an operator
    TypeMismatch(String),

    /// Column not found in an operator's record layout
    ColumnNotFound { table: String, column: String },

    /// Operation the operator does not provide
    Unsupported(&'static str),

    /// Invariant violated during execution
    Internal(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Storage(e) => write!(f, "storage error: {}", e),
            ExecutorError::Txn(e) => write!(f, "transaction error: {}", e),
            ExecutorError::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
            ExecutorError::ColumnNotFound { table, column } => {
                write!(f, "column not found: {}.{}", table, column)
            }
            ExecutorError::Unsupported(op) => write!(f, "unsupported operation: {}", op),
            ExecutorError::Internal(msg) => write!(f, "internal executor error: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Storage(e) => Some(e),
            ExecutorError::Txn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for ExecutorError {
    fn from(e: StorageError) -> Self {
        ExecutorError::Storage(e)
    }
}

impl From<TxnError> for ExecutorError {
    fn from(e: TxnError) -> Self {
        ExecutorError::Txn(e)
    }
}
