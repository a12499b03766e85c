//! Top-level error taxonomy
//!
//! The shape every statement failure takes on its way to the client. Each
//! layer keeps its own error enum; conversions here decide the kind the
//! dispatcher surfaces.

use std::fmt;

use crate::executor::ExecutorError;
use crate::planner::PlanError;
use crate::sql::SqlError;
use crate::storage::StorageError;
use crate::txn::TxnError;

/// Statement-level error kinds
#[derive(Debug)]
pub enum Error {
    /// Parse failure, reported by the external parser with position info
    Syntax(String),
    /// Resolver failure: unknown or ambiguous identifier, arity or type
    /// mismatch
    Semantic(SqlError),
    /// The planner cannot produce a valid plan
    Plan(PlanError),
    /// Record or index manager failure
    Storage(StorageError),
    /// Lock conflict; the transaction is aborted
    Conflict(String),
    /// Cooperative cancellation
    Cancelled,
    /// Transaction-state misuse (BEGIN inside a transaction, COMMIT outside)
    Transaction(TxnError),
    /// Invariant violated
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax(msg) => write!(f, "SyntaxError: {}", msg),
            Error::Semantic(e) => write!(f, "SemanticError: {}", e),
            Error::Plan(e) => write!(f, "PlanError: {}", e),
            Error::Storage(e) => write!(f, "StorageError: {}", e),
            Error::Conflict(msg) => write!(f, "ConflictError: {}", msg),
            Error::Cancelled => write!(f, "CancelledError: statement cancelled"),
            Error::Transaction(e) => write!(f, "TransactionError: {}", e),
            Error::Internal(msg) => write!(f, "InternalError: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Semantic(e) => Some(e),
            Error::Plan(e) => Some(e),
            Error::Storage(e) => Some(e),
            Error::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SqlError> for Error {
    fn from(e: SqlError) -> Self {
        Error::Semantic(e)
    }
}

impl From<PlanError> for Error {
    fn from(e: PlanError) -> Self {
        Error::Plan(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

impl From<TxnError> for Error {
    fn from(e: TxnError) -> Self {
        match e {
            TxnError::Conflict(table) => Error::Conflict(format!("lock conflict on '{}'", table)),
            TxnError::Cancelled => Error::Cancelled,
            other => Error::Transaction(other),
        }
    }
}

impl From<ExecutorError> for Error {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Storage(e) => Error::Storage(e),
            ExecutorError::Txn(e) => Error::from(e),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// Result type for statement execution
pub type Result<T> = std::result::Result<T, Error>;
