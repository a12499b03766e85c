//! SQL resolution error types

use std::fmt;

use crate::catalog::{CatalogError, DataType};

/// Semantic errors raised while binding a statement against the catalog
#[derive(Debug, Clone)]
pub enum SqlError {
    /// Table not found during resolution
    TableNotFound(String),
    /// Column not found in any referenced table
    ColumnNotFound(String),
    /// Column name exists in more than one referenced table
    AmbiguousColumn(String),
    /// Bare column name in a multi-table statement
    UnqualifiedColumn(String),
    /// Two FROM entries bind the same name
    DuplicateTable(String),
    /// CREATE TABLE declares the same column twice
    DuplicateColumn(String),
    /// Table already exists
    TableExists(String),
    /// Index already exists
    IndexExists(String),
    /// Index not found
    IndexNotFound(String),
    /// INSERT value list does not match the table schema
    ValueCountMismatch { expected: usize, got: usize },
    /// Value type incompatible with the column type
    TypeMismatch { column: String, expected: DataType },
    /// Two condition operands cannot be compared
    IncomparableTypes(String),
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::TableNotFound(name) => write!(f, "Table '{}' not found", name),
            SqlError::ColumnNotFound(name) => write!(f, "Column '{}' not found", name),
            SqlError::AmbiguousColumn(name) => write!(f, "Column '{}' is ambiguous", name),
            SqlError::UnqualifiedColumn(name) => {
                write!(
                    f,
                    "Column '{}' must be qualified in a multi-table statement",
                    name
                )
            }
            SqlError::DuplicateTable(name) => {
                write!(f, "Table name '{}' is bound more than once", name)
            }
            SqlError::DuplicateColumn(name) => {
                write!(f, "Column '{}' is declared more than once", name)
            }
            SqlError::TableExists(name) => write!(f, "Table '{}' already exists", name),
            SqlError::IndexExists(name) => write!(f, "Index {} already exists", name),
            SqlError::IndexNotFound(name) => write!(f, "Index {} not found", name),
            SqlError::ValueCountMismatch { expected, got } => {
                write!(f, "INSERT expects {} values but {} were given", expected, got)
            }
            SqlError::TypeMismatch { column, expected } => {
                write!(f, "Value is not compatible with column '{}' ({})", column, expected)
            }
            SqlError::IncomparableTypes(context) => {
                write!(f, "Cannot compare operands in {}", context)
            }
        }
    }
}

impl std::error::Error for SqlError {}

impl From<CatalogError> for SqlError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicateTable(name) => SqlError::TableExists(name),
            CatalogError::TableNotFound(name) => SqlError::TableNotFound(name),
            CatalogError::DuplicateIndex(table, cols) => {
                SqlError::IndexExists(format!("{}({})", table, cols.join(", ")))
            }
            CatalogError::IndexNotFound(table, cols) => {
                SqlError::IndexNotFound(format!("{}({})", table, cols.join(", ")))
            }
        }
    }
}

/// Result type for resolution
pub type SqlResult<T> = Result<T, SqlError>;
