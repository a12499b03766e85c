//! Planner error types

use std::fmt;

/// Planner error
#[derive(Debug, Clone)]
pub enum PlanError {
    /// Both join algorithms are disabled by session knobs
    NoJoinAlgorithm,
    /// Outer joins parse but are not executable
    OuterJoinUnsupported,
    /// A plan references a table missing from the catalog
    UnknownTable(String),
    /// Statement shape the planner does not support
    Unsupported(String),
    /// Invariant violated while building the plan tree
    Internal(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::NoJoinAlgorithm => {
                write!(
                    f,
                    "No join algorithm enabled: set enable_nestloop or enable_sortmerge"
                )
            }
            PlanError::OuterJoinUnsupported => write!(f, "Outer joins are not supported"),
            PlanError::UnknownTable(name) => write!(f, "Unknown table '{}' in plan", name),
            PlanError::Unsupported(msg) => write!(f, "Unsupported statement: {}", msg),
            PlanError::Internal(msg) => write!(f, "Internal planner error: {}", msg),
        }
    }
}

impl std::error::Error for PlanError {}

/// Result type for planner operations
pub type PlanResult<T> = Result<T, PlanError>;
