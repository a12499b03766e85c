//! SQL front-end: AST contract, resolved query types, and name resolution
//!
//! Tokenization and parsing live in the embedding system; `ast` defines the
//! statement shapes it hands over, `resolver` binds them against the catalog,
//! and `query` holds the resolved representation the planner consumes.

pub mod ast;
pub mod error;
pub mod query;
pub mod resolver;

pub use ast::{Knob, Statement};
pub use error::{SqlError, SqlResult};
pub use query::{
    ColumnRef, CompOp, CondRhs, Condition, OrderKey, Projections, Query, SetClause, TableRef,
    Value,
};
pub use resolver::{ResolvedStatement, Resolver};
