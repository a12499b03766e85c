//! Query executor - volcano iterator model
//!
//! Operators implement a pull protocol: `begin` positions at the first
//! output tuple, `next` advances, `is_end` reports exhaustion, and
//! `current_tuple` reads the record under the cursor. Execution is
//! single-threaded cooperative pull; the root's `next` drives children
//! synchronously, and operators check the context's cancellation flag
//! between tuples.

pub mod delete;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index_scan;
pub mod insert;
pub mod merge_join;
pub mod nested_loop_join;
pub mod predicate;
pub mod project;
pub mod seq_scan;
pub mod sort;
pub mod tuple;
pub mod update;

pub use engine::{QueryEngine, QueryResult};
pub use error::{ExecutorError, ExecutorResult};
pub use tuple::Tuple;

use crate::catalog::ColumnMeta;
use crate::storage::Rid;

/// Volcano-style iterator
///
/// Call order: `begin`, then read `current_tuple` and advance with `next`
/// until `is_end`. Calling `begin` again re-initializes the operator; the
/// nested-loop join rewinds its inner side that way.
pub trait Executor {
    /// Position at the first output tuple, acquiring required resources
    fn begin(&mut self) -> ExecutorResult<()>;

    /// Advance to the next output tuple; a no-op once exhausted
    fn next(&mut self) -> ExecutorResult<()>;

    /// True once no further tuples will be produced
    fn is_end(&self) -> bool;

    /// The record image under the cursor
    fn current_tuple(&self) -> ExecutorResult<Tuple>;

    /// Layout of the records this operator produces
    fn output_columns(&self) -> &[ColumnMeta];

    /// Byte width of one output record
    fn tuple_width(&self) -> usize {
        self.output_columns().iter().map(|c| c.len).sum()
    }

    /// Storage row identifier of the current tuple. Only scans expose one;
    /// every other operator reports the operation as unsupported.
    fn current_rid(&self) -> ExecutorResult<Rid> {
        Err(ExecutorError::Unsupported("current_rid"))
    }
}

/// Layout of the one-row summary the DML operators produce
pub(crate) fn summary_schema() -> Vec<ColumnMeta> {
    vec![ColumnMeta {
        table: String::new(),
        name: "rows_affected".to_string(),
        data_type: crate::catalog::DataType::Int,
        len: 4,
        offset: 0,
        nullable: false,
    }]
}

/// Extract the index-key values of one record, in key-column order
pub(crate) fn index_key_for(
    tuple: &Tuple,
    schema: &[ColumnMeta],
    columns: &[String],
) -> ExecutorResult<crate::index::IndexKey> {
    let mut values = Vec::with_capacity(columns.len());
    for name in columns {
        let col = schema
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| ExecutorError::ColumnNotFound {
                table: schema.first().map(|c| c.table.clone()).unwrap_or_default(),
                column: name.clone(),
            })?;
        values.push(tuple.value(col)?);
    }
    Ok(crate::index::IndexKey::from_values(&values))
}
