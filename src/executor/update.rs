//! Update
//!
//! Collects the victim rows from its child scan, then rewrites each record
//! in place and maintains every index with a delete-then-insert entry pair.
//! Victims are materialized before any mutation, so an index scan beneath
//! the update never chases rows its own writes moved.

use std::sync::Arc;

use crate::catalog::ColumnMeta;
use crate::index::Index;
use crate::sql::{SetClause, Value};
use crate::storage::TableFile;
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::tuple::Tuple;
use super::{index_key_for, summary_schema, Executor};

/// Update operator
pub struct Update {
    table: String,
    /// Target table schema
    schema: Vec<ColumnMeta>,
    child: Box<dyn Executor>,
    /// Resolved assignments: target column plus new value
    sets: Vec<(ColumnMeta, Value)>,
    file: Arc<TableFile>,
    indexes: Vec<Arc<Index>>,
    ctx: ExecContext,
    out_schema: Vec<ColumnMeta>,
    affected: Option<u64>,
    done: bool,
}

impl Update {
    pub fn new(
        table: String,
        schema: Vec<ColumnMeta>,
        child: Box<dyn Executor>,
        set_clauses: Vec<SetClause>,
        file: Arc<TableFile>,
        indexes: Vec<Arc<Index>>,
        ctx: ExecContext,
    ) -> ExecutorResult<Self> {
        let mut sets = Vec::with_capacity(set_clauses.len());
        for clause in set_clauses {
            let col = schema
                .iter()
                .find(|c| c.name == clause.column)
                .cloned()
                .ok_or_else(|| ExecutorError::ColumnNotFound {
                    table: table.clone(),
                    column: clause.column.clone(),
                })?;
            sets.push((col, clause.value));
        }
        Ok(Self {
            table,
            schema,
            child,
            sets,
            file,
            indexes,
            ctx,
            out_schema: summary_schema(),
            affected: None,
            done: false,
        })
    }
}

impl Executor for Update {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.ctx.lock_exclusive(&self.table)?;

        self.child.begin()?;
        let mut victims = Vec::new();
        while !self.child.is_end() {
            self.ctx.check_cancelled()?;
            victims.push((self.child.current_rid()?, self.child.current_tuple()?));
            self.child.next()?;
        }

        let mut count = 0u64;
        for (rid, old) in victims {
            let mut new = old.clone();
            for (col, value) in &self.sets {
                new.set_value(col, value)?;
            }
            for index in &self.indexes {
                let old_key = index_key_for(&old, &self.schema, &index.columns)?;
                let new_key = index_key_for(&new, &self.schema, &index.columns)?;
                index.delete(&old_key, rid);
                index.insert(new_key, rid);
            }
            self.file.update(rid, new.data())?;
            count += 1;
        }

        self.affected = Some(count);
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.done = true;
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done || self.affected.is_none()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        match (self.done, self.affected) {
            (false, Some(n)) => Tuple::from_values(&[Value::Int(n as i32)], &self.out_schema),
            _ => Err(ExecutorError::Internal("update not positioned".to_string())),
        }
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.out_schema
    }
}
