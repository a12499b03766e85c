//! Sort
//!
//! Fully materializes the child, sorts by the key column, then streams.
//! Numeric keys compare arithmetically; Char keys compare with the
//! trailing-pad semantics of the value layer. The sort is stable.

use crate::catalog::ColumnMeta;
use crate::sql::ColumnRef;
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::predicate::find_column;
use super::tuple::Tuple;
use super::Executor;

/// Sort operator
pub struct Sort {
    child: Box<dyn Executor>,
    key: ColumnRef,
    desc: bool,
    schema: Vec<ColumnMeta>,
    ctx: ExecContext,
    rows: Vec<Tuple>,
    pos: usize,
}

impl Sort {
    pub fn new(child: Box<dyn Executor>, key: ColumnRef, desc: bool, ctx: ExecContext) -> Self {
        let schema = child.output_columns().to_vec();
        Self {
            child,
            key,
            desc,
            schema,
            ctx,
            rows: Vec::new(),
            pos: 0,
        }
    }
}

impl Executor for Sort {
    fn begin(&mut self) -> ExecutorResult<()> {
        let key_col = find_column(&self.schema, &self.key)?.clone();

        self.child.begin()?;
        let mut keyed = Vec::new();
        while !self.child.is_end() {
            self.ctx.check_cancelled()?;
            let tuple = self.child.current_tuple()?;
            let key = tuple.value(&key_col)?;
            keyed.push((key, tuple));
            self.child.next()?;
        }

        keyed.sort_by(|(a, _), (b, _)| {
            let ord = a.total_cmp(b);
            if self.desc {
                ord.reverse()
            } else {
                ord
            }
        });

        self.rows = keyed.into_iter().map(|(_, tuple)| tuple).collect();
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        if self.pos < self.rows.len() {
            self.pos += 1;
        }
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        self.rows
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ExecutorError::Internal("sort not positioned".to_string()))
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }
}
