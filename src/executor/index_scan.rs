//! Index scan
//!
//! Derives a key range from the conditions that constrain the leading
//! column of its index, probes the index for matching row identifiers in
//! key order, and re-evaluates the full condition list per record as a
//! residual filter. A `<>` predicate never narrows the range; it filters
//! residually over a full probe.

use std::ops::Bound;
use std::sync::Arc;

use crate::catalog::ColumnMeta;
use crate::index::{Index, IndexKey};
use crate::sql::{CompOp, CondRhs, Condition};
use crate::storage::{Rid, TableFile};
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::predicate::eval_conditions;
use super::tuple::Tuple;
use super::Executor;

/// Index scan operator
pub struct IndexScan {
    table: String,
    schema: Vec<ColumnMeta>,
    conds: Vec<Condition>,
    file: Arc<TableFile>,
    index: Arc<Index>,
    ctx: ExecContext,
    rids: Vec<Rid>,
    pos: usize,
    current: Option<(Rid, Tuple)>,
}

impl IndexScan {
    pub fn new(
        table: String,
        schema: Vec<ColumnMeta>,
        conds: Vec<Condition>,
        file: Arc<TableFile>,
        index: Arc<Index>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            schema,
            conds,
            file,
            index,
            ctx,
            rids: Vec::new(),
            pos: 0,
            current: None,
        }
    }

    /// Fold the conditions on the leading key column into a `[lo, hi]`
    /// probe range. Multiple conditions tighten each other; an
    /// unconstrained side stays unbounded.
    fn derive_range(&self) -> (Bound<IndexKey>, Bound<IndexKey>) {
        let mut lo: Bound<IndexKey> = Bound::Unbounded;
        let mut hi: Bound<IndexKey> = Bound::Unbounded;

        let leading = match self.index.columns.first() {
            Some(col) => col,
            None => return (lo, hi),
        };

        for cond in &self.conds {
            let value = match (&cond.rhs, &cond.lhs.column == leading) {
                (CondRhs::Value(v), true) => v,
                _ => continue,
            };
            let key = IndexKey::from_values(std::slice::from_ref(value));
            match cond.op {
                CompOp::Eq => {
                    lo = tighten_lower(lo, Bound::Included(key.clone()));
                    hi = tighten_upper(hi, Bound::Included(key));
                }
                CompOp::Lt => hi = tighten_upper(hi, Bound::Excluded(key)),
                CompOp::Le => hi = tighten_upper(hi, Bound::Included(key)),
                CompOp::Gt => lo = tighten_lower(lo, Bound::Excluded(key)),
                CompOp::Ge => lo = tighten_lower(lo, Bound::Included(key)),
                CompOp::Ne => {}
            }
        }
        (lo, hi)
    }

    fn seek(&mut self) -> ExecutorResult<()> {
        self.current = None;
        while self.pos < self.rids.len() {
            let rid = self.rids[self.pos];
            let tuple = Tuple::new(self.file.get(rid)?);
            if eval_conditions(&self.conds, &self.schema, &tuple)? {
                self.current = Some((rid, tuple));
                return Ok(());
            }
            self.pos += 1;
        }
        Ok(())
    }
}

fn tighten_lower(current: Bound<IndexKey>, new: Bound<IndexKey>) -> Bound<IndexKey> {
    match (&current, &new) {
        (Bound::Unbounded, _) => new,
        (_, Bound::Unbounded) => current,
        (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
            if b > a {
                new
            } else if a > b {
                current
            } else if matches!(new, Bound::Excluded(_)) {
                new
            } else {
                current
            }
        }
    }
}

fn tighten_upper(current: Bound<IndexKey>, new: Bound<IndexKey>) -> Bound<IndexKey> {
    match (&current, &new) {
        (Bound::Unbounded, _) => new,
        (_, Bound::Unbounded) => current,
        (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
            if b < a {
                new
            } else if a < b {
                current
            } else if matches!(new, Bound::Excluded(_)) {
                new
            } else {
                current
            }
        }
    }
}

impl Executor for IndexScan {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.ctx.lock_shared(&self.table)?;
        let (lo, hi) = self.derive_range();
        self.rids = self.index.range_probe(lo, hi);
        self.pos = 0;
        self.seek()
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        if self.current.is_none() {
            return Ok(());
        }
        self.pos += 1;
        self.seek()
    }

    fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        self.current
            .as_ref()
            .map(|(_, tuple)| tuple.clone())
            .ok_or_else(|| ExecutorError::Internal("scan not positioned".to_string()))
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }

    fn current_rid(&self) -> ExecutorResult<Rid> {
        self.current
            .as_ref()
            .map(|(rid, _)| *rid)
            .ok_or_else(|| ExecutorError::Internal("scan not positioned".to_string()))
    }
}
