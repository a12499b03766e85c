//! Filter
//!
//! Forwards child tuples for which every predicate is true. The schema is
//! the child's schema unchanged.

use crate::catalog::ColumnMeta;
use crate::sql::Condition;

use super::error::ExecutorResult;
use super::predicate::eval_conditions;
use super::tuple::Tuple;
use super::Executor;

/// Filter operator
pub struct Filter {
    child: Box<dyn Executor>,
    conds: Vec<Condition>,
    schema: Vec<ColumnMeta>,
}

impl Filter {
    pub fn new(child: Box<dyn Executor>, conds: Vec<Condition>) -> Self {
        let schema = child.output_columns().to_vec();
        Self {
            child,
            conds,
            schema,
        }
    }

    /// Skip child tuples until one passes or the child is exhausted
    fn settle(&mut self) -> ExecutorResult<()> {
        while !self.child.is_end() {
            let tuple = self.child.current_tuple()?;
            if eval_conditions(&self.conds, &self.schema, &tuple)? {
                return Ok(());
            }
            self.child.next()?;
        }
        Ok(())
    }
}

impl Executor for Filter {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.child.begin()?;
        self.settle()
    }

    fn next(&mut self) -> ExecutorResult<()> {
        if self.child.is_end() {
            return Ok(());
        }
        self.child.next()?;
        self.settle()
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        self.child.current_tuple()
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }
}
