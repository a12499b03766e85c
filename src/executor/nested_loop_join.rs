//! Nested loop join
//!
//! The outer loop pulls left tuples; for each one the right child is
//! rewound with `begin` and iterated to completion. Concatenated tuples
//! that satisfy every join condition are emitted, preserving left-tuple
//! order. With no conditions this is an explicit cross product.

use crate::catalog::ColumnMeta;
use crate::sql::Condition;
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::predicate::eval_conditions;
use super::tuple::Tuple;
use super::Executor;

/// Nested loop join operator
pub struct NestedLoopJoin {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    conds: Vec<Condition>,
    schema: Vec<ColumnMeta>,
    ctx: ExecContext,
    current: Option<Tuple>,
}

/// Concatenate two record layouts, shifting the right side's offsets
pub(crate) fn concat_schemas(left: &[ColumnMeta], right: &[ColumnMeta]) -> Vec<ColumnMeta> {
    let left_width: usize = left.iter().map(|c| c.len).sum();
    let mut schema = left.to_vec();
    for col in right {
        let mut col = col.clone();
        col.offset += left_width;
        schema.push(col);
    }
    schema
}

impl NestedLoopJoin {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        conds: Vec<Condition>,
        ctx: ExecContext,
    ) -> Self {
        let schema = concat_schemas(left.output_columns(), right.output_columns());
        Self {
            left,
            right,
            conds,
            schema,
            ctx,
            current: None,
        }
    }

    /// Advance to the next matching pair. The right cursor has already
    /// consumed the tuple it last reported, so resuming mid-inner-loop
    /// continues where the previous match left off.
    fn advance(&mut self) -> ExecutorResult<()> {
        self.current = None;
        while !self.left.is_end() {
            let left_tuple = self.left.current_tuple()?;
            while !self.right.is_end() {
                let right_tuple = self.right.current_tuple()?;
                self.right.next()?;
                let combined = Tuple::concat(&left_tuple, &right_tuple);
                if eval_conditions(&self.conds, &self.schema, &combined)? {
                    self.current = Some(combined);
                    return Ok(());
                }
            }
            self.left.next()?;
            if !self.left.is_end() {
                self.right.begin()?;
            }
        }
        Ok(())
    }
}

impl Executor for NestedLoopJoin {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.left.begin()?;
        self.right.begin()?;
        self.advance()
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        if self.current.is_none() {
            return Ok(());
        }
        self.advance()
    }

    fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        self.current
            .clone()
            .ok_or_else(|| ExecutorError::Internal("join not positioned".to_string()))
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::{DataType, TableMeta};
    use crate::sql::{ColumnRef, CompOp, CondRhs, Value};
    use crate::txn::LockManager;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    /// In-memory operator for driving join and sort tests
    pub(crate) struct MockExecutor {
        pub schema: Vec<ColumnMeta>,
        pub rows: Vec<Tuple>,
        pub pos: usize,
    }

    impl MockExecutor {
        pub fn new(schema: Vec<ColumnMeta>, rows: Vec<Tuple>) -> Self {
            Self {
                schema,
                rows,
                pos: 0,
            }
        }
    }

    impl Executor for MockExecutor {
        fn begin(&mut self) -> ExecutorResult<()> {
            self.pos = 0;
            Ok(())
        }

        fn next(&mut self) -> ExecutorResult<()> {
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
                .ok_or_else(|| ExecutorError::Internal("mock exhausted".to_string()))
        }

        fn output_columns(&self) -> &[ColumnMeta] {
            &self.schema
        }
    }

    pub(crate) fn test_ctx() -> ExecContext {
        ExecContext::new(
            1,
            Arc::new(LockManager::new()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    pub(crate) fn int_table(table: &str, cols: &[&str]) -> Vec<ColumnMeta> {
        let mut meta = TableMeta::new(table);
        for col in cols {
            meta = meta.column(*col, DataType::Int);
        }
        meta.columns
    }

    pub(crate) fn int_row(schema: &[ColumnMeta], values: &[i32]) -> Tuple {
        let values: Vec<Value> = values.iter().map(|v| Value::Int(*v)).collect();
        Tuple::from_values(&values, schema).unwrap()
    }

    fn drain(join: &mut dyn Executor) -> Vec<Tuple> {
        let mut out = Vec::new();
        while !join.is_end() {
            out.push(join.current_tuple().unwrap());
            join.next().unwrap();
        }
        out
    }

    #[test]
    fn test_cross_product_size() {
        let ls = int_table("l", &["a"]);
        let rs = int_table("r", &["b"]);
        let left = MockExecutor::new(ls.clone(), vec![int_row(&ls, &[1]), int_row(&ls, &[2])]);
        let right = MockExecutor::new(
            rs.clone(),
            vec![int_row(&rs, &[10]), int_row(&rs, &[20]), int_row(&rs, &[30])],
        );

        let mut join =
            NestedLoopJoin::new(Box::new(left), Box::new(right), vec![], test_ctx());
        join.begin().unwrap();
        assert_eq!(drain(&mut join).len(), 6);
    }

    #[test]
    fn test_equi_join_preserves_left_order() {
        let ls = int_table("l", &["id"]);
        let rs = int_table("r", &["id", "v"]);
        let left = MockExecutor::new(
            ls.clone(),
            vec![int_row(&ls, &[2]), int_row(&ls, &[1]), int_row(&ls, &[3])],
        );
        let right = MockExecutor::new(
            rs.clone(),
            vec![int_row(&rs, &[1, 100]), int_row(&rs, &[2, 200])],
        );

        let cond = Condition {
            lhs: ColumnRef::new("l", "id"),
            op: CompOp::Eq,
            rhs: CondRhs::Column(ColumnRef::new("r", "id")),
        };
        let mut join = NestedLoopJoin::new(
            Box::new(left),
            Box::new(right),
            vec![cond],
            test_ctx(),
        );
        join.begin().unwrap();

        let schema = join.output_columns().to_vec();
        let rows = drain(&mut join);
        let ids: Vec<Value> = rows
            .iter()
            .map(|t| t.value(&schema[0]).unwrap())
            .collect();
        assert_eq!(ids, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_empty_side_yields_empty() {
        let ls = int_table("l", &["a"]);
        let rs = int_table("r", &["b"]);
        let left = MockExecutor::new(ls.clone(), vec![]);
        let right = MockExecutor::new(rs, vec![int_row(&ls, &[1])]);

        let mut join =
            NestedLoopJoin::new(Box::new(left), Box::new(right), vec![], test_ctx());
        join.begin().unwrap();
        assert!(join.is_end());
    }

    #[test]
    fn test_combined_schema_offsets() {
        let ls = int_table("l", &["a", "b"]);
        let rs = int_table("r", &["c"]);
        let left = MockExecutor::new(ls.clone(), vec![int_row(&ls, &[1, 2])]);
        let right = MockExecutor::new(rs.clone(), vec![int_row(&rs, &[3])]);

        let mut join =
            NestedLoopJoin::new(Box::new(left), Box::new(right), vec![], test_ctx());
        join.begin().unwrap();

        let schema = join.output_columns();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[2].offset, 8);
        let tuple = join.current_tuple().unwrap();
        assert_eq!(tuple.value(&schema[2]).unwrap(), Value::Int(3));
    }
}
