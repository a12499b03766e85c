//! Sort-merge join
//!
//! Materializes both children, sorts them by the equi-join keys, and
//! merges. Ties on the keys produce the cross product of the tied groups;
//! non-equality conditions on the same join node apply as a residual
//! filter once the merge yields a candidate pair.

use std::cmp::Ordering;

use crate::catalog::ColumnMeta;
use crate::sql::{CompOp, CondRhs, Condition, Value};
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::nested_loop_join::concat_schemas;
use super::predicate::{eval_conditions, find_column};
use super::tuple::Tuple;
use super::Executor;

/// Sort-merge join operator
pub struct SortMergeJoin {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    /// Equality conditions driving the merge, lhs in the left schema
    eq_conds: Vec<Condition>,
    /// Remaining conditions, applied after the merge
    residual: Vec<Condition>,
    left_schema: Vec<ColumnMeta>,
    right_schema: Vec<ColumnMeta>,
    schema: Vec<ColumnMeta>,
    ctx: ExecContext,
    results: Vec<Tuple>,
    pos: usize,
}

impl SortMergeJoin {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        conds: Vec<Condition>,
        ctx: ExecContext,
    ) -> ExecutorResult<Self> {
        let (eq_conds, residual): (Vec<_>, Vec<_>) = conds
            .into_iter()
            .partition(|c| c.op == CompOp::Eq && matches!(c.rhs, CondRhs::Column(_)));
        if eq_conds.is_empty() {
            return Err(ExecutorError::Internal(
                "sort-merge join requires an equality condition".to_string(),
            ));
        }

        let left_schema = left.output_columns().to_vec();
        let right_schema = right.output_columns().to_vec();
        let schema = concat_schemas(&left_schema, &right_schema);
        Ok(Self {
            left,
            right,
            eq_conds,
            residual,
            left_schema,
            right_schema,
            schema,
            ctx,
            results: Vec::new(),
            pos: 0,
        })
    }

    fn materialize(child: &mut dyn Executor) -> ExecutorResult<Vec<Tuple>> {
        let mut rows = Vec::new();
        child.begin()?;
        while !child.is_end() {
            rows.push(child.current_tuple()?);
            child.next()?;
        }
        Ok(rows)
    }

    fn keyed(
        rows: Vec<Tuple>,
        key_cols: &[&ColumnMeta],
    ) -> ExecutorResult<Vec<(Vec<Value>, Tuple)>> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut key = Vec::with_capacity(key_cols.len());
            for col in key_cols {
                key.push(row.value(col)?);
            }
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| cmp_keys(a, b));
        Ok(keyed)
    }
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl Executor for SortMergeJoin {
    fn begin(&mut self) -> ExecutorResult<()> {
        let left_keys: Vec<&ColumnMeta> = self
            .eq_conds
            .iter()
            .map(|c| find_column(&self.left_schema, &c.lhs))
            .collect::<ExecutorResult<_>>()?;
        let right_keys: Vec<&ColumnMeta> = self
            .eq_conds
            .iter()
            .map(|c| match &c.rhs {
                CondRhs::Column(col) => find_column(&self.right_schema, col),
                CondRhs::Value(_) => Err(ExecutorError::Internal(
                    "merge key must be a column".to_string(),
                )),
            })
            .collect::<ExecutorResult<_>>()?;

        let left_rows = Self::materialize(self.left.as_mut())?;
        let right_rows = Self::materialize(self.right.as_mut())?;
        let left = Self::keyed(left_rows, &left_keys)?;
        let right = Self::keyed(right_rows, &right_keys)?;

        self.results.clear();
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            self.ctx.check_cancelled()?;
            match cmp_keys(&left[i].0, &right[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let mut i_end = i + 1;
                    while i_end < left.len() && cmp_keys(&left[i_end].0, &left[i].0) == Ordering::Equal
                    {
                        i_end += 1;
                    }
                    let mut j_end = j + 1;
                    while j_end < right.len()
                        && cmp_keys(&right[j_end].0, &right[j].0) == Ordering::Equal
                    {
                        j_end += 1;
                    }
                    for (_, lt) in &left[i..i_end] {
                        for (_, rt) in &right[j..j_end] {
                            let combined = Tuple::concat(lt, rt);
                            if eval_conditions(&self.residual, &self.schema, &combined)? {
                                self.results.push(combined);
                            }
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
            }
        }
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        if self.pos < self.results.len() {
            self.pos += 1;
        }
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.pos >= self.results.len()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        self.results
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ExecutorError::Internal("join not positioned".to_string()))
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::nested_loop_join::tests::{int_row, int_table, test_ctx, MockExecutor};
    use crate::sql::ColumnRef;

    fn eq_cond() -> Condition {
        Condition {
            lhs: ColumnRef::new("l", "id"),
            op: CompOp::Eq,
            rhs: CondRhs::Column(ColumnRef::new("r", "id")),
        }
    }

    fn drain(join: &mut SortMergeJoin) -> Vec<Tuple> {
        let mut out = Vec::new();
        while !join.is_end() {
            out.push(join.current_tuple().unwrap());
            join.next().unwrap();
        }
        out
    }

    #[test]
    fn test_merge_in_key_order() {
        let ls = int_table("l", &["id"]);
        let rs = int_table("r", &["id", "v"]);
        let left = MockExecutor::new(
            ls.clone(),
            vec![int_row(&ls, &[3]), int_row(&ls, &[1]), int_row(&ls, &[2])],
        );
        let right = MockExecutor::new(
            rs.clone(),
            vec![
                int_row(&rs, &[2, 200]),
                int_row(&rs, &[3, 300]),
                int_row(&rs, &[1, 100]),
            ],
        );

        let mut join =
            SortMergeJoin::new(Box::new(left), Box::new(right), vec![eq_cond()], test_ctx())
                .unwrap();
        join.begin().unwrap();

        let schema = join.output_columns().to_vec();
        let ids: Vec<Value> = drain(&mut join)
            .iter()
            .map(|t| t.value(&schema[0]).unwrap())
            .collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_ties_produce_cross_product() {
        let ls = int_table("l", &["id"]);
        let rs = int_table("r", &["id"]);
        let left = MockExecutor::new(ls.clone(), vec![int_row(&ls, &[1]), int_row(&ls, &[1])]);
        let right = MockExecutor::new(
            rs.clone(),
            vec![int_row(&rs, &[1]), int_row(&rs, &[1]), int_row(&rs, &[1])],
        );

        let mut join =
            SortMergeJoin::new(Box::new(left), Box::new(right), vec![eq_cond()], test_ctx())
                .unwrap();
        join.begin().unwrap();
        assert_eq!(drain(&mut join).len(), 6);
    }

    #[test]
    fn test_residual_condition_filters_pairs() {
        let ls = int_table("l", &["id", "x"]);
        let rs = int_table("r", &["id", "y"]);
        let left = MockExecutor::new(
            ls.clone(),
            vec![int_row(&ls, &[1, 5]), int_row(&ls, &[2, 50])],
        );
        let right = MockExecutor::new(
            rs.clone(),
            vec![int_row(&rs, &[1, 10]), int_row(&rs, &[2, 10])],
        );

        let residual = Condition {
            lhs: ColumnRef::new("l", "x"),
            op: CompOp::Lt,
            rhs: CondRhs::Column(ColumnRef::new("r", "y")),
        };
        let mut join = SortMergeJoin::new(
            Box::new(left),
            Box::new(right),
            vec![eq_cond(), residual],
            test_ctx(),
        )
        .unwrap();
        join.begin().unwrap();
        // only (1,5)x(1,10) passes x < y
        assert_eq!(drain(&mut join).len(), 1);
    }

    #[test]
    fn test_requires_equality_condition() {
        let ls = int_table("l", &["id"]);
        let rs = int_table("r", &["id"]);
        let left = MockExecutor::new(ls.clone(), vec![]);
        let right = MockExecutor::new(rs, vec![]);

        let lt = Condition {
            lhs: ColumnRef::new("l", "id"),
            op: CompOp::Lt,
            rhs: CondRhs::Column(ColumnRef::new("r", "id")),
        };
        assert!(
            SortMergeJoin::new(Box::new(left), Box::new(right), vec![lt], test_ctx()).is_err()
        );
    }
}
