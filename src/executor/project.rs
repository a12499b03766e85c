//! Projection
//!
//! Forwards a narrowed, permuted copy of each child tuple whose layout is
//! the requested column list. Pure: never drops or reorders rows.

use crate::catalog::ColumnMeta;
use crate::sql::ColumnRef;

use super::error::ExecutorResult;
use super::predicate::find_column;
use super::tuple::Tuple;
use super::Executor;

/// Projection operator
pub struct Project {
    child: Box<dyn Executor>,
    /// (position in child layout, output column) per projected column
    mapping: Vec<(ColumnMeta, ColumnMeta)>,
    schema: Vec<ColumnMeta>,
}

impl Project {
    pub fn new(child: Box<dyn Executor>, columns: Vec<ColumnRef>) -> ExecutorResult<Self> {
        let input = child.output_columns().to_vec();
        let mut mapping = Vec::with_capacity(columns.len());
        let mut schema = Vec::with_capacity(columns.len());
        let mut offset = 0;

        for col in &columns {
            let source = find_column(&input, col)?.clone();
            let out = ColumnMeta {
                offset,
                ..source.clone()
            };
            offset += out.len;
            schema.push(out.clone());
            mapping.push((source, out));
        }

        Ok(Self {
            child,
            mapping,
            schema,
        })
    }
}

impl Executor for Project {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.child.begin()
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.child.next()
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn current_tuple(&self) -> ExecutorResult<Tuple> {
        let input = self.child.current_tuple()?;
        let width = self.schema.iter().map(|c| c.len).sum();
        let mut data = vec![0u8; width];
        for (source, out) in &self.mapping {
            let bytes = input
                .data()
                .get(source.offset..source.offset + source.len)
                .ok_or_else(|| {
                    super::error::ExecutorError::Internal(format!(
                        "column {}.{} outside child record",
                        source.table, source.name
                    ))
                })?;
            data[out.offset..out.offset + out.len].copy_from_slice(bytes);
        }
        Ok(Tuple::new(data))
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::nested_loop_join::tests::{int_row, int_table, MockExecutor};
    use crate::sql::Value;

    #[test]
    fn test_project_narrows_and_permutes() {
        let schema = int_table("t", &["a", "b", "c"]);
        let rows = vec![int_row(&schema, &[1, 2, 3])];
        let child = MockExecutor::new(schema, rows);

        let mut project = Project::new(
            Box::new(child),
            vec![ColumnRef::new("t", "c"), ColumnRef::new("t", "a")],
        )
        .unwrap();
        project.begin().unwrap();

        let out = project.output_columns().to_vec();
        assert_eq!(out.len(), 2);
        assert_eq!(project.tuple_width(), 8);

        let tuple = project.current_tuple().unwrap();
        assert_eq!(tuple.value(&out[0]).unwrap(), Value::Int(3));
        assert_eq!(tuple.value(&out[1]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_unknown_column_fails_at_build() {
        let schema = int_table("t", &["a"]);
        let child = MockExecutor::new(schema, vec![]);
        assert!(Project::new(Box::new(child), vec![ColumnRef::new("t", "zz")]).is_err());
    }
}
