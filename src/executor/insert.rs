//! Insert
//!
//! Encodes one literal row, appends it through the record manager, and
//! inserts a matching entry into every index on the table. Produces a
//! single rows-affected summary tuple.

use std::sync::Arc;

use crate::catalog::ColumnMeta;
use crate::index::Index;
use crate::sql::Value;
use crate::storage::TableFile;
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::tuple::Tuple;
use super::{index_key_for, summary_schema, Executor};

/// Insert operator
pub struct Insert {
    table: String,
    /// Target table schema
    schema: Vec<ColumnMeta>,
    values: Vec<Value>,
    file: Arc<TableFile>,
    indexes: Vec<Arc<Index>>,
    ctx: ExecContext,
    out_schema: Vec<ColumnMeta>,
    affected: Option<u64>,
    done: bool,
}

impl Insert {
    pub fn new(
        table: String,
        schema: Vec<ColumnMeta>,
        values: Vec<Value>,
        file: Arc<TableFile>,
        indexes: Vec<Arc<Index>>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            schema,
            values,
            file,
            indexes,
            ctx,
            out_schema: summary_schema(),
            affected: None,
            done: false,
        }
    }
}

impl Executor for Insert {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        self.ctx.lock_exclusive(&self.table)?;

        let tuple = Tuple::from_values(&self.values, &self.schema)?;
        let rid = self.file.insert(tuple.data())?;
        for index in &self.indexes {
            let key = index_key_for(&tuple, &self.schema, &index.columns)?;
            index.insert(key, rid);
        }

        self.affected = Some(1);
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
            _ => Err(ExecutorError::Internal("insert not positioned".to_string())),
        }
    }

    fn output_columns(&self) -> &[ColumnMeta] {
        &self.out_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableMeta};
    use crate::executor::nested_loop_join::tests::test_ctx;
    use crate::index::{IndexKey, IndexManager};
    use crate::storage::RecordManager;
    use std::ops::Bound;

    #[test]
    fn test_insert_writes_record_and_index() {
        let meta = TableMeta::new("t")
            .column("k", DataType::Int)
            .column("v", DataType::Int);
        let records = RecordManager::new();
        records.create_file("t", meta.record_len()).unwrap();
        let file = records.open("t").unwrap();
        let indexes = IndexManager::new();
        let index = indexes.create("t", vec!["k".to_string()]).unwrap();

        let mut insert = Insert::new(
            "t".to_string(),
            meta.columns.clone(),
            vec![Value::Int(7), Value::Int(70)],
            file.clone(),
            vec![index.clone()],
            test_ctx(),
        );
        insert.begin().unwrap();

        let summary = insert.current_tuple().unwrap();
        assert_eq!(
            summary.value(&insert.output_columns()[0]).unwrap(),
            Value::Int(1)
        );
        insert.next().unwrap();
        assert!(insert.is_end());

        let key = IndexKey::from_values(&[Value::Int(7)]);
        let rids = index.range_probe(Bound::Included(key.clone()), Bound::Included(key));
        assert_eq!(rids.len(), 1);
        assert_eq!(file.get(rids[0]).unwrap().len(), meta.record_len());
    }
}
