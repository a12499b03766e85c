//! Delete
//!
//! Drives its child scan to collect the victim rows, then removes each
//! record and its index entries. Victims are materialized before any
//! mutation so the scan never observes its own deletes.

use std::sync::Arc;

use crate::catalog::ColumnMeta;
use crate::index::Index;
use crate::sql::Value;
use crate::storage::TableFile;
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::tuple::Tuple;
use super::{index_key_for, summary_schema, Executor};

/// Delete operator
pub struct Delete {
    table: String,
    /// Target table schema
    schema: Vec<ColumnMeta>,
    child: Box<dyn Executor>,
    file: Arc<TableFile>,
    indexes: Vec<Arc<Index>>,
    ctx: ExecContext,
    out_schema: Vec<ColumnMeta>,
    affected: Option<u64>,
    done: bool,
}

impl Delete {
    pub fn new(
        table: String,
        schema: Vec<ColumnMeta>,
        child: Box<dyn Executor>,
        file: Arc<TableFile>,
        indexes: Vec<Arc<Index>>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            schema,
            child,
            file,
            indexes,
            ctx,
            out_schema: summary_schema(),
            affected: None,
            done: false,
        }
    }
}

impl Executor for Delete {
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
        for (rid, tuple) in victims {
            for index in &self.indexes {
                let key = index_key_for(&tuple, &self.schema, &index.columns)?;
                index.delete(&key, rid);
            }
            self.file.delete(rid)?;
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
            _ => Err(ExecutorError::Internal("delete not positioned".to_string())),
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
    use crate::executor::seq_scan::SeqScan;
    use crate::index::{IndexKey, IndexManager};
    use crate::sql::{ColumnRef, CompOp, CondRhs, Condition};
    use crate::storage::RecordManager;

    #[test]
    fn test_delete_matching_rows_and_index_entries() {
        let meta = TableMeta::new("t")
            .column("k", DataType::Int)
            .column("v", DataType::Int);
        let records = RecordManager::new();
        records.create_file("t", meta.record_len()).unwrap();
        let file = records.open("t").unwrap();
        let indexes = IndexManager::new();
        let index = indexes.create("t", vec!["k".to_string()]).unwrap();

        for (k, v) in [(1, 10), (2, 20), (3, 30)] {
            let tuple =
                Tuple::from_values(&[Value::Int(k), Value::Int(v)], &meta.columns).unwrap();
            let rid = file.insert(tuple.data()).unwrap();
            index.insert(IndexKey::from_values(&[Value::Int(k)]), rid);
        }

        let ctx = test_ctx();
        let cond = Condition {
            lhs: ColumnRef::new("t", "v"),
            op: CompOp::Ge,
            rhs: CondRhs::Value(Value::Int(20)),
        };
        let scan = SeqScan::new(
            "t".to_string(),
            meta.columns.clone(),
            vec![cond],
            file.clone(),
            ctx.clone(),
        );

        let mut delete = Delete::new(
            "t".to_string(),
            meta.columns.clone(),
            Box::new(scan),
            file.clone(),
            vec![index.clone()],
            ctx,
        );
        delete.begin().unwrap();

        let summary = delete.current_tuple().unwrap();
        assert_eq!(
            summary.value(&delete.output_columns()[0]).unwrap(),
            Value::Int(2)
        );

        assert_eq!(index.len(), 1);
        let mut remaining = file.scan();
        let mut count = 0;
        while !remaining.is_end() {
            count += 1;
            remaining.next();
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_delete_nothing_when_no_match() {
        let meta = TableMeta::new("t").column("k", DataType::Int);
        let records = RecordManager::new();
        records.create_file("t", meta.record_len()).unwrap();
        let file = records.open("t").unwrap();
        let tuple = Tuple::from_values(&[Value::Int(1)], &meta.columns).unwrap();
        file.insert(tuple.data()).unwrap();

        let ctx = test_ctx();
        let cond = Condition {
            lhs: ColumnRef::new("t", "k"),
            op: CompOp::Gt,
            rhs: CondRhs::Value(Value::Int(100)),
        };
        let scan = SeqScan::new(
            "t".to_string(),
            meta.columns.clone(),
            vec![cond],
            file.clone(),
            ctx.clone(),
        );
        let mut delete = Delete::new(
            "t".to_string(),
            meta.columns.clone(),
            Box::new(scan),
            file.clone(),
            vec![],
            ctx,
        );
        delete.begin().unwrap();
        assert_eq!(
            delete
                .current_tuple()
                .unwrap()
                .value(&delete.output_columns()[0])
                .unwrap(),
            Value::Int(0)
        );
        assert!(!file.scan().is_end());
    }
}
