//! Sequential scan
//!
//! Iterates a table's records in physical order, skipping records that
//! fail its condition list, and exposes the underlying row identifier.

use std::sync::Arc;

use crate::catalog::ColumnMeta;
use crate::sql::Condition;
use crate::storage::{RecordScan, Rid, TableFile};
use crate::txn::ExecContext;

use super::error::{ExecutorError, ExecutorResult};
use super::predicate::eval_conditions;
use super::tuple::Tuple;
use super::Executor;

/// Sequential scan operator
pub struct SeqScan {
    /// Physical table name, for lock requests
    table: String,
    /// Output layout: the table schema under its bound name
    schema: Vec<ColumnMeta>,
    /// Conditions applied in-scan
    conds: Vec<Condition>,
    file: Arc<TableFile>,
    ctx: ExecContext,
    scan: Option<RecordScan>,
    current: Option<(Rid, Tuple)>,
}

impl SeqScan {
    pub fn new(
        table: String,
        schema: Vec<ColumnMeta>,
        conds: Vec<Condition>,
        file: Arc<TableFile>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            table,
            schema,
            conds,
            file,
            ctx,
            scan: None,
            current: None,
        }
    }

    /// Move the cursor forward to the next record satisfying every
    /// condition, starting at the scan's current position.
    fn seek(&mut self) -> ExecutorResult<()> {
        self.current = None;
        let scan = match self.scan.as_mut() {
            Some(scan) => scan,
            None => return Err(ExecutorError::Internal("scan not begun".to_string())),
        };
        while !scan.is_end() {
            let rid = scan.rid();
            let data = self.file.get(rid)?;
            let tuple = Tuple::new(data);
            if eval_conditions(&self.conds, &self.schema, &tuple)? {
                self.current = Some((rid, tuple));
                return Ok(());
            }
            scan.next();
        }
        Ok(())
    }
}

impl Executor for SeqScan {
    fn begin(&mut self) -> ExecutorResult<()> {
        self.ctx.lock_shared(&self.table)?;
        self.scan = Some(self.file.scan());
        self.seek()
    }

    fn next(&mut self) -> ExecutorResult<()> {
        self.ctx.check_cancelled()?;
        if self.current.is_none() {
            return Ok(());
        }
        if let Some(scan) = self.scan.as_mut() {
            scan.next();
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableMeta};
    use crate::sql::{ColumnRef, CompOp, CondRhs, Value};
    use crate::storage::RecordManager;
    use crate::txn::LockManager;
    use std::sync::atomic::AtomicBool;

    fn setup() -> (Vec<ColumnMeta>, Arc<TableFile>, ExecContext) {
        let meta = TableMeta::new("t")
            .column("id", DataType::Int)
            .column("v", DataType::Int);
        let mgr = RecordManager::new();
        mgr.create_file("t", meta.record_len()).unwrap();
        let file = mgr.open("t").unwrap();
        for (id, v) in [(1, 10), (2, 20), (3, 30)] {
            let tuple =
                Tuple::from_values(&[Value::Int(id), Value::Int(v)], &meta.columns).unwrap();
            file.insert(tuple.data()).unwrap();
        }
        let ctx = ExecContext::new(
            1,
            Arc::new(LockManager::new()),
            Arc::new(AtomicBool::new(false)),
        );
        (meta.columns, file, ctx)
    }

    #[test]
    fn test_scan_all_rows_in_physical_order() {
        let (schema, file, ctx) = setup();
        let mut scan = SeqScan::new("t".to_string(), schema.clone(), vec![], file, ctx);
        scan.begin().unwrap();

        let mut ids = Vec::new();
        while !scan.is_end() {
            let tuple = scan.current_tuple().unwrap();
            ids.push(tuple.value(&schema[0]).unwrap());
            scan.next().unwrap();
        }
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_scan_filters_in_place() {
        let (schema, file, ctx) = setup();
        let cond = Condition {
            lhs: ColumnRef::new("t", "v"),
            op: CompOp::Ge,
            rhs: CondRhs::Value(Value::Int(20)),
        };
        let mut scan = SeqScan::new("t".to_string(), schema.clone(), vec![cond], file, ctx);
        scan.begin().unwrap();

        let mut count = 0;
        while !scan.is_end() {
            count += 1;
            scan.next().unwrap();
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_rid_matches_record() {
        let (schema, file, ctx) = setup();
        let mut scan = SeqScan::new("t".to_string(), schema.clone(), vec![], file.clone(), ctx);
        scan.begin().unwrap();

        let rid = scan.current_rid().unwrap();
        let direct = file.get(rid).unwrap();
        assert_eq!(direct, scan.current_tuple().unwrap().data());
    }

    #[test]
    fn test_rewind_with_begin() {
        let (schema, file, ctx) = setup();
        let mut scan = SeqScan::new("t".to_string(), schema, vec![], file, ctx);
        scan.begin().unwrap();
        scan.next().unwrap();
        scan.begin().unwrap();
        let first = scan.current_rid().unwrap();
        assert_eq!(first, Rid::new(0, 0));
    }
}
