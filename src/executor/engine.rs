//! Statement execution engine
//!
//! Builds operator trees from plans and dispatches whole statements:
//! result sets for SELECT/EXPLAIN/SHOW/DESC, rows-affected summaries for
//! DML, acknowledgements for DDL, transactions, and session controls.
//! Conflict and cancellation failures abort the open transaction; other
//! errors leave it open for the client to decide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::catalog::{Catalog, ColumnMeta, TableMeta};
use crate::error::{Error, Result};
use crate::index::IndexManager;
use crate::planner::{ExplainOutput, PhysicalPlanner, Plan, PlannerConfig, StatementPlan};
use crate::planner::physical::{JoinAlgo, ScanMode, ScanPlan};
use crate::sql::ast::Knob;
use crate::sql::{Resolver, SetClause, Statement, Value};
use crate::storage::{RecordManager, StorageError};
use crate::txn::{ExecContext, LockManager, TxnError, TxnId};

use super::delete::Delete;
use super::error::{ExecutorError, ExecutorResult};
use super::filter::Filter;
use super::index_scan::IndexScan;
use super::insert::Insert;
use super::merge_join::SortMergeJoin;
use super::nested_loop_join::NestedLoopJoin;
use super::project::Project;
use super::seq_scan::SeqScan;
use super::sort::Sort;
use super::tuple::Tuple;
use super::update::Update;
use super::{index_key_for, Executor};

const HELP_TEXT: &str = "\
Supported statements:
  CREATE TABLE t (col type, ...);   DROP TABLE t;
  CREATE INDEX t (c1, ...);         DROP INDEX t (c1, ...);
  DESC t;  SHOW TABLES;  SHOW INDEX FROM t;
  INSERT INTO t VALUES (v, ...);
  DELETE FROM t [WHERE ...];
  UPDATE t SET c = v, ... [WHERE ...];
  SELECT [* | cols] FROM t [, t2 | JOIN t2 ON ...] [WHERE ...] [ORDER BY col [ASC|DESC]];
  BEGIN; COMMIT; ABORT; ROLLBACK;
  SET enable_nestloop = {true|false};  SET enable_sortmerge = {true|false};
  EXPLAIN stmt;  HELP;  EXIT;";

/// The shape a finished statement hands back to the client
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Result set: column headers plus decoded rows
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// DML summary
    Affected(u64),
    /// DDL / transaction / control acknowledgement
    Ack(String),
    /// Session end requested
    Exit,
}

/// One session's execution engine
pub struct QueryEngine {
    catalog: Arc<RwLock<Catalog>>,
    records: Arc<RecordManager>,
    indexes: Arc<IndexManager>,
    locks: Arc<LockManager>,
    config: PlannerConfig,
    cancel: Arc<AtomicBool>,
    current_txn: Option<TxnId>,
    next_txn: TxnId,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::new())),
            records: Arc::new(RecordManager::new()),
            indexes: Arc::new(IndexManager::new()),
            locks: Arc::new(LockManager::new()),
            config: PlannerConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            current_txn: None,
            next_txn: 0,
        }
    }

    /// Flag another thread can raise to cancel the running statement
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Current planner knobs
    pub fn config(&self) -> PlannerConfig {
        self.config
    }

    /// Resolve, plan, and execute one statement
    pub fn execute(&mut self, stmt: Statement) -> Result<QueryResult> {
        let plan = {
            let catalog = self.catalog.read();
            let resolved = Resolver::new(&catalog).resolve(stmt)?;
            PhysicalPlanner::new(&catalog, self.records.as_ref(), &self.config).plan(resolved)?
        };

        let result = self.dispatch(plan);
        if matches!(result, Err(Error::Cancelled) | Err(Error::Conflict(_))) {
            self.abort_open_txn();
        }
        self.cancel.store(false, Ordering::Relaxed);
        result
    }

    fn dispatch(&mut self, plan: StatementPlan) -> Result<QueryResult> {
        match plan {
            StatementPlan::Select(plan) => self.run_select(plan),
            StatementPlan::Explain(plan) => {
                debug!("explain only, plan not executed");
                let rows = ExplainOutput::lines(&plan)
                    .into_iter()
                    .map(|line| vec![Value::Str(line)])
                    .collect();
                Ok(QueryResult::Rows {
                    columns: vec!["Query Plan".to_string()],
                    rows,
                })
            }

            StatementPlan::Insert { table, values } => self.run_insert(table, values),
            StatementPlan::Delete { table, scan } => self.run_delete(table, scan),
            StatementPlan::Update {
                table,
                scan,
                set_clauses,
            } => self.run_update(table, scan, set_clauses),

            StatementPlan::CreateTable { table, columns } => {
                let mut meta = TableMeta::new(&table);
                for spec in columns {
                    meta = meta.column(spec.name, spec.data_type);
                }
                let record_len = meta.record_len();
                self.catalog
                    .write()
                    .create_table(meta)
                    .map_err(crate::sql::SqlError::from)?;
                self.records.create_file(&table, record_len)?;
                Ok(QueryResult::Ack(format!("Table '{}' created", table)))
            }

            StatementPlan::DropTable { table } => {
                self.catalog
                    .write()
                    .drop_table(&table)
                    .map_err(crate::sql::SqlError::from)?;
                self.records.drop_file(&table)?;
                self.indexes.drop_all(&table);
                Ok(QueryResult::Ack(format!("Table '{}' dropped", table)))
            }

            StatementPlan::CreateIndex { table, columns } => {
                self.catalog
                    .write()
                    .create_index(&table, columns.clone())
                    .map_err(crate::sql::SqlError::from)?;
                let index = self.indexes.create(&table, columns.clone())?;

                // backfill from the heap
                let schema = self.table_schema(&table)?;
                let file = self.records.open(&table)?;
                let mut scan = file.scan();
                while !scan.is_end() {
                    let rid = scan.rid();
                    let tuple = Tuple::new(file.get(rid)?);
                    let key = index_key_for(&tuple, &schema, &columns)
                        .map_err(|e| Error::Internal(e.to_string()))?;
                    index.insert(key, rid);
                    scan.next();
                }
                Ok(QueryResult::Ack(format!(
                    "Index on {}({}) created",
                    table,
                    columns.join(", ")
                )))
            }

            StatementPlan::DropIndex { table, columns } => {
                self.catalog
                    .write()
                    .drop_index(&table, &columns)
                    .map_err(crate::sql::SqlError::from)?;
                IndexManager::drop(&self.indexes, &table, &columns)?;
                Ok(QueryResult::Ack(format!(
                    "Index on {}({}) dropped",
                    table,
                    columns.join(", ")
                )))
            }

            StatementPlan::DescTable { table } => {
                let schema = self.table_schema(&table)?;
                let rows = schema
                    .iter()
                    .map(|c| {
                        vec![
                            Value::Str(c.name.clone()),
                            Value::Str(c.data_type.to_string()),
                        ]
                    })
                    .collect();
                Ok(QueryResult::Rows {
                    columns: vec!["Field".to_string(), "Type".to_string()],
                    rows,
                })
            }

            StatementPlan::ShowTables => {
                let rows = self
                    .catalog
                    .read()
                    .table_names()
                    .into_iter()
                    .map(|name| vec![Value::Str(name)])
                    .collect();
                Ok(QueryResult::Rows {
                    columns: vec!["Tables".to_string()],
                    rows,
                })
            }

            StatementPlan::ShowIndex { table } => {
                let catalog = self.catalog.read();
                let meta = catalog
                    .get_table(&table)
                    .ok_or_else(|| crate::sql::SqlError::TableNotFound(table.clone()))?;
                let rows = meta
                    .indexes
                    .iter()
                    .map(|ix| {
                        vec![
                            Value::Str(ix.table.clone()),
                            Value::Str(ix.columns.join(", ")),
                        ]
                    })
                    .collect();
                Ok(QueryResult::Rows {
                    columns: vec!["Table".to_string(), "Key".to_string()],
                    rows,
                })
            }

            StatementPlan::Begin => {
                if self.current_txn.is_some() {
                    return Err(TxnError::AlreadyInTransaction.into());
                }
                self.next_txn += 1;
                self.current_txn = Some(self.next_txn);
                Ok(QueryResult::Ack("Transaction started".to_string()))
            }
            StatementPlan::Commit => match self.current_txn.take() {
                Some(txn) => {
                    self.locks.release_all(txn);
                    Ok(QueryResult::Ack("Transaction committed".to_string()))
                }
                None => Err(TxnError::NoTransaction.into()),
            },
            StatementPlan::Abort | StatementPlan::Rollback => match self.current_txn.take() {
                Some(txn) => {
                    self.locks.release_all(txn);
                    Ok(QueryResult::Ack("Transaction aborted".to_string()))
                }
                None => Err(TxnError::NoTransaction.into()),
            },

            StatementPlan::SetConfig { knob, value } => {
                let name = match knob {
                    Knob::EnableNestLoop => {
                        self.config.enable_nestloop = value;
                        "enable_nestloop"
                    }
                    Knob::EnableSortMerge => {
                        self.config.enable_sortmerge = value;
                        "enable_sortmerge"
                    }
                };
                Ok(QueryResult::Ack(format!("{} = {}", name, value)))
            }
            StatementPlan::Help => Ok(QueryResult::Ack(HELP_TEXT.to_string())),
            StatementPlan::Exit => Ok(QueryResult::Exit),
        }
    }

    // ---- query execution -------------------------------------------------

    fn run_select(&mut self, plan: Plan) -> Result<QueryResult> {
        let headers = match &plan {
            Plan::Project { columns, .. } => columns
                .iter()
                .map(|c| {
                    c.output_alias
                        .clone()
                        .unwrap_or_else(|| c.to_string())
                })
                .collect(),
            _ => Vec::new(),
        };

        let (ctx, auto_commit) = self.statement_ctx();
        let outcome = (|| -> Result<QueryResult> {
            let mut exec = self.build_executor(plan, &ctx)?;
            exec.begin()?;
            let schema = exec.output_columns().to_vec();
            let headers = if headers.is_empty() {
                schema
                    .iter()
                    .map(|c| format!("{}.{}", c.table, c.name))
                    .collect()
            } else {
                headers
            };

            let mut rows = Vec::new();
            while !exec.is_end() {
                let tuple = exec.current_tuple().map_err(Error::from)?;
                rows.push(tuple.values(&schema).map_err(Error::from)?);
                exec.next()?;
            }
            Ok(QueryResult::Rows {
                columns: headers,
                rows,
            })
        })();
        self.end_statement(ctx.txn_id(), auto_commit);
        outcome
    }

    fn run_insert(&mut self, table: String, values: Vec<Value>) -> Result<QueryResult> {
        let schema = self.table_schema(&table)?;
        let file = self.records.open(&table)?;
        let indexes = self.indexes.indexes_on(&table);

        let (ctx, auto_commit) = self.statement_ctx();
        let outcome = (|| -> Result<QueryResult> {
            let mut op = Insert::new(table, schema, values, file, indexes, ctx.clone());
            op.begin()?;
            Ok(QueryResult::Affected(read_summary(&op)?))
        })();
        self.end_statement(ctx.txn_id(), auto_commit);
        outcome
    }

    fn run_delete(&mut self, table: String, scan: Plan) -> Result<QueryResult> {
        let schema = self.table_schema(&table)?;
        let file = self.records.open(&table)?;
        let indexes = self.indexes.indexes_on(&table);

        let (ctx, auto_commit) = self.statement_ctx();
        let outcome = (|| -> Result<QueryResult> {
            let child = self.build_executor(scan, &ctx)?;
            let mut op = Delete::new(table, schema, child, file, indexes, ctx.clone());
            op.begin()?;
            Ok(QueryResult::Affected(read_summary(&op)?))
        })();
        self.end_statement(ctx.txn_id(), auto_commit);
        outcome
    }

    fn run_update(
        &mut self,
        table: String,
        scan: Plan,
        set_clauses: Vec<SetClause>,
    ) -> Result<QueryResult> {
        let schema = self.table_schema(&table)?;
        let file = self.records.open(&table)?;
        let indexes = self.indexes.indexes_on(&table);

        let (ctx, auto_commit) = self.statement_ctx();
        let outcome = (|| -> Result<QueryResult> {
            let child = self.build_executor(scan, &ctx)?;
            let mut op = Update::new(
                table,
                schema,
                child,
                set_clauses,
                file,
                indexes,
                ctx.clone(),
            )?;
            op.begin()?;
            Ok(QueryResult::Affected(read_summary(&op)?))
        })();
        self.end_statement(ctx.txn_id(), auto_commit);
        outcome
    }

    // ---- executor construction -------------------------------------------

    fn build_executor(&self, plan: Plan, ctx: &ExecContext) -> ExecutorResult<Box<dyn Executor>> {
        match plan {
            Plan::Scan(scan) => self.build_scan(scan, ctx),

            Plan::Join(join) => {
                let left = self.build_executor(*join.left, ctx)?;
                let right = self.build_executor(*join.right, ctx)?;
                match join.algo {
                    JoinAlgo::NestedLoop => Ok(Box::new(NestedLoopJoin::new(
                        left,
                        right,
                        join.conds,
                        ctx.clone(),
                    ))),
                    JoinAlgo::SortMerge => Ok(Box::new(SortMergeJoin::new(
                        left,
                        right,
                        join.conds,
                        ctx.clone(),
                    )?)),
                }
            }

            Plan::Filter { child, conds } => {
                let child = self.build_executor(*child, ctx)?;
                Ok(Box::new(Filter::new(child, conds)))
            }

            Plan::Project { child, columns } => {
                let child = self.build_executor(*child, ctx)?;
                Ok(Box::new(Project::new(child, columns)?))
            }

            Plan::Sort { child, key, desc } => {
                let child = self.build_executor(*child, ctx)?;
                Ok(Box::new(Sort::new(child, key, desc, ctx.clone())))
            }
        }
    }

    fn build_scan(&self, scan: ScanPlan, ctx: &ExecContext) -> ExecutorResult<Box<dyn Executor>> {
        let catalog = self.catalog.read();
        let meta = catalog.get_table(&scan.table.name).ok_or_else(|| {
            ExecutorError::Storage(StorageError::TableNotFound(scan.table.name.clone()))
        })?;
        let bound = scan.table.bound_name();
        let schema: Vec<ColumnMeta> = meta
            .columns
            .iter()
            .map(|c| ColumnMeta {
                table: bound.to_string(),
                ..c.clone()
            })
            .collect();
        drop(catalog);

        let file = self.records.open(&scan.table.name)?;
        match scan.mode {
            ScanMode::Seq => Ok(Box::new(SeqScan::new(
                scan.table.name.clone(),
                schema,
                scan.conds,
                file,
                ctx.clone(),
            ))),
            ScanMode::Index => {
                let index = self
                    .indexes
                    .get(&scan.table.name, &scan.index_cols)
                    .ok_or_else(|| {
                        ExecutorError::Storage(StorageError::IndexNotFound {
                            table: scan.table.name.clone(),
                            columns: scan.index_cols.clone(),
                        })
                    })?;
                Ok(Box::new(IndexScan::new(
                    scan.table.name.clone(),
                    schema,
                    scan.conds,
                    file,
                    index,
                    ctx.clone(),
                )))
            }
        }
    }

    // ---- session bookkeeping ---------------------------------------------

    fn table_schema(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let catalog = self.catalog.read();
        let meta = catalog
            .get_table(table)
            .ok_or_else(|| crate::sql::SqlError::TableNotFound(table.to_string()))?;
        Ok(meta.columns.clone())
    }

    /// Context for the next statement: the open transaction, or a fresh
    /// auto-commit transaction covering just this statement
    fn statement_ctx(&mut self) -> (ExecContext, bool) {
        match self.current_txn {
            Some(txn) => (
                ExecContext::new(txn, self.locks.clone(), self.cancel.clone()),
                false,
            ),
            None => {
                self.next_txn += 1;
                (
                    ExecContext::new(self.next_txn, self.locks.clone(), self.cancel.clone()),
                    true,
                )
            }
        }
    }

    /// Auto-commit statements release their locks when they finish;
    /// explicit transactions hold them until COMMIT or ABORT
    fn end_statement(&mut self, txn: TxnId, auto_commit: bool) {
        if auto_commit {
            self.locks.release_all(txn);
        }
    }

    fn abort_open_txn(&mut self) {
        if let Some(txn) = self.current_txn.take() {
            debug!(txn, "aborting transaction");
            self.locks.release_all(txn);
        }
    }
}

fn read_summary(op: &dyn Executor) -> Result<u64> {
    let tuple = op.current_tuple().map_err(Error::from)?;
    match tuple.value(&op.output_columns()[0]).map_err(Error::from)? {
        Value::Int(n) => Ok(n as u64),
        other => Err(Error::Internal(format!("bad DML summary: {}", other))),
    }
}
