//! Physical planner
//!
//! Turns a resolved statement into an executable plan tree. For SELECT this
//! runs the logical rewrites, selects an access path per table, builds a
//! left-deep join tree, migrates conditions to their deepest legal
//! position, canonicalizes scan predicates into Filter nodes, and inserts
//! projection and sort nodes.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::catalog::{Catalog, TableMeta};
use crate::planner::cost::TableStats;
use crate::planner::error::{PlanError, PlanResult};
use crate::planner::optimizer::{split_conditions, Optimizer};
use crate::planner::PlannerConfig;
use crate::sql::{
    ColumnRef, CompOp, CondRhs, Condition, Projections, Query, ResolvedStatement, TableRef,
};

use super::{JoinAlgo, JoinPlan, Plan, ScanMode, ScanPlan, StatementPlan};

/// Physical planner
pub struct PhysicalPlanner<'a> {
    catalog: &'a Catalog,
    stats: &'a dyn TableStats,
    config: &'a PlannerConfig,
}

impl<'a> PhysicalPlanner<'a> {
    pub fn new(catalog: &'a Catalog, stats: &'a dyn TableStats, config: &'a PlannerConfig) -> Self {
        Self {
            catalog,
            stats,
            config,
        }
    }

    /// Plan a resolved statement
    pub fn plan(&self, stmt: ResolvedStatement) -> PlanResult<StatementPlan> {
        match stmt {
            ResolvedStatement::Select(query) => {
                Ok(StatementPlan::Select(self.plan_select(query)?))
            }
            ResolvedStatement::Explain(inner) => match self.plan(*inner)? {
                StatementPlan::Select(plan) => Ok(StatementPlan::Explain(plan)),
                _ => Err(PlanError::Unsupported(
                    "EXPLAIN requires a SELECT statement".to_string(),
                )),
            },

            ResolvedStatement::Insert { table, query } => Ok(StatementPlan::Insert {
                table,
                values: query.values,
            }),
            ResolvedStatement::Delete { table, query } => {
                let scan = self.plan_dml_scan(&table, query.conds)?;
                Ok(StatementPlan::Delete { table, scan })
            }
            ResolvedStatement::Update { table, query } => {
                let scan = self.plan_dml_scan(&table, query.conds)?;
                Ok(StatementPlan::Update {
                    table,
                    scan,
                    set_clauses: query.set_clauses,
                })
            }

            ResolvedStatement::CreateTable { table, columns } => {
                Ok(StatementPlan::CreateTable { table, columns })
            }
            ResolvedStatement::DropTable { table } => Ok(StatementPlan::DropTable { table }),
            ResolvedStatement::CreateIndex { table, columns } => {
                Ok(StatementPlan::CreateIndex { table, columns })
            }
            ResolvedStatement::DropIndex { table, columns } => {
                Ok(StatementPlan::DropIndex { table, columns })
            }
            ResolvedStatement::DescTable { table } => Ok(StatementPlan::DescTable { table }),
            ResolvedStatement::ShowTables => Ok(StatementPlan::ShowTables),
            ResolvedStatement::ShowIndex { table } => Ok(StatementPlan::ShowIndex { table }),

            ResolvedStatement::Begin => Ok(StatementPlan::Begin),
            ResolvedStatement::Commit => Ok(StatementPlan::Commit),
            ResolvedStatement::Abort => Ok(StatementPlan::Abort),
            ResolvedStatement::Rollback => Ok(StatementPlan::Rollback),
            ResolvedStatement::Set { knob, value } => {
                Ok(StatementPlan::SetConfig { knob, value })
            }
            ResolvedStatement::Help => Ok(StatementPlan::Help),
            ResolvedStatement::Exit => Ok(StatementPlan::Exit),
        }
    }

    /// Full SELECT pipeline: logical rewrites, access paths, join tree,
    /// filter canonicalization, projections, sort, root projection.
    fn plan_select(&self, mut query: Query) -> PlanResult<Plan> {
        if query.uses_outer_join {
            return Err(PlanError::OuterJoinUnsupported);
        }

        Optimizer::new(self.catalog, self.stats).optimize(&mut query);

        let tables = query.tables.clone();
        let mut scans: Vec<Option<Plan>> = Vec::with_capacity(tables.len());
        for table in &tables {
            let conds = query.take_conds_for(table.bound_name());
            scans.push(Some(self.build_scan(table.clone(), conds)?));
        }

        let join_conds = std::mem::take(&mut query.conds);
        let mut tree = self.build_join_tree(&tables, scans, join_conds)?;

        tree = self.finalize_filters(tree);
        tree = self.insert_scan_projections(tree, &query.needed_columns)?;

        if let Some(order) = query.order.take() {
            tree = Plan::Sort {
                child: Box::new(tree),
                key: order.column,
                desc: order.desc,
            };
        }

        let columns = match query.projections {
            Some(Projections::Columns(cols)) => cols,
            // The star stays symbolic until here: expand it from the plan
            // root's schema
            Some(Projections::Star) | None => tree
                .output_schema(self.catalog)?
                .iter()
                .map(|c| ColumnRef::new(c.table.clone(), c.name.clone()))
                .collect(),
        };
        Ok(Plan::Project {
            child: Box::new(tree),
            columns,
        })
    }

    /// Access-path selection for one table, given its single-table
    /// predicates. The chosen scan keeps the full predicate list; the
    /// finalization pass later splits range-defining conditions from
    /// residual ones.
    fn build_scan(&self, table: TableRef, conds: Vec<Condition>) -> PlanResult<Plan> {
        let meta = self
            .catalog
            .get_table(&table.name)
            .ok_or_else(|| PlanError::UnknownTable(table.name.clone()))?;

        let scan = match self.match_index(meta, table.bound_name(), &conds) {
            Some(index_cols) => {
                debug!(table = %table.name, key = ?index_cols, "index scan");
                ScanPlan {
                    mode: ScanMode::Index,
                    table,
                    conds,
                    index_cols,
                }
            }
            None => ScanPlan {
                mode: ScanMode::Seq,
                table,
                conds,
                index_cols: Vec::new(),
            },
        };
        Ok(Plan::Scan(scan))
    }

    /// Find an index usable for the given predicates: prefer a
    /// single-column index on any constrained column, otherwise accept a
    /// composite index whose key equals the constrained column set.
    fn match_index(
        &self,
        meta: &TableMeta,
        bound: &str,
        conds: &[Condition],
    ) -> Option<Vec<String>> {
        let mut constrained: BTreeSet<&str> = BTreeSet::new();
        for cond in conds {
            if matches!(cond.rhs, CondRhs::Value(_)) && cond.lhs.table == bound {
                constrained.insert(cond.lhs.column.as_str());
            }
        }
        if constrained.is_empty() {
            return None;
        }

        for col in &constrained {
            let key = vec![col.to_string()];
            if meta.has_index(&key) {
                return Some(key);
            }
        }

        meta.indexes
            .iter()
            .find(|ix| {
                ix.columns.len() == constrained.len()
                    && ix.columns.iter().all(|c| constrained.contains(c.as_str()))
            })
            .map(|ix| ix.columns.clone())
    }

    /// Join algorithm for one join node. Nested loop wins whenever its
    /// knob is on, and is forced when the join has no equality condition;
    /// sort-merge needs its knob and an equi-condition.
    fn choose_join_algo(&self, conds: &[Condition]) -> PlanResult<JoinAlgo> {
        if !self.config.enable_nestloop && !self.config.enable_sortmerge {
            return Err(PlanError::NoJoinAlgorithm);
        }
        let has_eq = conds.iter().any(|c| c.op == CompOp::Eq);
        if self.config.enable_nestloop || !has_eq {
            Ok(JoinAlgo::NestedLoop)
        } else {
            Ok(JoinAlgo::SortMerge)
        }
    }

    /// Build the left-deep join tree. Join conditions are consumed in an
    /// order aligned with the (reordered) table list, so the optimizer's
    /// ordering decides which tables join first. Every new table enters as
    /// the right child of a fresh join node; conditions are normalized so
    /// their lhs column lives in the left subtree.
    fn build_join_tree(
        &self,
        tables: &[TableRef],
        mut scans: Vec<Option<Plan>>,
        mut join_conds: Vec<Condition>,
    ) -> PlanResult<Plan> {
        let position = |name: &str| tables.iter().position(|t| t.bound_name() == name);

        if tables.len() == 1 {
            return scans[0]
                .take()
                .ok_or_else(|| PlanError::Internal("missing scan".to_string()));
        }

        // Consume conditions in table order: the later of a condition's two
        // tables decides when it is processed.
        join_conds.sort_by_key(|c| {
            let a = position(&c.lhs.table).unwrap_or(usize::MAX);
            let b = c
                .rhs_column()
                .and_then(|r| position(&r.table))
                .unwrap_or(usize::MAX);
            (a.max(b), a.min(b))
        });

        let mut tree: Option<Plan> = None;
        let mut stray_singles: Vec<Condition> = Vec::new();

        for cond in join_conds {
            // A condition can degenerate to single-table here only through
            // rewrites; it belongs on its scan, not on a join node.
            if cond.is_single_table() {
                stray_singles.push(cond);
                continue;
            }
            let lhs_table = cond.lhs.table.clone();
            let rhs_table = match cond.rhs_column() {
                Some(c) => c.table.clone(),
                None => continue,
            };

            match tree.take() {
                None => {
                    let li = position(&lhs_table)
                        .ok_or_else(|| PlanError::Internal(format!("table {} not in scope", lhs_table)))?;
                    let ri = position(&rhs_table)
                        .ok_or_else(|| PlanError::Internal(format!("table {} not in scope", rhs_table)))?;
                    // The earlier table becomes the left child
                    let (cond, li, ri) = if li <= ri {
                        (cond, li, ri)
                    } else {
                        (cond.swap_sides(), ri, li)
                    };
                    let left = scans[li]
                        .take()
                        .ok_or_else(|| PlanError::Internal("scan consumed twice".to_string()))?;
                    let right = scans[ri]
                        .take()
                        .ok_or_else(|| PlanError::Internal("scan consumed twice".to_string()))?;
                    let conds = vec![cond];
                    let algo = self.choose_join_algo(&conds)?;
                    tree = Some(Plan::Join(JoinPlan {
                        algo,
                        left: Box::new(left),
                        right: Box::new(right),
                        conds,
                    }));
                }
                Some(mut current) => {
                    let lhs_in = current.contains_table(&lhs_table);
                    let rhs_in = current.contains_table(&rhs_table);
                    match (lhs_in, rhs_in) {
                        // Both sides already joined: migrate the condition
                        // to the deepest join whose subtrees split its tables
                        (true, true) => {
                            Self::push_join_cond(&mut current, cond)?;
                            tree = Some(current);
                        }
                        // One new table: it becomes the right child
                        (true, false) => {
                            let scan = Self::take_scan(&mut scans, tables, &rhs_table)?;
                            tree = Some(self.attach(current, scan, cond)?);
                        }
                        (false, true) => {
                            let cond = cond.swap_sides();
                            let scan = Self::take_scan(&mut scans, tables, &lhs_table)?;
                            tree = Some(self.attach(current, scan, cond)?);
                        }
                        // Neither joined yet: cross-product the first table
                        // in, then join the second on the condition
                        (false, false) => {
                            let scan_a = Self::take_scan(&mut scans, tables, &lhs_table)?;
                            let cross = Plan::Join(JoinPlan {
                                algo: self.choose_join_algo(&[])?,
                                left: Box::new(current),
                                right: Box::new(scan_a),
                                conds: Vec::new(),
                            });
                            let scan_b = Self::take_scan(&mut scans, tables, &rhs_table)?;
                            tree = Some(self.attach(cross, scan_b, cond)?);
                        }
                    }
                }
            }
        }

        // Tables never mentioned by a join condition attach by explicit
        // cross product
        for slot in scans.iter_mut() {
            if let Some(scan) = slot.take() {
                tree = Some(match tree.take() {
                    None => scan,
                    Some(current) => Plan::Join(JoinPlan {
                        algo: self.choose_join_algo(&[])?,
                        left: Box::new(current),
                        right: Box::new(scan),
                        conds: Vec::new(),
                    }),
                });
            }
        }

        let mut tree =
            tree.ok_or_else(|| PlanError::Internal("empty join scope".to_string()))?;
        for cond in stray_singles {
            Self::push_single_to_scan(&mut tree, cond);
        }
        Ok(tree)
    }

    fn attach(&self, tree: Plan, scan: Plan, cond: Condition) -> PlanResult<Plan> {
        let conds = vec![cond];
        let algo = self.choose_join_algo(&conds)?;
        Ok(Plan::Join(JoinPlan {
            algo,
            left: Box::new(tree),
            right: Box::new(scan),
            conds,
        }))
    }

    fn take_scan(
        scans: &mut [Option<Plan>],
        tables: &[TableRef],
        name: &str,
    ) -> PlanResult<Plan> {
        let pos = tables
            .iter()
            .position(|t| t.bound_name() == name)
            .ok_or_else(|| PlanError::Internal(format!("table {} not in scope", name)))?;
        scans[pos]
            .take()
            .ok_or_else(|| PlanError::Internal("scan consumed twice".to_string()))
    }

    /// Migrate a condition over two already-joined tables down to the
    /// deepest join whose two subtrees separately contain them. Once the
    /// tables land on different sides, no deeper node can hold both, so
    /// the first splitting node is the target.
    fn push_join_cond(plan: &mut Plan, cond: Condition) -> PlanResult<()> {
        match plan {
            Plan::Join(join) => {
                let lhs_table = cond.lhs.table.clone();
                let rhs_table = cond
                    .rhs_column()
                    .map(|c| c.table.clone())
                    .ok_or_else(|| PlanError::Internal("join condition without rhs column".to_string()))?;

                if join.left.contains_table(&lhs_table) && join.left.contains_table(&rhs_table) {
                    return Self::push_join_cond(&mut join.left, cond);
                }
                if join.right.contains_table(&lhs_table) && join.right.contains_table(&rhs_table) {
                    return Self::push_join_cond(&mut join.right, cond);
                }

                let cond = if join.left.contains_table(&lhs_table) {
                    cond
                } else {
                    cond.swap_sides()
                };
                join.conds.push(cond);
                Ok(())
            }
            Plan::Filter { child, .. } | Plan::Project { child, .. } | Plan::Sort { child, .. } => {
                Self::push_join_cond(child, cond)
            }
            Plan::Scan(_) => Err(PlanError::Internal(
                "no join node splits the condition".to_string(),
            )),
        }
    }

    fn push_single_to_scan(plan: &mut Plan, cond: Condition) {
        match plan {
            Plan::Scan(scan) => {
                if scan.table.bound_name() == cond.table() {
                    scan.conds.push(cond);
                }
            }
            Plan::Join(join) => {
                if join.left.contains_table(cond.table()) {
                    Self::push_single_to_scan(&mut join.left, cond);
                } else {
                    Self::push_single_to_scan(&mut join.right, cond);
                }
            }
            Plan::Filter { child, .. } | Plan::Project { child, .. } | Plan::Sort { child, .. } => {
                Self::push_single_to_scan(child, cond);
            }
        }
    }

    /// Canonicalize the tree for execution: every scan's predicates move
    /// into a wrapping Filter node, except the conditions an index scan
    /// needs to derive its probe range (value comparisons on the leading
    /// key column, `<>` excluded). Single-table predicates that ended up on
    /// a join node sweep down into the owning side's filter.
    fn finalize_filters(&self, plan: Plan) -> Plan {
        match plan {
            Plan::Scan(mut scan) => {
                let conds = std::mem::take(&mut scan.conds);
                let (kept, residual): (Vec<_>, Vec<_>) = conds.into_iter().partition(|c| {
                    scan.mode == ScanMode::Index
                        && c.op != CompOp::Ne
                        && matches!(c.rhs, CondRhs::Value(_))
                        && scan.index_cols.first() == Some(&c.lhs.column)
                });
                scan.conds = kept;
                if residual.is_empty() {
                    Plan::Scan(scan)
                } else {
                    Plan::Filter {
                        child: Box::new(Plan::Scan(scan)),
                        conds: residual,
                    }
                }
            }

            Plan::Join(mut join) => {
                join.left = Box::new(self.finalize_filters(*join.left));
                join.right = Box::new(self.finalize_filters(*join.right));

                let (singles, joins) = split_conditions(std::mem::take(&mut join.conds));
                join.conds = joins;
                for cond in singles {
                    if join.left.contains_table(cond.table()) {
                        join.left = Box::new(Self::with_filter_cond(*join.left, cond));
                    } else {
                        join.right = Box::new(Self::with_filter_cond(*join.right, cond));
                    }
                }
                Plan::Join(join)
            }

            Plan::Filter { child, conds } => Plan::Filter {
                child: Box::new(self.finalize_filters(*child)),
                conds,
            },
            Plan::Project { child, columns } => Plan::Project {
                child: Box::new(self.finalize_filters(*child)),
                columns,
            },
            Plan::Sort { child, key, desc } => Plan::Sort {
                child: Box::new(self.finalize_filters(*child)),
                key,
                desc,
            },
        }
    }

    fn with_filter_cond(plan: Plan, cond: Condition) -> Plan {
        match plan {
            Plan::Filter { child, mut conds } => {
                conds.push(cond);
                Plan::Filter { child, conds }
            }
            other => Plan::Filter {
                child: Box::new(other),
                conds: vec![cond],
            },
        }
    }

    /// Wrap each scan whose needed column set is a strict subset of its
    /// table schema in a projection over exactly those columns, in schema
    /// order.
    fn insert_scan_projections(
        &self,
        plan: Plan,
        needed: &HashMap<String, BTreeSet<String>>,
    ) -> PlanResult<Plan> {
        Ok(match plan {
            Plan::Scan(scan) => {
                let bound = scan.table.bound_name().to_string();
                let meta = self
                    .catalog
                    .get_table(&scan.table.name)
                    .ok_or_else(|| PlanError::UnknownTable(scan.table.name.clone()))?;
                match needed.get(&bound) {
                    Some(set) if !set.is_empty() && set.len() < meta.columns.len() => {
                        let columns = meta
                            .columns
                            .iter()
                            .filter(|c| set.contains(&c.name))
                            .map(|c| ColumnRef::new(bound.clone(), c.name.clone()))
                            .collect();
                        Plan::Project {
                            child: Box::new(Plan::Scan(scan)),
                            columns,
                        }
                    }
                    _ => Plan::Scan(scan),
                }
            }

            Plan::Join(mut join) => {
                join.left = Box::new(self.insert_scan_projections(*join.left, needed)?);
                join.right = Box::new(self.insert_scan_projections(*join.right, needed)?);
                Plan::Join(join)
            }

            Plan::Filter { child, conds } => Plan::Filter {
                child: Box::new(self.insert_scan_projections(*child, needed)?),
                conds,
            },
            Plan::Project { child, columns } => Plan::Project {
                child: Box::new(self.insert_scan_projections(*child, needed)?),
                columns,
            },
            Plan::Sort { child, key, desc } => Plan::Sort {
                child: Box::new(self.insert_scan_projections(*child, needed)?),
                key,
                desc,
            },
        })
    }

    /// Access path for the scan beneath a DELETE or UPDATE. The scan keeps
    /// the WHERE predicates and applies them itself; no Filter node is
    /// inserted on the DML path.
    fn plan_dml_scan(&self, table: &str, conds: Vec<Condition>) -> PlanResult<Plan> {
        self.build_scan(TableRef::new(table), conds)
    }
}
