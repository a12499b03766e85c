//! Logical rewrites over a resolved `Query`
//!
//! Three rule families run in fixed order before physical planning:
//!
//! 1. Predicate partition - single-table conditions are grouped ahead of
//!    join conditions, in table order, so the planner can attach them to
//!    the matching scans.
//! 2. Projection pushdown - computes the needed column set per table
//!    (SELECT list, WHERE, join conditions, ORDER BY) for later per-scan
//!    projection insertion.
//! 3. Greedy join reordering - reorders the table list by estimated
//!    cardinality and join connectivity, producing the left-deep join
//!    order the planner realizes.
//!
//! The rewrites mutate the `Query` in place; its meaning is unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::catalog::Catalog;
use crate::planner::cost::TableStats;
use crate::sql::{Condition, Projections, Query};

/// Logical optimizer
pub struct Optimizer<'a> {
    catalog: &'a Catalog,
    stats: &'a dyn TableStats,
}

impl<'a> Optimizer<'a> {
    pub fn new(catalog: &'a Catalog, stats: &'a dyn TableStats) -> Self {
        Self { catalog, stats }
    }

    /// Apply all rewrites in order
    pub fn optimize(&self, query: &mut Query) {
        self.partition_predicates(query);
        self.compute_needed_columns(query);
        self.reorder_joins(query);
    }

    /// Stable-partition the condition list: single-table predicates first,
    /// grouped by their table's position in the FROM list, join predicates
    /// after.
    fn partition_predicates(&self, query: &mut Query) {
        let positions: HashMap<String, usize> = query
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.bound_name().to_string(), i))
            .collect();

        let mut conds = std::mem::take(&mut query.conds);
        conds.sort_by_key(|c| {
            let table_pos = positions.get(c.table()).copied().unwrap_or(usize::MAX);
            (!c.is_single_table(), table_pos)
        });
        query.conds = conds;
    }

    /// Compute the needed column set per table: SELECT-referenced columns,
    /// WHERE-referenced columns, join-condition columns, and the ORDER BY
    /// column. `SELECT *` needs every column of every table.
    fn compute_needed_columns(&self, query: &mut Query) {
        let mut needed: HashMap<String, BTreeSet<String>> = HashMap::new();

        match &query.projections {
            Some(Projections::Star) => {
                for table in &query.tables {
                    if let Some(meta) = self.catalog.get_table(&table.name) {
                        let set = needed.entry(table.bound_name().to_string()).or_default();
                        for col in &meta.columns {
                            set.insert(col.name.clone());
                        }
                    }
                }
            }
            Some(Projections::Columns(cols)) => {
                for col in cols {
                    needed
                        .entry(col.table.clone())
                        .or_default()
                        .insert(col.column.clone());
                }
            }
            None => {}
        }

        for cond in &query.conds {
            needed
                .entry(cond.lhs.table.clone())
                .or_default()
                .insert(cond.lhs.column.clone());
            if let Some(rhs) = cond.rhs_column() {
                needed
                    .entry(rhs.table.clone())
                    .or_default()
                    .insert(rhs.column.clone());
            }
        }

        if let Some(order) = &query.order {
            needed
                .entry(order.column.table.clone())
                .or_default()
                .insert(order.column.column.clone());
        }

        query.needed_columns = needed;
    }

    /// Greedily reorder the table list by estimated cardinality. Applies
    /// only to queries over three or more tables. Ties break by original
    /// FROM position, keeping the ordering deterministic.
    fn reorder_joins(&self, query: &mut Query) {
        let n = query.tables.len();
        if n < 3 {
            return;
        }

        let cards: Vec<usize> = query
            .tables
            .iter()
            .map(|t| self.stats.estimate_rows(&t.name))
            .collect();

        let positions: HashMap<&str, usize> = query
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.bound_name(), i))
            .collect();

        // Join graph over table positions
        let mut adjacent: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        for cond in query.conds.iter().filter(|c| !c.is_single_table()) {
            let lhs = positions.get(cond.lhs.table.as_str());
            let rhs = cond
                .rhs_column()
                .and_then(|c| positions.get(c.table.as_str()));
            if let (Some(&a), Some(&b)) = (lhs, rhs) {
                adjacent[a].insert(b);
                adjacent[b].insert(a);
            }
        }

        // Seed with the two smallest tables
        let mut by_card: Vec<usize> = (0..n).collect();
        by_card.sort_by_key(|&i| (cards[i], i));

        let mut order = vec![by_card[0], by_card[1]];
        let mut used = vec![false; n];
        used[by_card[0]] = true;
        used[by_card[1]] = true;

        // Append tables that connect to the chosen set first, smallest
        // cardinality winning; fall back to the smallest unused table when
        // nothing connects.
        while order.len() < n {
            let connects = |i: usize| adjacent[i].iter().any(|&j| used[j]);

            let next = by_card
                .iter()
                .copied()
                .find(|&i| !used[i] && connects(i))
                .or_else(|| by_card.iter().copied().find(|&i| !used[i]));

            match next {
                Some(i) => {
                    used[i] = true;
                    order.push(i);
                }
                None => break,
            }
        }

        let mut refs: Vec<Option<crate::sql::TableRef>> =
            std::mem::take(&mut query.tables).into_iter().map(Some).collect();
        query.tables = order
            .iter()
            .filter_map(|&i| refs[i].take())
            .collect();

        debug!(
            order = ?query.tables.iter().map(|t| t.bound_name()).collect::<Vec<_>>(),
            "greedy join order"
        );
    }
}

/// Split a condition list into (single-table, join) without reordering
/// inside either group.
pub fn split_conditions(conds: Vec<Condition>) -> (Vec<Condition>, Vec<Condition>) {
    conds.into_iter().partition(|c| c.is_single_table())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableMeta};
    use crate::planner::cost::StaticStats;
    use crate::sql::{ColumnRef, CompOp, CondRhs, TableRef, Value};

    fn catalog_with(tables: &[(&str, &[&str])]) -> Catalog {
        let mut catalog = Catalog::new();
        for (name, cols) in tables {
            let mut meta = TableMeta::new(*name);
            for col in *cols {
                meta = meta.column(*col, DataType::Int);
            }
            catalog.create_table(meta).unwrap();
        }
        catalog
    }

    fn join_cond(lt: &str, lc: &str, rt: &str, rc: &str) -> Condition {
        Condition {
            lhs: ColumnRef::new(lt, lc),
            op: CompOp::Eq,
            rhs: CondRhs::Column(ColumnRef::new(rt, rc)),
        }
    }

    fn value_cond(t: &str, c: &str, v: i32) -> Condition {
        Condition {
            lhs: ColumnRef::new(t, c),
            op: CompOp::Gt,
            rhs: CondRhs::Value(Value::Int(v)),
        }
    }

    #[test]
    fn test_predicate_partition_groups_singles_first() {
        let catalog = catalog_with(&[("a", &["id", "x"]), ("b", &["id", "y"])]);
        let stats = StaticStats::new();
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![TableRef::new("a"), TableRef::new("b")],
            conds: vec![
                join_cond("a", "id", "b", "id"),
                value_cond("b", "y", 5),
                value_cond("a", "x", 1),
            ],
            ..Query::default()
        };
        optimizer.partition_predicates(&mut q);

        assert!(q.conds[0].is_single_table());
        assert_eq!(q.conds[0].table(), "a");
        assert_eq!(q.conds[1].table(), "b");
        assert!(!q.conds[2].is_single_table());
    }

    #[test]
    fn test_needed_columns_union() {
        let catalog = catalog_with(&[("a", &["id", "x", "z"]), ("b", &["id", "y"])]);
        let stats = StaticStats::new();
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![TableRef::new("a"), TableRef::new("b")],
            projections: Some(Projections::Columns(vec![ColumnRef::new("a", "x")])),
            conds: vec![join_cond("a", "id", "b", "id"), value_cond("b", "y", 5)],
            order: Some(crate::sql::OrderKey {
                column: ColumnRef::new("b", "id"),
                desc: false,
            }),
            ..Query::default()
        };
        optimizer.compute_needed_columns(&mut q);

        let a: Vec<_> = q.needed_columns["a"].iter().cloned().collect();
        let b: Vec<_> = q.needed_columns["b"].iter().cloned().collect();
        assert_eq!(a, vec!["id".to_string(), "x".to_string()]);
        assert_eq!(b, vec!["id".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_star_needs_everything() {
        let catalog = catalog_with(&[("a", &["id", "x"])]);
        let stats = StaticStats::new();
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![TableRef::new("a")],
            projections: Some(Projections::Star),
            ..Query::default()
        };
        optimizer.compute_needed_columns(&mut q);
        assert_eq!(q.needed_columns["a"].len(), 2);
    }

    #[test]
    fn test_reorder_smallest_first() {
        let catalog = catalog_with(&[
            ("big", &["id"]),
            ("small", &["id"]),
            ("med", &["id"]),
        ]);
        let stats = StaticStats::new()
            .with("big", 10_000)
            .with("small", 1)
            .with("med", 100);
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![
                TableRef::new("big"),
                TableRef::new("small"),
                TableRef::new("med"),
            ],
            conds: vec![
                join_cond("big", "id", "med", "id"),
                join_cond("small", "id", "med", "id"),
            ],
            ..Query::default()
        };
        optimizer.reorder_joins(&mut q);

        let order: Vec<_> = q.tables.iter().map(|t| t.bound_name()).collect();
        assert_eq!(order, vec!["small", "med", "big"]);
    }

    #[test]
    fn test_reorder_prefers_connected_tables() {
        let catalog = catalog_with(&[
            ("a", &["id"]),
            ("b", &["id"]),
            ("c", &["id"]),
            ("d", &["id"]),
        ]);
        // c is smaller than d, but only d joins the seeded {a, b}
        let stats = StaticStats::new()
            .with("a", 10)
            .with("b", 20)
            .with("c", 30)
            .with("d", 40);
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![
                TableRef::new("a"),
                TableRef::new("b"),
                TableRef::new("c"),
                TableRef::new("d"),
            ],
            conds: vec![
                join_cond("a", "id", "b", "id"),
                join_cond("b", "id", "d", "id"),
                join_cond("d", "id", "c", "id"),
            ],
            ..Query::default()
        };
        optimizer.reorder_joins(&mut q);

        let order: Vec<_> = q.tables.iter().map(|t| t.bound_name()).collect();
        assert_eq!(order, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_two_tables_keep_from_order() {
        let catalog = catalog_with(&[("a", &["id"]), ("b", &["id"])]);
        let stats = StaticStats::new().with("a", 100).with("b", 1);
        let optimizer = Optimizer::new(&catalog, &stats);

        let mut q = Query {
            tables: vec![TableRef::new("a"), TableRef::new("b")],
            conds: vec![join_cond("a", "id", "b", "id")],
            ..Query::default()
        };
        optimizer.reorder_joins(&mut q);

        let order: Vec<_> = q.tables.iter().map(|t| t.bound_name()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
