//! EXPLAIN output formatting
//!
//! Formats plan trees for display. EXPLAIN shares the SELECT planning
//! pipeline, so the printed tree is exactly the plan a SELECT would run.

use std::fmt::Write;

use crate::planner::physical::{JoinAlgo, Plan, ScanMode};

/// Format a plan tree for EXPLAIN output
pub struct ExplainOutput;

impl ExplainOutput {
    /// Format a plan as an indented tree, one node per line
    pub fn format(plan: &Plan) -> String {
        let mut out = String::new();
        Self::format_node(plan, 0, &mut out);
        out
    }

    /// Format a plan as individual lines, for result-set shaping
    pub fn lines(plan: &Plan) -> Vec<String> {
        Self::format(plan).lines().map(|l| l.to_string()).collect()
    }

    fn format_node(plan: &Plan, indent: usize, out: &mut String) {
        let prefix = "  ".repeat(indent);

        match plan {
            Plan::Scan(scan) => {
                let name = match scan.mode {
                    ScanMode::Seq => "SeqScan",
                    ScanMode::Index => "IndexScan",
                };
                let _ = write!(out, "{}{}: {}", prefix, name, scan.table.bound_name());
                if scan.mode == ScanMode::Index {
                    let _ = write!(out, " [{}]", scan.index_cols.join(", "));
                }
                if !scan.conds.is_empty() {
                    let conds: Vec<_> = scan.conds.iter().map(|c| c.to_string()).collect();
                    let _ = write!(out, " ({})", conds.join(" AND "));
                }
                let _ = writeln!(out);
            }

            Plan::Join(join) => {
                let name = match join.algo {
                    JoinAlgo::NestedLoop => "NestedLoopJoin",
                    JoinAlgo::SortMerge => "SortMergeJoin",
                };
                let _ = writeln!(out, "{}{}", prefix, name);
                if !join.conds.is_empty() {
                    let conds: Vec<_> = join.conds.iter().map(|c| c.to_string()).collect();
                    let _ = writeln!(out, "{}  cond: {}", prefix, conds.join(" AND "));
                }
                Self::format_node(&join.left, indent + 1, out);
                Self::format_node(&join.right, indent + 1, out);
            }

            Plan::Filter { child, conds } => {
                let conds: Vec<_> = conds.iter().map(|c| c.to_string()).collect();
                let _ = writeln!(out, "{}Filter: {}", prefix, conds.join(" AND "));
                Self::format_node(child, indent + 1, out);
            }

            Plan::Project { child, columns } => {
                let cols: Vec<_> = columns.iter().map(|c| c.to_string()).collect();
                let _ = writeln!(out, "{}Project: [{}]", prefix, cols.join(", "));
                Self::format_node(child, indent + 1, out);
            }

            Plan::Sort { child, key, desc } => {
                let dir = if *desc { "DESC" } else { "ASC" };
                let _ = writeln!(out, "{}Sort: {} {}", prefix, key, dir);
                Self::format_node(child, indent + 1, out);
            }
        }
    }
}
