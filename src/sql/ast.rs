//! SQL abstract syntax tree
//!
//! The statement surface accepted by the engine. Parsing itself lives in the
//! embedding system; these types are the contract the resolver consumes.

use crate::catalog::DataType;
use crate::sql::query::{CompOp, Value};

/// A column reference as written: optionally qualified
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnName {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnName {
    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

/// Right-hand side of a comparison as written
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(ColumnName),
}

/// One comparison from a WHERE or ON clause
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: ColumnName,
    pub op: CompOp,
    pub rhs: Operand,
}

/// A table in the FROM list, with optional alias
#[derive(Debug, Clone, PartialEq)]
pub struct TableFactor {
    pub name: String,
    pub alias: Option<String>,
}

impl TableFactor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }
}

/// JOIN kind. The grammar parses outer joins; the planner only realizes
/// inner joins and rejects the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// An explicit `JOIN table ON conds` clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableFactor,
    pub on: Vec<Comparison>,
}

/// One item of an explicit SELECT list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub column: ColumnName,
    pub alias: Option<String>,
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

/// A SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// None means `SELECT *`
    pub projections: Option<Vec<SelectItem>>,
    pub from: Vec<TableFactor>,
    pub joins: Vec<JoinClause>,
    pub filter: Vec<Comparison>,
    pub order_by: Option<(ColumnName, OrderDir)>,
}

/// A column definition in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
}

/// Session knobs settable with `SET`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knob {
    EnableNestLoop,
    EnableSortMerge,
}

/// A parsed SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    // DDL
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        table: String,
    },
    CreateIndex {
        table: String,
        columns: Vec<String>,
    },
    DropIndex {
        table: String,
        columns: Vec<String>,
    },
    DescTable {
        table: String,
    },
    ShowTables,
    ShowIndex {
        table: String,
    },

    // DML
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        filter: Vec<Comparison>,
    },
    Update {
        table: String,
        sets: Vec<(String, Value)>,
        filter: Vec<Comparison>,
    },
    Select(SelectStmt),
    Explain(Box<Statement>),

    // Transactions
    Begin,
    Commit,
    Abort,
    Rollback,

    // Session controls
    Set {
        knob: Knob,
        value: bool,
    },
    Help,
    Exit,
}
