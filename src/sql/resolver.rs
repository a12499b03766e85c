//! Name resolution against the catalog
//!
//! The resolver takes parsed SQL statements and resolves:
//! - Table references (with aliases) to catalog definitions
//! - Column references to bound `(table, column)` pairs
//! - INSERT/UPDATE values against the target table schema
//!
//! Its output is a `ResolvedStatement`; query-shaped statements carry a
//! `Query` value for the planner.

use crate::catalog::{Catalog, TableMeta};
use crate::sql::ast::*;
use crate::sql::error::{SqlError, SqlResult};
use crate::sql::query::*;

/// A resolved statement, ready for planning
#[derive(Debug, Clone)]
pub enum ResolvedStatement {
    Select(Query),
    Insert { table: String, query: Query },
    Delete { table: String, query: Query },
    Update { table: String, query: Query },
    Explain(Box<ResolvedStatement>),

    CreateTable { table: String, columns: Vec<ColumnSpec> },
    DropTable { table: String },
    CreateIndex { table: String, columns: Vec<String> },
    DropIndex { table: String, columns: Vec<String> },
    DescTable { table: String },
    ShowTables,
    ShowIndex { table: String },

    Begin,
    Commit,
    Abort,
    Rollback,
    Set { knob: Knob, value: bool },
    Help,
    Exit,
}

/// Name resolver
pub struct Resolver<'a> {
    catalog: &'a Catalog,
}

/// Tables visible to column references in one statement
struct Scope<'a> {
    tables: Vec<(String, &'a TableMeta)>,
}

impl<'a> Scope<'a> {
    fn single(bound: &str, meta: &'a TableMeta) -> Self {
        Scope {
            tables: vec![(bound.to_string(), meta)],
        }
    }

    fn lookup_bound(&self, name: &str) -> Option<&'a TableMeta> {
        self.tables
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, meta)| *meta)
    }
}

impl<'a> Resolver<'a> {
    /// Create a new resolver
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve a statement
    pub fn resolve(&self, stmt: Statement) -> SqlResult<ResolvedStatement> {
        match stmt {
            Statement::Select(select) => Ok(ResolvedStatement::Select(self.resolve_select(select)?)),
            Statement::Insert { table, values } => self.resolve_insert(table, values),
            Statement::Delete { table, filter } => self.resolve_delete(table, filter),
            Statement::Update { table, sets, filter } => self.resolve_update(table, sets, filter),
            Statement::Explain(inner) => Ok(ResolvedStatement::Explain(Box::new(
                self.resolve(*inner)?,
            ))),

            Statement::CreateTable { table, columns } => {
                self.resolve_create_table(table, columns)
            }
            Statement::DropTable { table } => {
                self.require_table(&table)?;
                Ok(ResolvedStatement::DropTable { table })
            }
            Statement::CreateIndex { table, columns } => {
                let meta = self.require_table(&table)?;
                for col in &columns {
                    if meta.get_column(col).is_none() {
                        return Err(SqlError::ColumnNotFound(col.clone()));
                    }
                }
                Ok(ResolvedStatement::CreateIndex { table, columns })
            }
            Statement::DropIndex { table, columns } => {
                self.require_table(&table)?;
                Ok(ResolvedStatement::DropIndex { table, columns })
            }
            Statement::DescTable { table } => {
                self.require_table(&table)?;
                Ok(ResolvedStatement::DescTable { table })
            }
            Statement::ShowTables => Ok(ResolvedStatement::ShowTables),
            Statement::ShowIndex { table } => {
                self.require_table(&table)?;
                Ok(ResolvedStatement::ShowIndex { table })
            }

            Statement::Begin => Ok(ResolvedStatement::Begin),
            Statement::Commit => Ok(ResolvedStatement::Commit),
            Statement::Abort => Ok(ResolvedStatement::Abort),
            Statement::Rollback => Ok(ResolvedStatement::Rollback),
            Statement::Set { knob, value } => Ok(ResolvedStatement::Set { knob, value }),
            Statement::Help => Ok(ResolvedStatement::Help),
            Statement::Exit => Ok(ResolvedStatement::Exit),
        }
    }

    fn require_table(&self, name: &str) -> SqlResult<&'a TableMeta> {
        self.catalog
            .get_table(name)
            .ok_or_else(|| SqlError::TableNotFound(name.to_string()))
    }

    fn resolve_create_table(
        &self,
        table: String,
        columns: Vec<ColumnSpec>,
    ) -> SqlResult<ResolvedStatement> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(SqlError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(ResolvedStatement::CreateTable { table, columns })
    }

    /// Resolve a SELECT statement into a Query
    fn resolve_select(&self, select: SelectStmt) -> SqlResult<Query> {
        let mut tables = Vec::new();
        let mut uses_outer_join = false;

        for factor in &select.from {
            tables.push(self.bind_table(factor)?);
        }
        for join in &select.joins {
            if join.kind != JoinKind::Inner {
                uses_outer_join = true;
            }
            tables.push(self.bind_table(&join.table)?);
        }

        let scope = self.build_scope(&tables)?;

        let projections = match select.projections {
            None => Projections::Star,
            Some(items) => {
                let mut cols = Vec::with_capacity(items.len());
                for item in items {
                    let mut col = self.resolve_column(&item.column, &scope)?;
                    col.output_alias = item.alias;
                    cols.push(col);
                }
                Projections::Columns(cols)
            }
        };

        let mut conds = Vec::new();
        for join in &select.joins {
            for cmp in &join.on {
                conds.push(self.resolve_comparison(cmp, &scope)?);
            }
        }
        for cmp in &select.filter {
            conds.push(self.resolve_comparison(cmp, &scope)?);
        }

        let order = match select.order_by {
            None => None,
            Some((col, dir)) => Some(OrderKey {
                column: self.resolve_column(&col, &scope)?,
                desc: dir == OrderDir::Desc,
            }),
        };

        Ok(Query {
            tables,
            projections: Some(projections),
            conds,
            order,
            uses_outer_join,
            ..Query::default()
        })
    }

    /// Resolve an INSERT: the value list must match the table schema in
    /// arity and type; Int literals widen into Float columns and Char
    /// values are validated against the declared width.
    fn resolve_insert(&self, table: String, values: Vec<Value>) -> SqlResult<ResolvedStatement> {
        let meta = self.require_table(&table)?;

        if values.len() != meta.columns.len() {
            return Err(SqlError::ValueCountMismatch {
                expected: meta.columns.len(),
                got: values.len(),
            });
        }

        let mut resolved = Vec::with_capacity(values.len());
        for (value, col) in values.into_iter().zip(&meta.columns) {
            if !value.fits(&col.data_type) {
                return Err(SqlError::TypeMismatch {
                    column: col.name.clone(),
                    expected: col.data_type,
                });
            }
            resolved.push(value.coerced(&col.data_type));
        }

        let query = Query {
            tables: vec![TableRef::new(table.clone())],
            values: resolved,
            ..Query::default()
        };
        Ok(ResolvedStatement::Insert { table, query })
    }

    fn resolve_delete(&self, table: String, filter: Vec<Comparison>) -> SqlResult<ResolvedStatement> {
        let meta = self.require_table(&table)?;
        let scope = Scope::single(&table, meta);

        let mut conds = Vec::with_capacity(filter.len());
        for cmp in &filter {
            conds.push(self.resolve_comparison(cmp, &scope)?);
        }

        let query = Query {
            tables: vec![TableRef::new(table.clone())],
            conds,
            ..Query::default()
        };
        Ok(ResolvedStatement::Delete { table, query })
    }

    fn resolve_update(
        &self,
        table: String,
        sets: Vec<(String, Value)>,
        filter: Vec<Comparison>,
    ) -> SqlResult<ResolvedStatement> {
        let meta = self.require_table(&table)?;
        let scope = Scope::single(&table, meta);

        let mut set_clauses = Vec::with_capacity(sets.len());
        for (column, value) in sets {
            let col = meta
                .get_column(&column)
                .ok_or_else(|| SqlError::ColumnNotFound(column.clone()))?;
            if !value.fits(&col.data_type) {
                return Err(SqlError::TypeMismatch {
                    column: column.clone(),
                    expected: col.data_type,
                });
            }
            set_clauses.push(SetClause {
                column,
                value: value.coerced(&col.data_type),
            });
        }

        let mut conds = Vec::with_capacity(filter.len());
        for cmp in &filter {
            conds.push(self.resolve_comparison(cmp, &scope)?);
        }

        let query = Query {
            tables: vec![TableRef::new(table.clone())],
            conds,
            set_clauses,
            ..Query::default()
        };
        Ok(ResolvedStatement::Update { table, query })
    }

    fn bind_table(&self, factor: &TableFactor) -> SqlResult<TableRef> {
        self.require_table(&factor.name)?;
        Ok(TableRef {
            name: factor.name.clone(),
            alias: factor.alias.clone(),
        })
    }

    fn build_scope(&self, tables: &[TableRef]) -> SqlResult<Scope<'a>> {
        let mut scope = Scope { tables: Vec::new() };
        for table in tables {
            let bound = table.bound_name();
            if scope.lookup_bound(bound).is_some() {
                return Err(SqlError::DuplicateTable(bound.to_string()));
            }
            let meta = self.require_table(&table.name)?;
            scope.tables.push((bound.to_string(), meta));
        }
        Ok(scope)
    }

    /// Bind a written column name inside a scope. Qualifiers name either a
    /// base table or a declared alias; bare names are only legal when a
    /// single table is in scope.
    fn resolve_column(&self, name: &ColumnName, scope: &Scope<'a>) -> SqlResult<ColumnRef> {
        match &name.table {
            Some(qualifier) => {
                let meta = scope
                    .lookup_bound(qualifier)
                    .ok_or_else(|| SqlError::TableNotFound(qualifier.clone()))?;
                if meta.get_column(&name.column).is_none() {
                    return Err(SqlError::ColumnNotFound(name.column.clone()));
                }
                Ok(ColumnRef::new(qualifier.clone(), name.column.clone()))
            }
            None => {
                let candidates: Vec<&str> = scope
                    .tables
                    .iter()
                    .filter(|(_, meta)| meta.get_column(&name.column).is_some())
                    .map(|(bound, _)| bound.as_str())
                    .collect();

                match (scope.tables.len(), candidates.len()) {
                    (_, 0) => Err(SqlError::ColumnNotFound(name.column.clone())),
                    (1, _) => Ok(ColumnRef::new(
                        candidates[0].to_string(),
                        name.column.clone(),
                    )),
                    (_, 1) => Err(SqlError::UnqualifiedColumn(name.column.clone())),
                    _ => Err(SqlError::AmbiguousColumn(name.column.clone())),
                }
            }
        }
    }

    fn resolve_comparison(&self, cmp: &Comparison, scope: &Scope<'a>) -> SqlResult<Condition> {
        let lhs = self.resolve_column(&cmp.lhs, scope)?;
        let lhs_type = scope
            .lookup_bound(&lhs.table)
            .and_then(|meta| meta.get_column(&lhs.column))
            .map(|c| c.data_type)
            .ok_or_else(|| SqlError::ColumnNotFound(lhs.column.clone()))?;

        let rhs = match &cmp.rhs {
            Operand::Value(value) => {
                let comparable = match value {
                    Value::Int(_) | Value::Float(_) => lhs_type.is_numeric(),
                    Value::Str(_) => matches!(lhs_type, crate::catalog::DataType::Char(_)),
                    Value::Bool(_) => false,
                };
                if !comparable {
                    return Err(SqlError::IncomparableTypes(format!(
                        "{} {} {}",
                        lhs, cmp.op, value
                    )));
                }
                CondRhs::Value(value.clone())
            }
            Operand::Column(col) => {
                let rhs = self.resolve_column(col, scope)?;
                let rhs_type = scope
                    .lookup_bound(&rhs.table)
                    .and_then(|meta| meta.get_column(&rhs.column))
                    .map(|c| c.data_type)
                    .ok_or_else(|| SqlError::ColumnNotFound(rhs.column.clone()))?;
                let comparable = (lhs_type.is_numeric() && rhs_type.is_numeric())
                    || matches!(
                        (lhs_type, rhs_type),
                        (
                            crate::catalog::DataType::Char(_),
                            crate::catalog::DataType::Char(_)
                        )
                    );
                if !comparable {
                    return Err(SqlError::IncomparableTypes(format!(
                        "{} {} {}",
                        lhs, cmp.op, rhs
                    )));
                }
                CondRhs::Column(rhs)
            }
        };

        Ok(Condition {
            lhs,
            op: cmp.op,
            rhs,
        })
    }
}
