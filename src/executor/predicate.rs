//! Condition evaluation over record images
//!
//! Conditions reference columns by bound table and column name; evaluation
//! looks them up in the operator's output layout and compares decoded
//! values under the engine's comparison semantics.

use crate::catalog::ColumnMeta;
use crate::sql::{ColumnRef, CondRhs, Condition, Value};

use super::error::{ExecutorError, ExecutorResult};
use super::tuple::Tuple;

/// Find the column a reference names inside a record layout
pub fn find_column<'a>(
    schema: &'a [ColumnMeta],
    col: &ColumnRef,
) -> ExecutorResult<&'a ColumnMeta> {
    schema
        .iter()
        .find(|c| c.table == col.table && c.name == col.column)
        .ok_or_else(|| ExecutorError::ColumnNotFound {
            table: col.table.clone(),
            column: col.column.clone(),
        })
}

/// Evaluate one condition against a tuple
pub fn eval_condition(
    cond: &Condition,
    schema: &[ColumnMeta],
    tuple: &Tuple,
) -> ExecutorResult<bool> {
    let lhs = tuple.value(find_column(schema, &cond.lhs)?)?;
    let rhs: Value = match &cond.rhs {
        CondRhs::Value(v) => v.clone(),
        CondRhs::Column(c) => tuple.value(find_column(schema, c)?)?,
    };

    let ord = lhs
        .compare(&rhs)
        .ok_or_else(|| ExecutorError::TypeMismatch(format!("{} vs {}", lhs, rhs)))?;
    Ok(cond.op.eval(ord))
}

/// Evaluate a conjunctive condition list; an empty list is true
pub fn eval_conditions(
    conds: &[Condition],
    schema: &[ColumnMeta],
    tuple: &Tuple,
) -> ExecutorResult<bool> {
    for cond in conds {
        if !eval_condition(cond, schema, tuple)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableMeta};
    use crate::sql::CompOp;

    fn schema() -> Vec<ColumnMeta> {
        TableMeta::new("t")
            .column("id", DataType::Int)
            .column("name", DataType::Char(4))
            .columns
    }

    fn row(id: i32, name: &str) -> Tuple {
        Tuple::from_values(
            &[Value::Int(id), Value::Str(name.to_string())],
            &schema(),
        )
        .unwrap()
    }

    #[test]
    fn test_value_comparison() {
        let schema = schema();
        let cond = Condition {
            lhs: ColumnRef::new("t", "id"),
            op: CompOp::Gt,
            rhs: CondRhs::Value(Value::Int(5)),
        };
        assert!(eval_condition(&cond, &schema, &row(7, "a")).unwrap());
        assert!(!eval_condition(&cond, &schema, &row(3, "a")).unwrap());
    }

    #[test]
    fn test_char_comparison_ignores_padding() {
        let schema = schema();
        let cond = Condition {
            lhs: ColumnRef::new("t", "name"),
            op: CompOp::Eq,
            rhs: CondRhs::Value(Value::Str("ab".to_string())),
        };
        // stored value is "ab  "
        assert!(eval_condition(&cond, &schema, &row(1, "ab")).unwrap());
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let schema = schema();
        let cond = Condition {
            lhs: ColumnRef::new("t", "missing"),
            op: CompOp::Eq,
            rhs: CondRhs::Value(Value::Int(1)),
        };
        assert!(matches!(
            eval_condition(&cond, &schema, &row(1, "a")).unwrap_err(),
            ExecutorError::ColumnNotFound { .. }
        ));
    }

    #[test]
    fn test_empty_list_is_true() {
        assert!(eval_conditions(&[], &schema(), &row(1, "a")).unwrap());
    }
}
