//! Record images
//!
//! A tuple is a fixed-width byte array laid out per the producing
//! operator's column list. Int and Float fields store little-endian
//! 4-byte values; Char(n) fields store n bytes padded with spaces.

use crate::catalog::{ColumnMeta, DataType};
use crate::sql::Value;

use super::error::{ExecutorError, ExecutorResult};

/// A fixed-width record image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Concatenate two images, left bytes first
    pub fn concat(left: &Tuple, right: &Tuple) -> Tuple {
        let mut data = Vec::with_capacity(left.data.len() + right.data.len());
        data.extend_from_slice(&left.data);
        data.extend_from_slice(&right.data);
        Tuple { data }
    }

    /// Encode a value list into a record image matching `schema`
    pub fn from_values(values: &[Value], schema: &[ColumnMeta]) -> ExecutorResult<Tuple> {
        if values.len() != schema.len() {
            return Err(ExecutorError::Internal(format!(
                "{} values for {} columns",
                values.len(),
                schema.len()
            )));
        }
        let width = schema.iter().map(|c| c.len).sum();
        let mut tuple = Tuple {
            data: vec![0u8; width],
        };
        for (value, col) in values.iter().zip(schema) {
            tuple.set_value(col, value)?;
        }
        Ok(tuple)
    }

    /// Decode the field a column describes
    pub fn value(&self, col: &ColumnMeta) -> ExecutorResult<Value> {
        let bytes = self
            .data
            .get(col.offset..col.offset + col.len)
            .ok_or_else(|| {
                ExecutorError::Internal(format!(
                    "column {}.{} outside a {}-byte record",
                    col.table,
                    col.name,
                    self.data.len()
                ))
            })?;

        match col.data_type {
            DataType::Int => {
                let raw: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| ExecutorError::Internal("short int field".to_string()))?;
                Ok(Value::Int(i32::from_le_bytes(raw)))
            }
            DataType::Float => {
                let raw: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| ExecutorError::Internal("short float field".to_string()))?;
                Ok(Value::Float(f32::from_le_bytes(raw)))
            }
            DataType::Char(_) => Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned())),
        }
    }

    /// Overwrite the field a column describes
    pub fn set_value(&mut self, col: &ColumnMeta, value: &Value) -> ExecutorResult<()> {
        let slot = self
            .data
            .get_mut(col.offset..col.offset + col.len)
            .ok_or_else(|| {
                ExecutorError::Internal(format!(
                    "column {}.{} outside the record",
                    col.table, col.name
                ))
            })?;

        match (&col.data_type, value) {
            (DataType::Int, Value::Int(i)) => slot.copy_from_slice(&i.to_le_bytes()),
            (DataType::Float, Value::Float(x)) => slot.copy_from_slice(&x.to_le_bytes()),
            (DataType::Float, Value::Int(i)) => slot.copy_from_slice(&(*i as f32).to_le_bytes()),
            (DataType::Char(_), Value::Str(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > slot.len() {
                    return Err(ExecutorError::TypeMismatch(format!(
                        "'{}' does not fit {}",
                        s, col.data_type
                    )));
                }
                slot[..bytes.len()].copy_from_slice(bytes);
                slot[bytes.len()..].fill(b' ');
            }
            (ty, v) => {
                return Err(ExecutorError::TypeMismatch(format!(
                    "cannot store {} into {} column {}.{}",
                    v, ty, col.table, col.name
                )))
            }
        }
        Ok(())
    }

    /// Decode every field of a schema in order
    pub fn values(&self, schema: &[ColumnMeta]) -> ExecutorResult<Vec<Value>> {
        schema.iter().map(|col| self.value(col)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableMeta;

    fn schema() -> Vec<ColumnMeta> {
        TableMeta::new("t")
            .column("id", DataType::Int)
            .column("name", DataType::Char(4))
            .column("score", DataType::Float)
            .columns
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let schema = schema();
        let tuple = Tuple::from_values(
            &[
                Value::Int(7),
                Value::Str("ab".to_string()),
                Value::Float(1.5),
            ],
            &schema,
        )
        .unwrap();

        assert_eq!(tuple.len(), 12);
        assert_eq!(tuple.value(&schema[0]).unwrap(), Value::Int(7));
        // Char fields come back space-padded to their declared width
        assert_eq!(tuple.value(&schema[1]).unwrap(), Value::Str("ab  ".to_string()));
        assert_eq!(tuple.value(&schema[2]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_int_widens_into_float_field() {
        let schema = schema();
        let tuple = Tuple::from_values(
            &[Value::Int(1), Value::Str("x".to_string()), Value::Int(3)],
            &schema,
        )
        .unwrap();
        assert_eq!(tuple.value(&schema[2]).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_oversized_string_rejected() {
        let schema = schema();
        let err = Tuple::from_values(
            &[
                Value::Int(1),
                Value::Str("toolong".to_string()),
                Value::Float(0.0),
            ],
            &schema,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::TypeMismatch(_)));
    }

    #[test]
    fn test_concat_preserves_layout() {
        let left = Tuple::new(vec![1, 2]);
        let right = Tuple::new(vec![3]);
        assert_eq!(Tuple::concat(&left, &right).data(), &[1, 2, 3]);
    }

    #[test]
    fn test_set_value_in_place() {
        let schema = schema();
        let mut tuple = Tuple::from_values(
            &[Value::Int(1), Value::Str("a".to_string()), Value::Float(0.0)],
            &schema,
        )
        .unwrap();
        tuple.set_value(&schema[0], &Value::Int(42)).unwrap();
        assert_eq!(tuple.value(&schema[0]).unwrap(), Value::Int(42));
    }
}
