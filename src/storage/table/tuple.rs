use serde::{Deserialize, Serialize};

use crate::catalog::schema::Schema;
use crate::catalog::value::Value;

/// A materialized row: one value per schema column, serialized with bincode
/// for heap storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.values)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        Ok(Self {
            values: bincode::deserialize(bytes)?,
        })
    }

    /// Project the key columns out of this tuple, in key-schema order.
    pub fn key_from_tuple(&self, key_attrs: &[usize]) -> Tuple {
        Tuple::new(key_attrs.iter().map(|&i| self.values[i].clone()).collect())
    }

    /// Sanity check against a schema: arity must match.
    pub fn conforms_to(&self, schema: &Schema) -> bool {
        self.values.len() == schema.column_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::Column;
    use crate::catalog::value::DataType;

    #[test]
    fn test_tuple_round_trip() {
        let tuple = Tuple::new(vec![
            Value::Integer(42),
            Value::Text("hello".into()),
            Value::Boolean(false),
            Value::Null,
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }

    #[test]
    fn test_key_projection() {
        let tuple = Tuple::new(vec![
            Value::Integer(1),
            Value::Text("a".into()),
            Value::Integer(9),
        ]);
        let key = tuple.key_from_tuple(&[2, 0]);
        assert_eq!(key.values(), &[Value::Integer(9), Value::Integer(1)]);
    }

    #[test]
    fn test_conforms_to() {
        let schema = Schema::new(vec![Column::new("id", DataType::Integer)]);
        assert!(Tuple::new(vec![Value::Integer(1)]).conforms_to(&schema));
        assert!(!Tuple::new(vec![]).conforms_to(&schema));
    }
}
