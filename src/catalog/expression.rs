// Expression Evaluation
//
// Minimal expression tree consumed by the executors: column references
// (side-aware for joins), literals, and comparisons.

use crate::catalog::schema::Schema;
use crate::catalog::value::Value;
use crate::storage::table::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone)]
pub enum Expression {
    /// A column of an input tuple. `tuple_index` is 0 for the only/left
    /// input and 1 for the right input of a join evaluation.
    ColumnRef {
        tuple_index: usize,
        column_index: usize,
    },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(column_index: usize) -> Self {
        Expression::ColumnRef {
            tuple_index: 0,
            column_index,
        }
    }

    pub fn join_column(tuple_index: usize, column_index: usize) -> Self {
        Expression::ColumnRef {
            tuple_index,
            column_index,
        }
    }

    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a single tuple and its schema.
    pub fn evaluate(&self, tuple: &Tuple, schema: &Schema) -> Value {
        match self {
            Expression::ColumnRef { column_index, .. } => {
                debug_assert!(*column_index < schema.column_count());
                tuple.value(*column_index).clone()
            }
            Expression::Literal(value) => value.clone(),
            Expression::Compare { op, left, right } => {
                let lhs = left.evaluate(tuple, schema);
                let rhs = right.evaluate(tuple, schema);
                Self::compare_values(*op, &lhs, &rhs)
            }
        }
    }

    /// Evaluate against a pair of tuples; column references pick their side
    /// by `tuple_index`.
    pub fn evaluate_join(
        &self,
        left_tuple: &Tuple,
        left_schema: &Schema,
        right_tuple: &Tuple,
        right_schema: &Schema,
    ) -> Value {
        match self {
            Expression::ColumnRef {
                tuple_index,
                column_index,
            } => {
                if *tuple_index == 0 {
                    debug_assert!(*column_index < left_schema.column_count());
                    left_tuple.value(*column_index).clone()
                } else {
                    debug_assert!(*column_index < right_schema.column_count());
                    right_tuple.value(*column_index).clone()
                }
            }
            Expression::Literal(value) => value.clone(),
            Expression::Compare { op, left, right } => {
                let lhs = left.evaluate_join(left_tuple, left_schema, right_tuple, right_schema);
                let rhs = right.evaluate_join(left_tuple, left_schema, right_tuple, right_schema);
                Self::compare_values(*op, &lhs, &rhs)
            }
        }
    }

    /// Null comparisons evaluate to Null, which no predicate treats as true.
    fn compare_values(op: CompareOp, lhs: &Value, rhs: &Value) -> Value {
        use std::cmp::Ordering;
        let ordering = match lhs.partial_cmp(rhs) {
            Some(ordering) => ordering,
            None => return Value::Null,
        };
        let result = match op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        };
        Value::Boolean(result)
    }
}
