// Plan Nodes
//
// Plain descriptions of what each executor should do. Built directly by the
// embedding layer (there is no SQL front end here).

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Expression, Schema, TableOid, Value};

pub struct SeqScanPlan {
    pub table_oid: TableOid,
    /// One expression per output column, evaluated against the table schema.
    pub output_exprs: Vec<Expression>,
    pub output_schema: Arc<Schema>,
    /// Evaluated against the output tuple; rows failing it are skipped.
    pub predicate: Option<Expression>,
}

pub struct InsertPlan {
    pub table_oid: TableOid,
    /// Literal rows to insert. None means the rows come from a child
    /// executor instead.
    pub raw_values: Option<Vec<Vec<Value>>>,
}

impl InsertPlan {
    pub fn is_raw_insert(&self) -> bool {
        self.raw_values.is_some()
    }
}

pub struct DeletePlan {
    pub table_oid: TableOid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    /// Add an integer constant to the column.
    Add,
    /// Replace the column with an integer constant.
    Set,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateInfo {
    pub update_type: UpdateType,
    pub value: i64,
}

pub struct UpdatePlan {
    pub table_oid: TableOid,
    /// Column position -> modification to apply.
    pub update_attrs: HashMap<usize, UpdateInfo>,
}

pub struct HashJoinPlan {
    /// Join key of the left (build) side, evaluated against the left child's
    /// output schema.
    pub left_key: Expression,
    /// Join key of the right (probe) side.
    pub right_key: Expression,
    /// Output columns as join expressions over both child schemas.
    pub output_exprs: Vec<Expression>,
    pub output_schema: Arc<Schema>,
}
