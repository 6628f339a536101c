use std::sync::Arc;

use crate::catalog::{Schema, TableInfo, Value};
use crate::common::types::Rid;
use crate::query::executor::{ExecResult, ExecutionError, Executor, ExecutorContext};
use crate::query::plan::{UpdatePlan, UpdateType};
use crate::storage::table::Tuple;
use crate::transaction::{IndexWriteRecord, WriteType};

/// Write-only terminal operator: applies the plan's per-column updates to
/// every row its child produces, keeping indexes in sync (delete old key,
/// insert new key at the same rid).
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    plan: UpdatePlan,
    child: Box<dyn Executor>,
    table_info: Option<Arc<TableInfo>>,
    output_schema: Schema,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: UpdatePlan, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            table_info: None,
            output_schema: Schema::new(vec![]),
            done: false,
        }
    }

    fn generate_updated_tuple(&self, src: &Tuple, schema: &Schema) -> Tuple {
        let mut values = Vec::with_capacity(schema.column_count());
        for idx in 0..schema.column_count() {
            match self.plan.update_attrs.get(&idx) {
                None => values.push(src.value(idx).clone()),
                Some(info) => match info.update_type {
                    UpdateType::Add => values.push(src.value(idx).add_integer(info.value)),
                    UpdateType::Set => values.push(Value::Integer(info.value)),
                },
            }
        }
        Tuple::new(values)
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.table_info = Some(
            self.ctx
                .catalog
                .get_table(self.plan.table_oid)
                .ok_or(ExecutionError::TableNotFound(self.plan.table_oid))?,
        );
        self.child.init()?;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table_info = self.table_info.clone().ok_or(ExecutionError::NotInitialized)?;

        while let Some((old_tuple, rid)) = self.child.next()? {
            self.ctx.lock_exclusive_for_write(rid)?;

            let new_tuple = self.generate_updated_tuple(&old_tuple, &table_info.schema);
            table_info.heap.update_tuple(&new_tuple, rid, &self.ctx.txn)?;

            for index_info in self.ctx.catalog.get_table_indexes(&table_info.name) {
                let old_key = old_tuple.key_from_tuple(index_info.key_attrs());
                let new_key = new_tuple.key_from_tuple(index_info.key_attrs());
                index_info.index().delete_entry(&old_key, rid, &self.ctx.txn)?;
                index_info.index().insert_entry(&new_key, rid, &self.ctx.txn)?;
                self.ctx.txn.append_index_write(IndexWriteRecord {
                    rid,
                    table_oid: table_info.oid,
                    write_type: WriteType::Update,
                    tuple: new_tuple.clone(),
                    old_tuple: Some(old_tuple.clone()),
                    index_oid: index_info.oid(),
                });
            }

            self.ctx.unlock_if_read_committed(rid);
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.output_schema
    }
}
