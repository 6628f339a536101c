use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecResult, ExecutionError, Executor, ExecutorContext};
use crate::query::plan::DeletePlan;
use crate::storage::table::Tuple;
use crate::transaction::{IndexWriteRecord, WriteType};

/// Write-only terminal operator: marks every row its child produces as
/// deleted and removes the matching index entries.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    plan: DeletePlan,
    child: Box<dyn Executor>,
    table_info: Option<Arc<TableInfo>>,
    output_schema: Schema,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: DeletePlan, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            plan,
            child,
            table_info: None,
            output_schema: Schema::new(vec![]),
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
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

        while let Some((tuple, rid)) = self.child.next()? {
            self.ctx.lock_exclusive_for_write(rid)?;

            table_info.heap.mark_delete(rid, &self.ctx.txn)?;

            for index_info in self.ctx.catalog.get_table_indexes(&table_info.name) {
                let key = tuple.key_from_tuple(index_info.key_attrs());
                index_info.index().delete_entry(&key, rid, &self.ctx.txn)?;
                self.ctx.txn.append_index_write(IndexWriteRecord {
                    rid,
                    table_oid: table_info.oid,
                    write_type: WriteType::Delete,
                    tuple: tuple.clone(),
                    old_tuple: None,
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
