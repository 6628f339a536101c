use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecResult, ExecutionError, Executor, ExecutorContext};
use crate::query::plan::InsertPlan;
use crate::storage::table::Tuple;
use crate::transaction::{IndexWriteRecord, WriteType};

/// Write-only terminal operator: inserts either the plan's literal rows or
/// everything its child produces, maintaining every index on the table and
/// recording index writes for undo.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    plan: InsertPlan,
    child: Option<Box<dyn Executor>>,
    table_info: Option<Arc<TableInfo>>,
    output_schema: Schema,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: InsertPlan, child: Option<Box<dyn Executor>>) -> Self {
        Self {
            ctx,
            plan,
            child,
            table_info: None,
            output_schema: Schema::new(vec![]),
            done: false,
        }
    }

    fn insert_with_indexes(&self, tuple: &Tuple) -> ExecResult<()> {
        let table_info = self.table_info.as_ref().ok_or(ExecutionError::NotInitialized)?;

        let rid = table_info.heap.insert_tuple(tuple, &self.ctx.txn)?;
        self.ctx.lock_exclusive_for_write(rid)?;

        for index_info in self.ctx.catalog.get_table_indexes(&table_info.name) {
            let key = tuple.key_from_tuple(index_info.key_attrs());
            index_info.index().insert_entry(&key, rid, &self.ctx.txn)?;
            self.ctx.txn.append_index_write(IndexWriteRecord {
                rid,
                table_oid: table_info.oid,
                write_type: WriteType::Insert,
                tuple: tuple.clone(),
                old_tuple: None,
                index_oid: index_info.oid(),
            });
        }

        self.ctx.unlock_if_read_committed(rid);
        Ok(())
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.table_info = Some(
            self.ctx
                .catalog
                .get_table(self.plan.table_oid)
                .ok_or(ExecutionError::TableNotFound(self.plan.table_oid))?,
        );
        if let Some(child) = &mut self.child {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        if let Some(raw_values) = &self.plan.raw_values {
            for row in raw_values.clone() {
                self.insert_with_indexes(&Tuple::new(row))?;
            }
            return Ok(None);
        }

        // Drain the child fully before writing so the inserts cannot feed
        // back into its scan.
        let child = self.child.as_mut().ok_or(ExecutionError::NotInitialized)?;
        let mut pending = Vec::new();
        while let Some((tuple, _rid)) = child.next()? {
            pending.push(tuple);
        }
        for tuple in &pending {
            self.insert_with_indexes(tuple)?;
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.output_schema
    }
}
