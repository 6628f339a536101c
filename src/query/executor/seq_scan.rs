use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::{ExecResult, ExecutionError, Executor, ExecutorContext};
use crate::query::plan::SeqScanPlan;
use crate::storage::table::{TableIterator, Tuple};
use crate::transaction::IsolationLevel;

/// Sequential scan over a table heap. Takes a shared lock per row (except
/// under read-uncommitted, and except on rows this transaction already
/// locked), releasing it immediately under read-committed.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    plan: SeqScanPlan,
    table_info: Option<Arc<TableInfo>>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: SeqScanPlan) -> Self {
        Self {
            ctx,
            plan,
            table_info: None,
            iter: None,
        }
    }

    fn lock_row(&self, rid: Rid) -> ExecResult<()> {
        let lock_manager = match &self.ctx.lock_manager {
            Some(lm) => lm,
            None => return Ok(()),
        };
        let txn = &self.ctx.txn;
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(());
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return Ok(());
        }
        if !lock_manager.lock_shared(txn, rid) {
            return Err(ExecutionError::TransactionAborted(txn.id()));
        }
        Ok(())
    }

    fn unlock_row(&self, rid: Rid) {
        if let Some(lock_manager) = &self.ctx.lock_manager {
            if self.ctx.txn.isolation_level() == IsolationLevel::ReadCommitted {
                lock_manager.unlock(&self.ctx.txn, rid);
            }
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> ExecResult<()> {
        let table_info = self
            .ctx
            .catalog
            .get_table(self.plan.table_oid)
            .ok_or(ExecutionError::TableNotFound(self.plan.table_oid))?;
        self.iter = Some(table_info.heap.clone().iter());
        self.table_info = Some(table_info);
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        let table_info = self.table_info.clone().ok_or(ExecutionError::NotInitialized)?;

        loop {
            let row = self
                .iter
                .as_mut()
                .ok_or(ExecutionError::NotInitialized)?
                .next()?;
            let (tuple, rid) = match row {
                Some(row) => row,
                None => return Ok(None),
            };

            self.lock_row(rid)?;

            let values = self
                .plan
                .output_exprs
                .iter()
                .map(|expr| expr.evaluate(&tuple, &table_info.schema))
                .collect();
            let out_tuple = Tuple::new(values);

            self.unlock_row(rid);

            let passes = match &self.plan.predicate {
                Some(predicate) => predicate
                    .evaluate(&out_tuple, &self.plan.output_schema)
                    .is_true(),
                None => true,
            };
            if passes {
                return Ok(Some((out_tuple, rid)));
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
