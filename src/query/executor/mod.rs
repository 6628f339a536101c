// Query Executors
//
// Pull-based iterator model: every operator exposes init() for one-shot
// setup and next() to produce the following tuple, composing into a tree by
// owning its children.

pub mod delete;
pub mod hash_join;
pub mod insert;
pub mod seq_scan;
pub mod update;

use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Catalog, Schema, TableOid};
use crate::common::types::{Rid, TxnId};
use crate::index::IndexError;
use crate::storage::buffer::ParallelBufferPool;
use crate::storage::table::{TableError, Tuple};
use crate::transaction::{IsolationLevel, LockManager, Transaction, TransactionManager};

pub use delete::DeleteExecutor;
pub use hash_join::HashJoinExecutor;
pub use insert::InsertExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Transaction {0} aborted")]
    TransactionAborted(TxnId),

    #[error("Table with oid {0} not found")]
    TableNotFound(TableOid),

    #[error("Executor used before init()")]
    NotInitialized,

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

pub type ExecResult<T> = Result<T, ExecutionError>;

/// The Executor trait defines the interface for all query execution
/// operators in the iterator-based execution model.
pub trait Executor {
    /// One-shot setup before the first next() call.
    fn init(&mut self) -> ExecResult<()>;

    /// Produce the next tuple, or None when exhausted. Write-only operators
    /// do their work on the first call and always return None.
    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>>;

    fn output_schema(&self) -> &Schema;
}

/// Everything an executor needs from its surroundings. The lock manager is
/// optional: without one the executors run unserialized.
pub struct ExecutorContext {
    pub catalog: Arc<Catalog>,
    pub buffer_pool: Arc<ParallelBufferPool>,
    pub txn: Arc<Transaction>,
    pub txn_manager: Arc<TransactionManager>,
    pub lock_manager: Option<Arc<LockManager>>,
}

impl ExecutorContext {
    /// Take (or upgrade to) an exclusive lock on `rid` for a write. A
    /// refused lock means this transaction was chosen as a deadlock victim
    /// or broke 2PL; the statement aborts.
    pub fn lock_exclusive_for_write(&self, rid: Rid) -> ExecResult<()> {
        let lock_manager = match &self.lock_manager {
            Some(lm) => lm,
            None => return Ok(()),
        };
        let acquired = if self.txn.is_shared_locked(rid) {
            lock_manager.lock_upgrade(&self.txn, rid)
        } else if self.txn.is_exclusive_locked(rid) {
            true
        } else {
            lock_manager.lock_exclusive(&self.txn, rid)
        };
        if !acquired {
            return Err(ExecutionError::TransactionAborted(self.txn.id()));
        }
        Ok(())
    }

    /// Under read-committed, write locks are released as soon as the write
    /// is done.
    pub fn unlock_if_read_committed(&self, rid: Rid) {
        if let Some(lock_manager) = &self.lock_manager {
            if self.txn.isolation_level() == IsolationLevel::ReadCommitted {
                lock_manager.unlock(&self.txn, rid);
            }
        }
    }
}
