// Transaction State
//
// A transaction is created by the TransactionManager; the lock manager and
// the executors only mutate its state and its lock/write sets. State and
// sets sit behind their own locks because a wound can flip a transaction to
// Aborted from another thread at any time.

use std::collections::HashSet;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TxnId};
use crate::storage::table::Tuple;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states plus the terminal outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),

    #[error("Transaction {0} not found")]
    NotFound(TxnId),
}

/// Kind of index modification recorded for undo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// One index modification made on behalf of a transaction. Replayed in
/// reverse on abort.
#[derive(Debug, Clone)]
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub table_oid: u32,
    pub write_type: WriteType,
    /// The tuple the operation applied (new image for Insert/Update, old
    /// image for Delete).
    pub tuple: Tuple,
    /// Pre-update image, present only for Update.
    pub old_tuple: Option<Tuple>,
    pub index_oid: u32,
}

pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Every rid this transaction currently holds a lock on.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    /// Drain the write set; the caller owns the undo.
    pub fn take_index_writes(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut *self.index_write_set.lock())
    }
}
