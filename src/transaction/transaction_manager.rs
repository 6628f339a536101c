use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use log::debug;

use crate::catalog::Catalog;
use crate::common::types::TxnId;
use crate::transaction::lock_manager::{LockManager, TransactionRegistry};
use crate::transaction::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, WriteType,
};

/// Creates and tracks transactions, hands out monotonically increasing ids
/// (smaller id = older transaction, the ordering wound-wait relies on), and
/// drives commit/abort.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Commit: release every held lock, then mark the transaction
    /// committed and retire it.
    pub fn commit(
        &self,
        txn: &Arc<Transaction>,
        lock_manager: &LockManager,
    ) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Aborted || txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        self.release_locks(txn, lock_manager);
        txn.set_state(TransactionState::Committed);
        self.active.lock().remove(&txn.id());
        Ok(())
    }

    /// Abort: undo the recorded index writes in reverse order, release every
    /// held lock, mark aborted, retire. Also the path a wounded transaction
    /// takes to clean up after itself.
    pub fn abort(
        &self,
        txn: &Arc<Transaction>,
        lock_manager: &LockManager,
        catalog: &Catalog,
    ) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        for record in txn.take_index_writes().into_iter().rev() {
            let index_info = match catalog.index_by_oid(record.index_oid) {
                Some(info) => info,
                None => continue,
            };
            let undo_result = match record.write_type {
                WriteType::Insert => {
                    let key = record.tuple.key_from_tuple(index_info.key_attrs());
                    index_info.index().delete_entry(&key, record.rid, txn)
                }
                WriteType::Delete => {
                    let key = record.tuple.key_from_tuple(index_info.key_attrs());
                    index_info.index().insert_entry(&key, record.rid, txn)
                }
                WriteType::Update => {
                    let new_key = record.tuple.key_from_tuple(index_info.key_attrs());
                    index_info.index().delete_entry(&new_key, record.rid, txn).and_then(|_| {
                        match &record.old_tuple {
                            Some(old) => {
                                let old_key = old.key_from_tuple(index_info.key_attrs());
                                index_info.index().insert_entry(&old_key, record.rid, txn)
                            }
                            None => Ok(true),
                        }
                    })
                }
            };
            if let Err(e) = undo_result {
                debug!("index undo for txn {} failed: {}", txn.id(), e);
            }
        }

        self.release_locks(txn, lock_manager);
        txn.set_state(TransactionState::Aborted);
        self.active.lock().remove(&txn.id());
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        for rid in txn.locked_rids() {
            lock_manager.unlock(txn, rid);
        }
    }
}

impl TransactionRegistry for TransactionManager {
    fn transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }
}
