// Lock Manager
//
// Per-record lock queues with strict two-phase locking and wound-wait
// deadlock avoidance. Transaction age is its id: smaller id means older.
// An older transaction that needs a lock a younger one holds wounds it
// (aborts it in place); a younger one waits behind an older holder, or, for
// exclusive acquisition, dies immediately.
//
// One mutex guards the whole queue table; each queue carries its own
// condition variable. Every waiter re-validates the full queue after every
// wake, and bails out if it was wounded while asleep.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Condvar, Mutex, MutexGuard};
use log::debug;

use crate::common::types::{Rid, TxnId};
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};

/// Lookup capability the lock manager needs to reach other transactions
/// when wounding them.
pub trait TransactionRegistry: Send + Sync {
    fn transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

struct LockRequestQueue {
    requests: Vec<LockRequest>,
    cv: Arc<Condvar>,
    upgrading: bool,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: false,
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

pub struct LockManager {
    latch: Mutex<LockTable>,
    registry: Arc<dyn TransactionRegistry>,
}

impl LockManager {
    pub fn new(registry: Arc<dyn TransactionRegistry>) -> Self {
        Self {
            latch: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Acquire a shared lock on `rid`. Waits behind older exclusive holders,
    /// wounds younger ones.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            // Reads never lock under read-uncommitted.
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_shared_locked(rid) {
            return true;
        }

        loop {
            let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);

            let mut must_wait = false;
            let mut i = 0;
            while i < queue.requests.len() {
                let entry_id = queue.requests[i].txn_id;
                let holds_exclusive =
                    queue.requests[i].granted && queue.requests[i].mode == LockMode::Exclusive;
                if entry_id == txn.id() || !holds_exclusive {
                    i += 1;
                } else if entry_id > txn.id() {
                    queue.requests.remove(i);
                    self.wound(entry_id, rid);
                    queue.cv.notify_all();
                } else {
                    must_wait = true;
                    break;
                }
            }

            if !must_wait {
                break;
            }

            Self::enqueue_waiting(queue, txn.id(), LockMode::Shared);
            txn.add_shared_lock(rid);
            let cv = queue.cv.clone();
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                // Wounded while asleep; the wounder already scrubbed our
                // queue entry and lock sets.
                return false;
            }
        }

        txn.set_state(TransactionState::Growing);
        let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
        Self::grant(queue, txn.id(), LockMode::Shared);
        txn.add_shared_lock(rid);
        true
    }

    /// Acquire an exclusive lock on `rid`. Wounds every younger holder and
    /// dies (self-aborts) on any older entry; never blocks.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
        let mut i = 0;
        while i < queue.requests.len() {
            let entry_id = queue.requests[i].txn_id;
            if entry_id == txn.id() {
                i += 1;
            } else if entry_id > txn.id() {
                if queue.requests[i].granted {
                    queue.requests.remove(i);
                    self.wound(entry_id, rid);
                    queue.cv.notify_all();
                } else {
                    i += 1;
                }
            } else {
                // Older transaction ahead of us: die rather than wait.
                txn.remove_shared_lock(rid);
                txn.remove_exclusive_lock(rid);
                Self::erase_request(queue, txn.id());
                txn.set_state(TransactionState::Aborted);
                return false;
            }
        }

        txn.set_state(TransactionState::Growing);
        Self::grant(queue, txn.id(), LockMode::Exclusive);
        txn.add_exclusive_lock(rid);
        true
    }

    /// Upgrade a held shared lock to exclusive. Only one upgrade may be in
    /// flight per rid; the upgrader wounds younger holders and waits behind
    /// older ones until it is the sole entry in the queue.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return false;
        }

        {
            let queue = table.entry(rid).or_insert_with(LockRequestQueue::new);
            if queue.upgrading {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            queue.upgrading = true;
        }

        loop {
            let queue = table.get_mut(&rid).expect("queues live with the manager");

            let mut must_wait = false;
            let mut i = 0;
            while i < queue.requests.len() {
                let entry_id = queue.requests[i].txn_id;
                if entry_id == txn.id() {
                    i += 1;
                } else if entry_id > txn.id() {
                    if queue.requests[i].granted {
                        queue.requests.remove(i);
                        self.wound(entry_id, rid);
                        queue.cv.notify_all();
                    } else {
                        i += 1;
                    }
                } else {
                    must_wait = true;
                    break;
                }
            }

            if !must_wait {
                break;
            }

            let cv = queue.cv.clone();
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = table.get_mut(&rid) {
                    queue.upgrading = false;
                }
                return false;
            }
        }

        txn.set_state(TransactionState::Growing);
        let queue = table.get_mut(&rid).expect("queues live with the manager");
        assert_eq!(queue.requests.len(), 1, "upgrade settled with foreign entries in queue");
        let request = &mut queue.requests[0];
        assert_eq!(request.txn_id, txn.id());
        assert_eq!(request.mode, LockMode::Shared);
        request.mode = LockMode::Exclusive;
        request.granted = true;
        txn.add_exclusive_lock(rid);
        txn.remove_shared_lock(rid);
        queue.upgrading = false;
        true
    }

    /// Release the lock this transaction holds on `rid`, transitioning
    /// Growing to Shrinking per the isolation level's 2PL rules, and wake
    /// every waiter on the queue.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        let held_shared = txn.is_shared_locked(rid);
        let held_exclusive = txn.is_exclusive_locked(rid);
        if !held_shared && !held_exclusive {
            return false;
        }
        let mode = if held_shared { LockMode::Shared } else { LockMode::Exclusive };

        if txn.state() == TransactionState::Growing {
            // Shared locks are released eagerly under read-committed; only
            // repeatable-read treats a shared release as entering the
            // shrinking phase.
            if held_exclusive
                || (held_shared && txn.isolation_level() == IsolationLevel::RepeatableRead)
            {
                txn.set_state(TransactionState::Shrinking);
            }
        }

        let queue = match table.get_mut(&rid) {
            Some(queue) => queue,
            None => return false,
        };
        if !Self::erase_request(queue, txn.id()) {
            return false;
        }

        match mode {
            LockMode::Shared => txn.remove_shared_lock(rid),
            LockMode::Exclusive => txn.remove_exclusive_lock(rid),
        }
        queue.cv.notify_all();
        true
    }

    /// Abort the victim in place: scrub its lock sets for this rid and mark
    /// it aborted. Its queue entry has already been erased by the caller.
    fn wound(&self, victim_id: TxnId, rid: Rid) {
        debug!("wounding txn {} over {}", victim_id, rid);
        if let Some(victim) = self.registry.transaction(victim_id) {
            victim.remove_shared_lock(rid);
            victim.remove_exclusive_lock(rid);
            victim.set_state(TransactionState::Aborted);
        }
    }

    fn grant(queue: &mut LockRequestQueue, txn_id: TxnId, mode: LockMode) {
        if let Some(request) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
            request.mode = mode;
            request.granted = true;
        } else {
            queue.requests.push(LockRequest {
                txn_id,
                mode,
                granted: true,
            });
        }
    }

    fn enqueue_waiting(queue: &mut LockRequestQueue, txn_id: TxnId, mode: LockMode) {
        if !queue.requests.iter().any(|r| r.txn_id == txn_id) {
            queue.requests.push(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }
    }

    fn erase_request(queue: &mut LockRequestQueue, txn_id: TxnId) -> bool {
        match queue.requests.iter().position(|r| r.txn_id == txn_id) {
            Some(pos) => {
                queue.requests.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of granted entries on a queue. Test support.
    pub fn granted_count(&self, rid: Rid) -> usize {
        let table: MutexGuard<'_, LockTable> = self.latch.lock();
        table
            .get(&rid)
            .map(|q| q.requests.iter().filter(|r| r.granted).count())
            .unwrap_or(0)
    }
}
