use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use coraldb::common::types::Rid;
use coraldb::transaction::{
    IsolationLevel, LockManager, TransactionManager, TransactionState,
};

fn setup() -> (Arc<TransactionManager>, Arc<LockManager>) {
    let txn_manager = Arc::new(TransactionManager::new());
    let lock_manager = Arc::new(LockManager::new(txn_manager.clone()));
    (txn_manager, lock_manager)
}

#[test]
fn test_shared_then_exclusive_same_txn() -> Result<()> {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lm.lock_shared(&txn, rid));
    assert!(txn.is_shared_locked(rid));

    // Re-request is a no-op success.
    assert!(lm.lock_shared(&txn, rid));

    assert!(lm.lock_upgrade(&txn, rid));
    assert!(txn.is_exclusive_locked(rid));
    assert!(!txn.is_shared_locked(rid));
    assert_eq!(lm.granted_count(rid), 1);
    Ok(())
}

#[test]
fn test_read_uncommitted_reads_never_lock() -> Result<()> {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::ReadUncommitted);
    let rid = Rid::new(1, 0);

    assert!(!lm.lock_shared(&txn, rid));
    assert_eq!(txn.state(), TransactionState::Aborted);
    Ok(())
}

#[test]
fn test_two_phase_locking_repeatable_read() -> Result<()> {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    let rid_a = Rid::new(1, 0);
    let rid_b = Rid::new(1, 1);

    assert!(lm.lock_shared(&txn, rid_a));
    assert!(lm.unlock(&txn, rid_a));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    // Acquiring after any release under repeatable read breaks 2PL.
    assert!(!lm.lock_shared(&txn, rid_b));
    assert_eq!(txn.state(), TransactionState::Aborted);
    Ok(())
}

#[test]
fn test_read_committed_releases_shared_eagerly() -> Result<()> {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);
    let rid_a = Rid::new(1, 0);
    let rid_b = Rid::new(1, 1);

    assert!(lm.lock_shared(&txn, rid_a));
    assert!(lm.unlock(&txn, rid_a));

    // Shared release does not start the shrinking phase.
    assert_eq!(txn.state(), TransactionState::Growing);
    assert!(lm.lock_shared(&txn, rid_b));

    // An exclusive release does.
    assert!(lm.lock_upgrade(&txn, rid_b));
    assert!(lm.unlock(&txn, rid_b));
    assert_eq!(txn.state(), TransactionState::Shrinking);
    Ok(())
}

#[test]
fn test_unlock_without_lock() -> Result<()> {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    assert!(!lm.unlock(&txn, Rid::new(9, 9)));
    Ok(())
}

#[test]
fn test_younger_exclusive_dies_on_older_holder() -> Result<()> {
    let (tm, lm) = setup();
    let older = tm.begin(IsolationLevel::RepeatableRead);
    let younger = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(2, 0);

    assert!(lm.lock_exclusive(&older, rid));
    assert!(!lm.lock_exclusive(&younger, rid));
    assert_eq!(younger.state(), TransactionState::Aborted);

    // The older holder is untouched.
    assert!(older.is_exclusive_locked(rid));
    assert_eq!(lm.granted_count(rid), 1);
    Ok(())
}

#[test]
fn test_wound_wait_scenario() -> Result<()> {
    let (tm, lm) = setup();
    let t0 = tm.begin(IsolationLevel::RepeatableRead);
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(3, 0);

    // T1 holds X.
    assert!(lm.lock_exclusive(&t1, rid));

    // T2 requests S and must wait behind the older T1.
    let waiter = {
        let lm = lm.clone();
        let t2 = t2.clone();
        thread::spawn(move || lm.lock_shared(&t2, rid))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    // T0 requests X: wounds T1 and takes the lock.
    assert!(lm.lock_exclusive(&t0, rid));
    assert_eq!(t1.state(), TransactionState::Aborted);
    assert!(!t1.is_exclusive_locked(rid));
    assert!(t0.is_exclusive_locked(rid));

    // T2 wakes, sees the older T0 holding X, keeps waiting.
    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    // T0 finishes; T2 finally acquires its shared lock.
    assert!(lm.unlock(&t0, rid));
    assert!(waiter.join().unwrap());
    assert!(t2.is_shared_locked(rid));
    assert_eq!(lm.granted_count(rid), 1);
    Ok(())
}

#[test]
fn test_upgrade_wounds_younger_reader() -> Result<()> {
    let (tm, lm) = setup();
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(4, 0);

    assert!(lm.lock_shared(&t1, rid));
    assert!(lm.lock_shared(&t2, rid));

    // T1 upgrades: the younger reader T2 is wounded.
    assert!(lm.lock_upgrade(&t1, rid));
    assert!(t1.is_exclusive_locked(rid));
    assert_eq!(t2.state(), TransactionState::Aborted);

    // T2 no longer holds anything to release.
    assert!(!lm.unlock(&t2, rid));
    assert_eq!(lm.granted_count(rid), 1);
    Ok(())
}

#[test]
fn test_upgrade_waits_for_older_reader() -> Result<()> {
    let (tm, lm) = setup();
    let t0 = tm.begin(IsolationLevel::RepeatableRead);
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(5, 0);

    assert!(lm.lock_shared(&t0, rid));
    assert!(lm.lock_shared(&t1, rid));

    // T1's upgrade must wait for the older reader to leave.
    let upgrader = {
        let lm = lm.clone();
        let t1 = t1.clone();
        thread::spawn(move || lm.lock_upgrade(&t1, rid))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!upgrader.is_finished());

    assert!(lm.unlock(&t0, rid));
    assert!(upgrader.join().unwrap());
    assert!(t1.is_exclusive_locked(rid));
    Ok(())
}

#[test]
fn test_opposite_order_locking_does_not_hang() -> Result<()> {
    // Wound-wait resolves the classic cross order without blocking: the
    // younger transaction dies where it would have waited, the older one
    // wounds where it would have deadlocked.
    let (tm, lm) = setup();
    let t0 = tm.begin(IsolationLevel::RepeatableRead);
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let rid_a = Rid::new(6, 0);
    let rid_b = Rid::new(6, 1);

    assert!(lm.lock_exclusive(&t0, rid_a));
    assert!(lm.lock_exclusive(&t1, rid_b));

    assert!(!lm.lock_exclusive(&t1, rid_a));
    assert_eq!(t1.state(), TransactionState::Aborted);

    assert!(lm.lock_exclusive(&t0, rid_b));
    assert!(t0.is_exclusive_locked(rid_b));
    Ok(())
}

#[test]
fn test_commit_releases_all_locks() -> Result<()> {
    let (tm, lm) = setup();
    let t0 = tm.begin(IsolationLevel::RepeatableRead);
    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(7, 0);

    assert!(lm.lock_exclusive(&t0, rid));
    tm.commit(&t0, &lm)?;
    assert_eq!(t0.state(), TransactionState::Committed);
    assert_eq!(lm.granted_count(rid), 0);

    // The record is free for the next transaction.
    assert!(lm.lock_exclusive(&t1, rid));
    Ok(())
}
