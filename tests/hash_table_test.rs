use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

use coraldb::common::hash::IdentityHashFunction;
use coraldb::common::types::Rid;
use coraldb::index::ExtendibleHashTable;

fn rid_for(key: i32) -> Rid {
    Rid::new(key, 0)
}

#[test]
fn test_insert_and_get() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    assert!(table.insert(&1, &rid_for(1))?);
    assert!(table.insert(&2, &rid_for(2))?);

    assert_eq!(table.get_value(&1)?, vec![rid_for(1)]);
    assert_eq!(table.get_value(&2)?, vec![rid_for(2)]);
    assert_eq!(table.get_value(&3)?, Vec::<Rid>::new());
    Ok(())
}

#[test]
fn test_duplicate_pair_rejected() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    assert!(table.insert(&1, &rid_for(1))?);
    assert!(!table.insert(&1, &rid_for(1))?);

    // Same key with a different value is a separate entry.
    assert!(table.insert(&1, &Rid::new(1, 1))?);
    assert_eq!(table.get_value(&1)?.len(), 2);
    Ok(())
}

#[test]
fn test_remove_absent_pair() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    assert!(!table.remove(&9, &rid_for(9))?);
    assert!(table.insert(&9, &rid_for(9))?);
    assert!(!table.remove(&9, &Rid::new(9, 7))?);
    assert!(table.remove(&9, &rid_for(9))?);
    Ok(())
}

#[test]
fn test_split_on_colliding_keys() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    // All multiples of four share their low two bits, so the first four fill
    // one bucket and the fifth forces repeated splits until bit 2
    // distinguishes {0, 8, 16} from {4, 12}.
    for key in [0, 4, 8, 12, 16] {
        assert!(table.insert(&key, &rid_for(key))?, "insert of {} failed", key);
    }

    assert_eq!(table.global_depth()?, 3);
    table.verify_integrity()?;

    for key in [0, 4, 8, 12, 16] {
        assert_eq!(table.get_value(&key)?, vec![rid_for(key)]);
    }
    Ok(())
}

#[test]
fn test_merge_shrinks_directory_to_zero() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    for key in [0, 4, 8, 12, 16] {
        assert!(table.insert(&key, &rid_for(key))?);
    }
    assert_eq!(table.global_depth()?, 3);

    // Drain down to {0, 4}, then remove those too: every merge cascades and
    // the directory collapses back to a single bucket.
    for key in [8, 12, 16] {
        assert!(table.remove(&key, &rid_for(key))?);
    }
    for key in [0, 4] {
        assert!(table.remove(&key, &rid_for(key))?);
    }

    assert_eq!(table.global_depth()?, 0);
    table.verify_integrity()?;
    for key in [0, 4, 8, 12, 16] {
        assert_eq!(table.get_value(&key)?, Vec::<Rid>::new());
    }
    Ok(())
}

#[test]
fn test_depth_exhaustion_fails_insert() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 1);

    // 0 and 1024 agree on all nine usable hash bits; with capacity one the
    // bucket can never be relieved, so the split chain runs out of depth.
    assert!(table.insert(&0, &rid_for(0))?);
    assert!(!table.insert(&1024, &rid_for(1024))?);

    table.verify_integrity()?;
    assert_eq!(table.get_value(&0)?, vec![rid_for(0)]);
    Ok(())
}

#[test]
fn test_insert_remove_round_trip() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 64)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 4);

    assert!(table.insert(&5, &rid_for(5))?);
    let before = table.get_value(&5)?;

    assert!(table.insert(&5, &Rid::new(5, 1))?);
    assert!(table.remove(&5, &Rid::new(5, 1))?);

    assert_eq!(table.get_value(&5)?, before);
    Ok(())
}

#[test]
fn test_many_keys_default_capacity() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 128)?;
    let table: ExtendibleHashTable<i32, Rid, IdentityHashFunction> =
        ExtendibleHashTable::with_bucket_capacity(buffer_pool, IdentityHashFunction, 16);

    // Sequential keys spread across buckets; the multiset of values under
    // each key must track inserts minus removes exactly.
    for key in 0..200 {
        assert!(table.insert(&key, &rid_for(key))?);
    }
    for key in (0..200).step_by(2) {
        assert!(table.remove(&key, &rid_for(key))?);
    }

    table.verify_integrity()?;
    for key in 0..200 {
        let expected = if key % 2 == 0 { vec![] } else { vec![rid_for(key)] };
        assert_eq!(table.get_value(&key)?, expected);
    }
    Ok(())
}
