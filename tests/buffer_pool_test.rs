use anyhow::Result;

mod common;
use common::create_test_buffer_pool;

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    assert!(page_id >= 0);

    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(page_guard.page_id, page_id);
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_page_modification_survives_eviction() -> Result<()> {
    // 3 frames, so creating 5 pages forces eviction of the modified one.
    let (buffer_pool, _file) = create_test_buffer_pool(1, 3)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[100..109].copy_from_slice(b"Test Data");
    }
    assert!(buffer_pool.unpin_page(page_id, true));

    for _ in 0..4 {
        let (_, other_id) = buffer_pool.new_page()?;
        assert!(buffer_pool.unpin_page(other_id, true));
    }

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_unpin_edge_cases() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    // Absent page.
    assert!(!buffer_pool.unpin_page(12345, false));

    // Double unpin.
    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(!buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_pin_count_round_trip() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    assert_eq!(buffer_pool.pin_count(page_id), Some(1));

    // Fetch+unpin leaves the pin count where it was.
    let _page = buffer_pool.fetch_page(page_id)?;
    assert_eq!(buffer_pool.pin_count(page_id), Some(2));
    assert!(buffer_pool.unpin_page(page_id, false));
    assert_eq!(buffer_pool.pin_count(page_id), Some(1));

    assert!(buffer_pool.unpin_page(page_id, false));
    assert_eq!(buffer_pool.pin_count(page_id), Some(0));
    Ok(())
}

#[test]
fn test_all_pinned_fails_new_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 3)?;

    let mut page_ids = Vec::new();
    for _ in 0..3 {
        let (_, page_id) = buffer_pool.new_page()?;
        page_ids.push(page_id);
    }

    // Every frame pinned: no victim anywhere.
    assert!(buffer_pool.new_page().is_err());

    // Releasing one frame makes allocation possible again.
    assert!(buffer_pool.unpin_page(page_ids[0], false));
    let (_, page_id) = buffer_pool.new_page()?;
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0..5].copy_from_slice(b"flush");
    }
    assert!(buffer_pool.unpin_page(page_id, true));
    buffer_pool.flush_page(page_id)?;

    let fetched = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched.read();
        assert_eq!(&page_guard.data[0..5], b"flush");
    }
    assert!(buffer_pool.unpin_page(page_id, false));
    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(2, 10)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i + 1;
        }
        assert!(buffer_pool.unpin_page(page_id, true));
        page_ids.push(page_id);
    }

    buffer_pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched = buffer_pool.fetch_page(page_id)?;
        {
            let page_guard = fetched.read();
            assert_eq!(page_guard.data[0], i as u8 + 1);
        }
        assert!(buffer_pool.unpin_page(page_id, false));
    }
    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1, 10)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // Pinned pages cannot be deleted.
    assert!(!buffer_pool.delete_page(page_id)?);

    assert!(buffer_pool.unpin_page(page_id, false));
    assert!(buffer_pool.delete_page(page_id)?);

    // Gone from the page table.
    assert_eq!(buffer_pool.pin_count(page_id), None);

    // Deleting a non-resident page succeeds (disk-side deallocate only).
    assert!(buffer_pool.delete_page(page_id)?);
    Ok(())
}

#[test]
fn test_sharded_page_id_routing() -> Result<()> {
    let num_instances = 4;
    let (buffer_pool, _file) = create_test_buffer_pool(num_instances, 8)?;

    // Round-robin allocation spreads fresh pages across instances, and every
    // id routes back to the shard that allocated it.
    let mut residues = std::collections::HashSet::new();
    for _ in 0..8 {
        let (_, page_id) = buffer_pool.new_page()?;
        residues.insert(page_id as usize % num_instances);
        assert!(buffer_pool.unpin_page(page_id, false));
    }
    assert_eq!(residues.len(), num_instances);
    Ok(())
}

#[test]
fn test_total_pool_size() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(4, 8)?;
    assert_eq!(buffer_pool.pool_size(), 32);
    assert_eq!(buffer_pool.num_instances(), 4);
    Ok(())
}
