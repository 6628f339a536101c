use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::instance::BufferPoolInstance;
use crate::storage::disk::DiskManager;

/// Sharded buffer pool: `num_instances` independent instances, routed by
/// `page_id % num_instances`. Sharding keeps each instance's latch short and
/// the routing stable.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// Rotating starting point for `new_page` round-robin probing.
    next_instance: AtomicUsize,
}

impl ParallelBufferPool {
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0);
        let instances = (0..num_instances)
            .map(|i| BufferPoolInstance::new(pool_size, num_instances, i, disk_manager.clone()))
            .collect();
        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total frame count across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id)?.fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        match self.instance_for(page_id) {
            Ok(instance) => instance.unpin_page(page_id, is_dirty),
            Err(_) => false,
        }
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        self.instance_for(page_id)?.delete_page(page_id)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id)?.flush_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Probe instances round-robin from a rotating cursor; first success
    /// wins. Fails only when every instance is out of victim frames.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % self.instances.len();
        for offset in 0..self.instances.len() {
            let idx = (start + offset) % self.instances.len();
            match self.instances[idx].new_page() {
                Ok(result) => return Ok(result),
                Err(BufferPoolError::NoVictimFrame) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::NoVictimFrame)
    }

    /// Current pin count of a resident page. Test support.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.instance_for(page_id).ok()?.pin_count(page_id)
    }

    fn instance_for(&self, page_id: PageId) -> Result<&BufferPoolInstance, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidOperation(
                "cannot route an invalid page id".to_string(),
            ));
        }
        Ok(&self.instances[page_id as usize % self.instances.len()])
    }
}
