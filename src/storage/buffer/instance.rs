use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use log::trace;

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// One shard of the buffer pool: a frame array, its page table and free
/// list, and an LRU replacer, all bound to the shared disk manager.
///
/// New pages allocated by this instance always satisfy
/// `page_id % num_instances == instance_index`, so a page's owning instance
/// can be recomputed from its id alone.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: usize,
    frames: Vec<FramePtr>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
    state: Mutex<InstanceState>,
}

struct InstanceState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

impl BufferPoolInstance {
    pub fn new(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            frames,
            replacer: LruReplacer::new(pool_size),
            disk_manager,
            state: Mutex::new(InstanceState {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetch a page, reading it from disk on a miss. The returned page is
    /// pinned; the caller must `unpin_page` it.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch an invalid page id".to_string(),
            ));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            let page = {
                let mut frame_guard = frame.write();
                frame_guard.pin_count += 1;
                frame_guard.page.clone()
            };
            self.replacer.pin(frame_id);
            return Ok(page);
        }

        let frame_id = self.acquire_victim_frame(&mut state)?;
        let frame = &self.frames[frame_id as usize];

        self.write_back_if_dirty(frame)?;

        let mut new_page = Page::new(page_id);
        if let Err(e) = self.disk_manager.read_page(page_id, &mut new_page) {
            // The frame was already detached from its old page; hand it to
            // the free list rather than leaking it.
            state.free_list.push_back(frame_id);
            return Err(e.into());
        }

        let page = {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = new_page;
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
            frame_guard.page.clone()
        };

        state.page_table.insert(page_id, frame_id);
        Ok(page)
    }

    /// Create a brand-new zeroed page with a shard-local id. The page is
    /// pinned and clean.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_victim_frame(&mut state)?;
        let frame = &self.frames[frame_id as usize];

        self.write_back_if_dirty(frame)?;

        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;

        let page = {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(page_id);
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
            frame_guard.page.clone()
        };

        state.page_table.insert(page_id, frame_id);
        Ok((page, page_id))
    }

    /// Drop one pin. The dirty hint is monotone: once a residency is dirty
    /// it stays dirty until flushed or evicted. Returns false when the page
    /// is absent or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return false,
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        if frame_guard.pin_count == 0 {
            return false;
        }

        frame_guard.pin_count -= 1;
        if is_dirty {
            frame_guard.is_dirty = true;
        }

        if frame_guard.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Remove a page from the pool and deallocate it on disk. Returns false
    /// when the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => {
                // Not resident: nothing to evict, just give the id back.
                self.disk_manager.deallocate_page(page_id);
                return Ok(true);
            }
        };

        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                return Ok(false);
            }

            if frame_guard.is_dirty {
                let page_copy = frame_guard.page.read().clone();
                self.disk_manager.write_page(&page_copy)?;
                frame_guard.is_dirty = false;
            }

            let mut page_guard = frame_guard.page.write();
            *page_guard = Page::new(INVALID_PAGE_ID);
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(true)
    }

    /// Write a resident page to disk and clear its dirty flag, regardless of
    /// pin count.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        let page_copy = frame_guard.page.read().clone();
        self.disk_manager.write_page(&page_copy)?;
        frame_guard.is_dirty = false;

        Ok(())
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Current pin count of a resident page. Test support for the pin
    /// discipline invariants.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id as usize].read().pin_count)
    }

    /// Prefer the free list; fall back to evicting the LRU victim. The
    /// victim's old mapping is removed here; its write-back happens at the
    /// caller once the frame is chosen.
    fn acquire_victim_frame(&self, state: &mut InstanceState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BufferPoolError::NoVictimFrame)?;

        let old_page_id = {
            let frame_guard = self.frames[frame_id as usize].read();
            debug_assert_eq!(frame_guard.pin_count, 0);
            let page_id = frame_guard.page.read().page_id;
            page_id
        };
        if old_page_id != INVALID_PAGE_ID {
            trace!("evicting page {} from frame {}", old_page_id, frame_id);
            state.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }

    fn write_back_if_dirty(&self, frame: &FramePtr) -> Result<(), BufferPoolError> {
        let dirty_copy = {
            let frame_guard = frame.read();
            if frame_guard.is_dirty {
                Some(frame_guard.page.read().clone())
            } else {
                None
            }
        };

        if let Some(page) = dirty_copy {
            self.disk_manager.write_page(&page)?;
            frame.write().is_dirty = false;
        }
        Ok(())
    }
}
