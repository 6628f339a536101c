use std::sync::Arc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, ParallelBufferPool};
use crate::storage::page::{PageError, PageManager};
use crate::storage::table::tuple::Tuple;
use crate::transaction::Transaction;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Tuple {0} not found")]
    TupleNotFound(Rid),

    #[error("Tuple too large for a page")]
    TupleTooLarge,

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Heap file of tuples: a doubly linked chain of slotted pages reached
/// through the buffer pool. The first page is created lazily on first
/// insert. Deleted tuples stay physically present but are invisible to
/// reads and iteration.
pub struct TableHeap {
    buffer_pool: Arc<ParallelBufferPool>,
    page_manager: PageManager,
    /// Head of the page chain; also serializes inserts so chain growth
    /// happens one writer at a time.
    first_page_id: Mutex<PageId>,
}

impl TableHeap {
    pub fn new(buffer_pool: Arc<ParallelBufferPool>) -> Self {
        Self {
            buffer_pool,
            page_manager: PageManager::new(),
            first_page_id: Mutex::new(INVALID_PAGE_ID),
        }
    }

    pub fn first_page_id(&self) -> PageId {
        *self.first_page_id.lock()
    }

    /// Append a tuple, walking the page chain for free space and extending
    /// it when every page is full.
    pub fn insert_tuple(&self, tuple: &Tuple, _txn: &Arc<Transaction>) -> Result<Rid, TableError> {
        let bytes = tuple.to_bytes()?;
        let mut first = self.first_page_id.lock();

        if *first == INVALID_PAGE_ID {
            let (page, page_id) = self.buffer_pool.new_page()?;
            {
                let mut page_guard = page.write();
                self.page_manager.init_page(&mut page_guard);
            }
            self.buffer_pool.unpin_page(page_id, true);
            *first = page_id;
        }

        let mut page_id = *first;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let mut page_guard = page.write();

            match self.page_manager.insert_record(&mut page_guard, &bytes) {
                Ok(slot) => {
                    drop(page_guard);
                    self.buffer_pool.unpin_page(page_id, true);
                    return Ok(Rid::new(page_id, slot));
                }
                Err(PageError::InsufficientSpace) => {
                    let mut header = self.page_manager.get_header(&page_guard);
                    if header.next_page_id != INVALID_PAGE_ID {
                        let next = header.next_page_id;
                        drop(page_guard);
                        self.buffer_pool.unpin_page(page_id, false);
                        page_id = next;
                        continue;
                    }

                    // End of chain: grow it by one page.
                    let (new_page, new_page_id) = match self.buffer_pool.new_page() {
                        Ok(ok) => ok,
                        Err(e) => {
                            drop(page_guard);
                            self.buffer_pool.unpin_page(page_id, false);
                            return Err(e.into());
                        }
                    };
                    {
                        let mut new_guard = new_page.write();
                        self.page_manager.init_page(&mut new_guard);
                        let mut new_header = self.page_manager.get_header(&new_guard);
                        new_header.prev_page_id = page_id;
                        self.page_manager.set_header(&mut new_guard, &new_header);

                        let slot = match self.page_manager.insert_record(&mut new_guard, &bytes) {
                            Ok(slot) => slot,
                            Err(PageError::InsufficientSpace) => {
                                drop(new_guard);
                                self.buffer_pool.unpin_page(new_page_id, true);
                                drop(page_guard);
                                self.buffer_pool.unpin_page(page_id, false);
                                return Err(TableError::TupleTooLarge);
                            }
                            Err(e) => {
                                drop(new_guard);
                                self.buffer_pool.unpin_page(new_page_id, true);
                                drop(page_guard);
                                self.buffer_pool.unpin_page(page_id, false);
                                return Err(e.into());
                            }
                        };

                        header.next_page_id = new_page_id;
                        self.page_manager.set_header(&mut page_guard, &header);
                        drop(new_guard);
                        self.buffer_pool.unpin_page(new_page_id, true);
                        drop(page_guard);
                        self.buffer_pool.unpin_page(page_id, true);
                        return Ok(Rid::new(new_page_id, slot));
                    }
                }
                Err(e) => {
                    drop(page_guard);
                    self.buffer_pool.unpin_page(page_id, false);
                    return Err(e.into());
                }
            }
        }
    }

    /// Replace the tuple at `rid` in place.
    pub fn update_tuple(
        &self,
        tuple: &Tuple,
        rid: Rid,
        _txn: &Arc<Transaction>,
    ) -> Result<(), TableError> {
        let bytes = tuple.to_bytes()?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page_guard = page.write();
            self.page_manager.update_record(&mut page_guard, rid.slot, &bytes)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result.map_err(|e| match e {
            PageError::RecordNotFound | PageError::InvalidRecordId => TableError::TupleNotFound(rid),
            other => other.into(),
        })
    }

    /// Logically delete the tuple at `rid`.
    pub fn mark_delete(&self, rid: Rid, _txn: &Arc<Transaction>) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page_guard = page.write();
            self.page_manager.delete_record(&mut page_guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok());
        result.map_err(|e| match e {
            PageError::RecordNotFound | PageError::InvalidRecordId => TableError::TupleNotFound(rid),
            other => other.into(),
        })
    }

    pub fn get_tuple(&self, rid: Rid) -> Result<Tuple, TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let page_guard = page.read();
            self.page_manager.get_record(&page_guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, false);
        let bytes = result.map_err(|e| match e {
            PageError::RecordNotFound | PageError::InvalidRecordId => TableError::TupleNotFound(rid),
            other => other.into(),
        })?;
        Ok(Tuple::from_bytes(&bytes)?)
    }

    /// Iterator over all visible tuples, in page-chain order.
    pub fn iter(self: Arc<Self>) -> TableIterator {
        let page_id = self.first_page_id();
        TableIterator {
            heap: self,
            page_id,
            slot: 0,
        }
    }
}

/// Pull-based cursor over a table heap. Deleted slots are skipped.
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot: u32,
}

impl TableIterator {
    pub fn next(&mut self) -> Result<Option<(Tuple, Rid)>, TableError> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return Ok(None);
            }

            let page = self.heap.buffer_pool.fetch_page(self.page_id)?;
            let page_guard = page.read();
            let header = self.heap.page_manager.get_header(&page_guard);

            while self.slot < header.record_count {
                let slot = self.slot;
                self.slot += 1;
                match self.heap.page_manager.get_record(&page_guard, slot) {
                    Ok(bytes) => {
                        let rid = Rid::new(self.page_id, slot);
                        drop(page_guard);
                        self.heap.buffer_pool.unpin_page(rid.page_id, false);
                        return Ok(Some((Tuple::from_bytes(&bytes)?, rid)));
                    }
                    Err(PageError::RecordNotFound) => continue,
                    Err(e) => {
                        drop(page_guard);
                        self.heap.buffer_pool.unpin_page(self.page_id, false);
                        return Err(e.into());
                    }
                }
            }

            let exhausted = self.page_id;
            self.page_id = header.next_page_id;
            self.slot = 0;
            drop(page_guard);
            self.heap.buffer_pool.unpin_page(exhausted, false);
        }
    }
}
