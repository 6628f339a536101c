use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for handling the actual disk I/O operations
pub struct DiskManager {
    db_file: Mutex<File>,
    /// High-water mark for `allocate_page`, plus the set of deallocated ids
    /// available for reuse.
    allocation: Mutex<AllocationState>,
}

struct AllocationState {
    next_page_id: PageId,
    free_pages: HashSet<PageId>,
}

impl DiskManager {
    /// Create a new DiskManager backed by the given database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let file_size = file.metadata()?.len();
        let next_page_id = (file_size / PAGE_SIZE as u64) as PageId;

        Ok(Self {
            db_file: Mutex::new(file),
            allocation: Mutex::new(AllocationState {
                next_page_id,
                free_pages: HashSet::new(),
            }),
        })
    }

    /// Read a page from disk into `page`. Reads past the end of the file
    /// yield a zeroed page, so freshly allocated ids can be fetched before
    /// their first write.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            if offset >= file_size {
                page.data = [0; PAGE_SIZE];
                page.page_id = page_id;
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Allocate a fresh page id, reusing deallocated ids first
    pub fn allocate_page(&self) -> PageId {
        let mut alloc = self.allocation.lock();
        if let Some(&id) = alloc.free_pages.iter().next() {
            alloc.free_pages.remove(&id);
            return id;
        }
        let id = alloc.next_page_id;
        alloc.next_page_id += 1;
        id
    }

    /// Return a page id to the allocator. Bookkeeping only: the file is not
    /// truncated, the id becomes eligible for reuse.
    pub fn deallocate_page(&self, page_id: PageId) {
        if page_id < 0 {
            return;
        }
        let mut alloc = self.allocation.lock();
        if page_id < alloc.next_page_id {
            alloc.free_pages.insert(page_id);
        }
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_read_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path()).unwrap();

        let mut page = Page::new(3);
        page.data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        disk.write_page(&page).unwrap();

        let mut read_back = Page::new(0);
        disk.read_page(3, &mut read_back).unwrap();
        assert_eq!(read_back.page_id, 3);
        assert_eq!(&read_back.data[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_read_past_eof_is_zeroed() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path()).unwrap();

        let mut page = Page::new(0);
        page.data = [0xAB; PAGE_SIZE];
        disk.read_page(7, &mut page).unwrap();
        assert_eq!(page.page_id, 7);
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path()).unwrap();

        let mut page = Page::new(0);
        assert!(disk.read_page(-1, &mut page).is_err());
    }
}
