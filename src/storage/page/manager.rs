use crate::common::types::{Page, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::header::PageHeader;
use crate::storage::page::layout::{RecordLocation, HEADER_SIZE, RECORD_OFFSET_SIZE};

/// Slotted-page record manager.
///
/// Record locations are stored as a slot array growing from the end of the
/// page; record data grows forward from just past the header.
pub struct PageManager;

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = PageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    /// Insert a record, returning its slot index
    pub fn insert_record(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.get_header(page);

        // Record size plus the slot entry for the record
        let record_size = data.len() as u32;
        let total_space_needed = record_size + RECORD_OFFSET_SIZE as u32;

        if header.free_space_size < total_space_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot_pos = Self::slot_position(header.record_count);
        let record_loc = RecordLocation {
            offset: header.free_space_offset,
            length: record_size,
        };

        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);
        page.data[slot_pos..slot_pos + RECORD_OFFSET_SIZE].copy_from_slice(&record_loc.to_bytes());

        header.free_space_offset += record_size;
        header.free_space_size -= total_space_needed;
        header.record_count += 1;
        self.set_header(page, &header);

        Ok(header.record_count - 1)
    }

    /// Logically delete a record by zeroing its slot length. The space is
    /// not reclaimed; readers and iterators treat the slot as absent.
    pub fn delete_record(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let header = self.get_header(page);

        if slot >= header.record_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = Self::slot_position(slot);
        let mut record_loc = self.record_location(page, slot_pos);

        if record_loc.length == 0 {
            return Err(PageError::RecordNotFound); // Already deleted
        }

        record_loc.length = 0;
        page.data[slot_pos..slot_pos + RECORD_OFFSET_SIZE].copy_from_slice(&record_loc.to_bytes());

        Ok(())
    }

    /// Replace a record in place. Growing records relocate within the page,
    /// keeping their slot index stable.
    pub fn update_record(&self, page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let mut header = self.get_header(page);

        if slot >= header.record_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = Self::slot_position(slot);
        let record_loc = self.record_location(page, slot_pos);

        if record_loc.length == 0 {
            return Err(PageError::RecordNotFound); // Deleted record
        }

        let new_size = data.len() as u32;

        if new_size > record_loc.length {
            // Relocate: write the new image at the free-space frontier so the
            // slot index (and hence the RID) stays stable.
            let space_needed = new_size - record_loc.length;
            if header.free_space_size < space_needed {
                return Err(PageError::InsufficientSpace);
            }

            let new_offset = header.free_space_offset;
            let new_end = new_offset as usize + data.len();
            page.data[new_offset as usize..new_end].copy_from_slice(data);

            let new_record_loc = RecordLocation {
                offset: new_offset,
                length: new_size,
            };
            page.data[slot_pos..slot_pos + RECORD_OFFSET_SIZE]
                .copy_from_slice(&new_record_loc.to_bytes());

            header.free_space_offset += new_size;
            header.free_space_size -= space_needed;
            self.set_header(page, &header);

            return Ok(());
        }

        page.data[record_loc.offset as usize..record_loc.offset as usize + data.len()]
            .copy_from_slice(data);

        if new_size < record_loc.length {
            let new_record_loc = RecordLocation {
                offset: record_loc.offset,
                length: new_size,
            };
            page.data[slot_pos..slot_pos + RECORD_OFFSET_SIZE]
                .copy_from_slice(&new_record_loc.to_bytes());
        }

        Ok(())
    }

    pub fn get_record(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let header = self.get_header(page);

        if slot >= header.record_count {
            return Err(PageError::InvalidRecordId);
        }

        let slot_pos = Self::slot_position(slot);
        let record_loc = self.record_location(page, slot_pos);

        if record_loc.length == 0 {
            return Err(PageError::RecordNotFound); // Deleted record
        }

        let start = record_loc.offset as usize;
        let end = start + record_loc.length as usize;
        Ok(page.data[start..end].to_vec())
    }

    pub fn get_header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn set_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn get_free_space(&self, page: &Page) -> u32 {
        self.get_header(page).free_space_size
    }

    // Helper methods

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - RECORD_OFFSET_SIZE * (slot as usize + 1)
    }

    fn record_location(&self, page: &Page, slot_pos: usize) -> RecordLocation {
        RecordLocation::from_bytes(&page.data[slot_pos..slot_pos + RECORD_OFFSET_SIZE])
    }
}
