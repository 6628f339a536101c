use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Page ID type
pub type PageId = i32;

/// Sentinel page ID denoting absence
pub const INVALID_PAGE_ID: PageId = -1;

/// Buffer pool frame ID type
pub type FrameId = i32;

/// Transaction ID type
pub type TxnId = u32;

/// Record identifier: a (page, slot) pair addressing a tuple in a heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn invalid() -> Self {
        Self { page_id: INVALID_PAGE_ID, slot: 0 }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }
}

/// Smart pointer to a page; the RwLock doubles as the page latch
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: FrameId,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            is_dirty: false,
            pin_count: 0,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
