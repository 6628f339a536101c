pub mod hash;
pub mod key;
pub mod table_index;

use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Key codec error: {0}")]
    KeyCodec(#[from] bincode::Error),
}

pub use hash::ExtendibleHashTable;
pub use key::{CompositeKey, INDEX_KEY_SIZE};
pub use table_index::{HashIndex, TableIndex};
