// Export public modules
pub mod catalog;
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use index::ExtendibleHashTable;
pub use storage::buffer::{BufferPoolError, BufferPoolInstance, ParallelBufferPool};
pub use storage::disk::DiskManager;
pub use transaction::{LockManager, TransactionManager};
