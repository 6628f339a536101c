use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use coraldb::catalog::{Catalog, Column, DataType, Schema};
use coraldb::storage::buffer::ParallelBufferPool;
use coraldb::storage::disk::DiskManager;
use coraldb::transaction::{LockManager, TransactionManager};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<NamedTempFile> {
    Ok(NamedTempFile::new()?)
}

// Create a sharded buffer pool backed by a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    num_instances: usize,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPool>, NamedTempFile)> {
    let file = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(file.path())?);
    let buffer_pool = Arc::new(ParallelBufferPool::new(num_instances, pool_size, disk_manager));
    Ok((buffer_pool, file))
}

// Everything a query-level test needs, wired together
#[allow(dead_code)]
pub struct TestDb {
    pub buffer_pool: Arc<ParallelBufferPool>,
    pub catalog: Arc<Catalog>,
    pub txn_manager: Arc<TransactionManager>,
    pub lock_manager: Arc<LockManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
pub fn create_test_db() -> Result<TestDb> {
    let (buffer_pool, file) = create_test_buffer_pool(2, 64)?;
    let catalog = Arc::new(Catalog::new(buffer_pool.clone()));
    let txn_manager = Arc::new(TransactionManager::new());
    let lock_manager = Arc::new(LockManager::new(txn_manager.clone()));
    Ok(TestDb {
        buffer_pool,
        catalog,
        txn_manager,
        lock_manager,
        _file: file,
    })
}

// Schema used by most executor tests: (id INTEGER, name TEXT)
#[allow(dead_code)]
pub fn id_name_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::Text),
    ])
}
