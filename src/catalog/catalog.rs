use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::catalog::schema::Schema;
use crate::index::{HashIndex, IndexError, TableIndex};
use crate::storage::buffer::ParallelBufferPool;
use crate::storage::table::{TableError, TableHeap};
use crate::transaction::Transaction;

pub type TableOid = u32;
pub type IndexOid = u32;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Metadata for a table: schema, heap, name, oid.
pub struct TableInfo {
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
    pub name: String,
    pub oid: TableOid,
}

/// Metadata for an index on a table.
pub struct IndexInfo {
    name: String,
    table_name: String,
    index: Arc<dyn TableIndex>,
    oid: IndexOid,
}

impl IndexInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn index(&self) -> &Arc<dyn TableIndex> {
        &self.index
    }

    pub fn oid(&self) -> IndexOid {
        self.oid
    }

    pub fn key_attrs(&self) -> &[usize] {
        self.index.key_attrs()
    }
}

/// Name and oid registry for tables and their indexes.
pub struct Catalog {
    buffer_pool: Arc<ParallelBufferPool>,
    tables: Mutex<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: Mutex<HashMap<String, TableOid>>,
    indexes: Mutex<HashMap<IndexOid, Arc<IndexInfo>>>,
    table_indexes: Mutex<HashMap<String, Vec<IndexOid>>>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<ParallelBufferPool>) -> Self {
        Self {
            buffer_pool,
            tables: Mutex::new(HashMap::new()),
            table_names: Mutex::new(HashMap::new()),
            indexes: Mutex::new(HashMap::new()),
            table_indexes: Mutex::new(HashMap::new()),
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
        }
    }

    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        let mut table_names = self.table_names.lock();
        if table_names.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let oid = self.next_table_oid.fetch_add(1, Ordering::SeqCst);
        let info = Arc::new(TableInfo {
            schema,
            heap: Arc::new(TableHeap::new(self.buffer_pool.clone())),
            name: name.clone(),
            oid,
        });

        table_names.insert(name, oid);
        self.tables.lock().insert(oid, info.clone());
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.lock().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.lock().get(name)?;
        self.get_table(oid)
    }

    /// Create a hash index over `key_attrs` of an existing table and
    /// backfill it from the table's current contents.
    pub fn create_index(
        &self,
        index_name: impl Into<String>,
        table_name: &str,
        key_attrs: Vec<usize>,
        txn: &Arc<Transaction>,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        let table_info = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        {
            let indexes = self.indexes.lock();
            if indexes.values().any(|i| i.name == index_name) {
                return Err(CatalogError::IndexExists(index_name));
            }
        }

        let key_schema = table_info.schema.project(&key_attrs);
        let index: Arc<dyn TableIndex> = Arc::new(HashIndex::new(
            self.buffer_pool.clone(),
            key_schema,
            key_attrs,
        ));

        // Backfill from existing rows.
        let mut iter = table_info.heap.clone().iter();
        while let Some((tuple, rid)) = iter.next()? {
            let key = tuple.key_from_tuple(index.key_attrs());
            index.insert_entry(&key, rid, txn)?;
        }

        let oid = self.next_index_oid.fetch_add(1, Ordering::SeqCst);
        let info = Arc::new(IndexInfo {
            name: index_name,
            table_name: table_name.to_string(),
            index,
            oid,
        });

        self.indexes.lock().insert(oid, info.clone());
        self.table_indexes
            .lock()
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(info)
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let oids = self
            .table_indexes
            .lock()
            .get(table_name)
            .cloned()
            .unwrap_or_default();
        let indexes = self.indexes.lock();
        oids.iter().filter_map(|oid| indexes.get(oid).cloned()).collect()
    }

    pub fn index_by_oid(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.lock().get(&oid).cloned()
    }
}
