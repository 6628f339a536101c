use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::common::hash::DefaultHashFunction;
use crate::common::types::Rid;
use crate::index::hash::ExtendibleHashTable;
use crate::index::key::{CompositeKey, INDEX_KEY_SIZE};
use crate::index::IndexError;
use crate::storage::buffer::ParallelBufferPool;
use crate::storage::table::Tuple;
use crate::transaction::Transaction;

/// Contract a table index exposes to the executors and the transaction
/// manager: key-tuple in, rid maintenance and point lookups out.
pub trait TableIndex: Send + Sync {
    /// Insert a (key, rid) entry. False when the exact pair already exists
    /// or the index cannot grow further.
    fn insert_entry(
        &self,
        key: &Tuple,
        rid: Rid,
        txn: &Arc<Transaction>,
    ) -> Result<bool, IndexError>;

    /// Delete a (key, rid) entry. False when the pair is absent.
    fn delete_entry(
        &self,
        key: &Tuple,
        rid: Rid,
        txn: &Arc<Transaction>,
    ) -> Result<bool, IndexError>;

    /// All rids stored under `key`.
    fn scan_key(&self, key: &Tuple, txn: &Arc<Transaction>) -> Result<Vec<Rid>, IndexError>;

    fn key_schema(&self) -> &Schema;

    /// Column positions of the key within the table schema.
    fn key_attrs(&self) -> &[usize];
}

/// Hash index over a table: an extendible hash table keyed by the packed
/// key projection, valued by rid.
pub struct HashIndex {
    key_schema: Schema,
    key_attrs: Vec<usize>,
    table: ExtendibleHashTable<CompositeKey<INDEX_KEY_SIZE>, Rid, DefaultHashFunction>,
}

impl HashIndex {
    pub fn new(
        buffer_pool: Arc<ParallelBufferPool>,
        key_schema: Schema,
        key_attrs: Vec<usize>,
    ) -> Self {
        Self {
            key_schema,
            key_attrs,
            table: ExtendibleHashTable::new(buffer_pool, DefaultHashFunction),
        }
    }
}

impl TableIndex for HashIndex {
    fn insert_entry(
        &self,
        key: &Tuple,
        rid: Rid,
        _txn: &Arc<Transaction>,
    ) -> Result<bool, IndexError> {
        let packed = CompositeKey::from_tuple(key)?;
        self.table.insert(&packed, &rid)
    }

    fn delete_entry(
        &self,
        key: &Tuple,
        rid: Rid,
        _txn: &Arc<Transaction>,
    ) -> Result<bool, IndexError> {
        let packed = CompositeKey::from_tuple(key)?;
        self.table.remove(&packed, &rid)
    }

    fn scan_key(&self, key: &Tuple, _txn: &Arc<Transaction>) -> Result<Vec<Rid>, IndexError> {
        let packed = CompositeKey::from_tuple(key)?;
        self.table.get_value(&packed)
    }

    fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    fn key_attrs(&self) -> &[usize] {
        &self.key_attrs
    }
}
