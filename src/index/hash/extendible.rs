// Extendible Hash Table
//
// Disk-resident hash index over the buffer pool. A directory page maps the
// low `global_depth` bits of a key's hash to bucket pages; buckets split on
// overflow (doubling the directory when needed) and merge with their split
// image when emptied, shrinking the directory back.
//
// Concurrency discipline: a table-level reader-writer lock gates structural
// decisions, per-page latches gate payloads. Reads and fast-path inserts
// take the table lock shared; splits, removes and merges take it exclusive.
// The table lock is always acquired before any page latch.

use std::marker::PhantomData;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use log::debug;

use crate::common::hash::{DefaultHashFunction, HashFunction};
use crate::common::types::{PageId, PagePtr, INVALID_PAGE_ID};
use crate::index::IndexError;
use crate::storage::buffer::ParallelBufferPool;
use crate::storage::page::{
    max_bucket_capacity, BucketView, BucketViewMut, FixedCodec, HashDirectoryPage,
    MAX_BUCKET_DEPTH,
};

pub struct ExtendibleHashTable<K, V, H = DefaultHashFunction> {
    buffer_pool: Arc<ParallelBufferPool>,
    hash_fn: H,
    bucket_capacity: usize,
    /// Set once on first use, under its own latch.
    directory_page_id: Mutex<PageId>,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, H> ExtendibleHashTable<K, V, H>
where
    K: FixedCodec + PartialEq,
    V: FixedCodec + PartialEq,
    H: HashFunction<K>,
{
    pub fn new(buffer_pool: Arc<ParallelBufferPool>, hash_fn: H) -> Self {
        let bucket_capacity = max_bucket_capacity::<K, V>();
        Self::with_bucket_capacity(buffer_pool, hash_fn, bucket_capacity)
    }

    /// Same table with a reduced bucket capacity. Lets tests drive splits
    /// with a handful of keys.
    pub fn with_bucket_capacity(
        buffer_pool: Arc<ParallelBufferPool>,
        hash_fn: H,
        bucket_capacity: usize,
    ) -> Self {
        assert!(bucket_capacity > 0 && bucket_capacity <= max_bucket_capacity::<K, V>());
        Self {
            buffer_pool,
            hash_fn,
            bucket_capacity,
            directory_page_id: Mutex::new(INVALID_PAGE_ID),
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash(key)
    }

    /// Look up all values stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, IndexError> {
        let _table = self.table_latch.read();

        let (dir_page, dir) = self.fetch_directory()?;
        let dir_index = self.dir_index(key, &dir);
        let bucket_page_id = dir.bucket_page_id(dir_index);

        let bucket_page = self.fetch_bucket(bucket_page_id, &dir_page, &dir)?;
        let result = {
            let bucket_guard = bucket_page.read();
            BucketView::<K, V>::new(&bucket_guard.data, self.bucket_capacity).get_value(key)
        };

        self.buffer_pool.unpin_page(bucket_page_id, false);
        self.buffer_pool.unpin_page(dir.page_id(), false);
        Ok(result)
    }

    /// Insert a (key, value) pair. Returns false on an exact duplicate, or
    /// when the bucket is full and its directory slots are exhausted.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        {
            let _table = self.table_latch.read();

            let (dir_page, dir) = self.fetch_directory()?;
            let dir_index = self.dir_index(key, &dir);
            let bucket_page_id = dir.bucket_page_id(dir_index);

            let bucket_page = self.fetch_bucket(bucket_page_id, &dir_page, &dir)?;
            let mut bucket_guard = bucket_page.write();
            let mut bucket = BucketViewMut::<K, V>::new(&mut bucket_guard.data, self.bucket_capacity);

            if !bucket.as_view().is_full() {
                let inserted = bucket.insert(key, value);
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, inserted);
                self.buffer_pool.unpin_page(dir.page_id(), false);
                return Ok(inserted);
            }

            drop(bucket_guard);
            self.buffer_pool.unpin_page(bucket_page_id, false);
            self.buffer_pool.unpin_page(dir.page_id(), false);
        }

        self.split_insert(key, value)
    }

    /// Slow insert path: split the overflowing bucket, doubling the
    /// directory when its depth is already global, then retry the insert.
    fn split_insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        {
            let _table = self.table_latch.write();

            let (dir_page, mut dir) = self.fetch_directory()?;
            let split_index = self.dir_index(key, &dir);
            let split_depth = dir.local_depth(split_index);

            if split_depth >= MAX_BUCKET_DEPTH {
                self.buffer_pool.unpin_page(dir.page_id(), false);
                return Ok(false);
            }

            if split_depth == dir.global_depth() {
                dir.incr_global_depth();
            }
            dir.incr_local_depth(split_index);
            let new_depth = dir.local_depth(split_index);

            let split_page_id = dir.bucket_page_id(split_index);
            let split_page = self.fetch_bucket(split_page_id, &dir_page, &dir)?;

            let (image_page, image_page_id) = match self.buffer_pool.new_page() {
                Ok(ok) => ok,
                Err(e) => {
                    self.buffer_pool.unpin_page(split_page_id, false);
                    self.buffer_pool.unpin_page(dir.page_id(), false);
                    return Err(e.into());
                }
            };
            let image_index = split_index ^ (1 << (new_depth - 1));
            dir.set_local_depth(image_index, new_depth);
            dir.set_bucket_page_id(image_index, image_page_id);

            // Rehash every entry of the old bucket under the new mask;
            // entries whose bits match the split slot stay, the rest move.
            {
                let mut split_guard = split_page.write();
                let mut image_guard = image_page.write();
                let mut split_bucket =
                    BucketViewMut::<K, V>::new(&mut split_guard.data, self.bucket_capacity);
                let entries = split_bucket.as_view().readable_entries();
                split_bucket.reset();

                let mut image_bucket =
                    BucketViewMut::<K, V>::new(&mut image_guard.data, self.bucket_capacity);
                let mask = dir.local_depth_mask(split_index) as usize;
                let home = split_index & mask;
                for (k, v) in &entries {
                    if (self.hash(k) as usize & mask) == home {
                        split_bucket.insert(k, v);
                    } else {
                        image_bucket.insert(k, v);
                    }
                }
            }

            // Every directory slot aliasing either half follows its half.
            let stride = 1usize << new_depth;
            self.propagate(&mut dir, split_index, stride, new_depth, split_page_id);
            self.propagate(&mut dir, image_index, stride, new_depth, image_page_id);

            debug!(
                "split bucket page {} -> {} at depth {}",
                split_page_id, image_page_id, new_depth
            );

            {
                let mut dir_guard = dir_page.write();
                dir_guard.data = dir.to_bytes();
            }
            self.buffer_pool.unpin_page(split_page_id, true);
            self.buffer_pool.unpin_page(image_page_id, true);
            self.buffer_pool.unpin_page(dir.page_id(), true);
        }

        // The rehash may not have relieved pressure on the target slot;
        // retrying repeats the split at the next depth.
        self.insert(key, value)
    }

    /// Remove a (key, value) pair, merging the bucket away when it empties.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        let bucket_index;
        {
            let _table = self.table_latch.write();

            let (dir_page, dir) = self.fetch_directory()?;
            bucket_index = self.dir_index(key, &dir);
            let bucket_page_id = dir.bucket_page_id(bucket_index);

            let bucket_page = self.fetch_bucket(bucket_page_id, &dir_page, &dir)?;
            let (removed, now_empty) = {
                let mut bucket_guard = bucket_page.write();
                let mut bucket =
                    BucketViewMut::<K, V>::new(&mut bucket_guard.data, self.bucket_capacity);
                let removed = bucket.remove(key, value);
                (removed, bucket.as_view().is_empty())
            };

            self.buffer_pool.unpin_page(bucket_page_id, removed);
            self.buffer_pool.unpin_page(dir.page_id(), false);

            if !removed {
                return Ok(false);
            }
            if !now_empty {
                return Ok(true);
            }
        }

        self.merge(bucket_index)?;
        Ok(true)
    }

    /// Fold an empty bucket into its split image and shrink the directory
    /// while possible. Cascades: if the surviving bucket is itself empty it
    /// merges too, so a drained table collapses to a single bucket at
    /// global depth zero.
    fn merge(&self, bucket_index: usize) -> Result<(), IndexError> {
        let _table = self.table_latch.write();

        let (dir_page, mut dir) = self.fetch_directory()?;
        let mut index = bucket_index;
        let mut dirty = false;

        loop {
            // The directory may have shrunk since the index was computed.
            index &= dir.global_depth_mask() as usize;

            let depth = dir.local_depth(index);
            if depth == 0 {
                break;
            }
            let image_index = dir.split_image_index(index);
            if dir.local_depth(image_index) != depth {
                break;
            }

            let bucket_page_id = dir.bucket_page_id(index);
            let image_page_id = dir.bucket_page_id(image_index);
            if bucket_page_id == image_page_id {
                break;
            }

            let bucket_page = self.fetch_bucket(bucket_page_id, &dir_page, &dir)?;
            let still_empty = {
                let bucket_guard = bucket_page.read();
                BucketView::<K, V>::new(&bucket_guard.data, self.bucket_capacity).is_empty()
            };
            self.buffer_pool.unpin_page(bucket_page_id, false);
            if !still_empty {
                break;
            }

            if !self.buffer_pool.delete_page(bucket_page_id)? {
                break;
            }

            let new_depth = depth - 1;
            for i in 0..dir.size() {
                let pid = dir.bucket_page_id(i);
                if pid == bucket_page_id || pid == image_page_id {
                    dir.set_bucket_page_id(i, image_page_id);
                    dir.set_local_depth(i, new_depth);
                }
            }
            while dir.can_shrink() {
                dir.decr_global_depth();
            }
            dirty = true;
            debug!(
                "merged bucket page {} into {} at depth {}",
                bucket_page_id, image_page_id, new_depth
            );

            index = image_index;
        }

        if dirty {
            let mut dir_guard = dir_page.write();
            dir_guard.data = dir.to_bytes();
        }
        self.buffer_pool.unpin_page(dir.page_id(), dirty);
        Ok(())
    }

    /// Current global depth. Test support.
    pub fn global_depth(&self) -> Result<u32, IndexError> {
        let _table = self.table_latch.read();
        let (_dir_page, dir) = self.fetch_directory()?;
        let depth = dir.global_depth();
        self.buffer_pool.unpin_page(dir.page_id(), false);
        Ok(depth)
    }

    /// Panics if the directory violates its invariants. Test support.
    pub fn verify_integrity(&self) -> Result<(), IndexError> {
        let _table = self.table_latch.read();
        let (_dir_page, dir) = self.fetch_directory()?;
        dir.verify_integrity();
        self.buffer_pool.unpin_page(dir.page_id(), false);
        Ok(())
    }

    fn dir_index(&self, key: &K, dir: &HashDirectoryPage) -> usize {
        (self.hash(key) & dir.global_depth_mask()) as usize
    }

    /// Fetch (and lazily create) the directory page. The returned page is
    /// pinned; callers unpin it via `dir.page_id()`.
    fn fetch_directory(&self) -> Result<(PagePtr, HashDirectoryPage), IndexError> {
        {
            let mut dir_page_id = self.directory_page_id.lock();
            if *dir_page_id == INVALID_PAGE_ID {
                let (dir_page, new_dir_page_id) = self.buffer_pool.new_page()?;
                let (_bucket_page, bucket_page_id) = match self.buffer_pool.new_page() {
                    Ok(ok) => ok,
                    Err(e) => {
                        self.buffer_pool.unpin_page(new_dir_page_id, false);
                        return Err(e.into());
                    }
                };

                let mut dir = HashDirectoryPage::new(new_dir_page_id);
                dir.set_bucket_page_id(0, bucket_page_id);
                {
                    let mut dir_guard = dir_page.write();
                    dir_guard.data = dir.to_bytes();
                }

                // A fresh page is zeroed, which is exactly an empty bucket.
                self.buffer_pool.unpin_page(bucket_page_id, true);
                self.buffer_pool.unpin_page(new_dir_page_id, true);
                *dir_page_id = new_dir_page_id;
            }
        }

        let dir_page_id = *self.directory_page_id.lock();
        let dir_page = self.buffer_pool.fetch_page(dir_page_id)?;
        let dir = {
            let dir_guard = dir_page.read();
            HashDirectoryPage::from_bytes(&dir_guard.data)
        };
        Ok((dir_page, dir))
    }

    /// Fetch a bucket page, unpinning the directory on failure.
    fn fetch_bucket(
        &self,
        bucket_page_id: PageId,
        _dir_page: &PagePtr,
        dir: &HashDirectoryPage,
    ) -> Result<PagePtr, IndexError> {
        match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(page) => Ok(page),
            Err(e) => {
                self.buffer_pool.unpin_page(dir.page_id(), false);
                Err(e.into())
            }
        }
    }

    fn propagate(
        &self,
        dir: &mut HashDirectoryPage,
        index: usize,
        stride: usize,
        depth: u32,
        page_id: PageId,
    ) {
        let start = index & (stride - 1);
        let mut i = start;
        while i < dir.size() {
            dir.set_local_depth(i, depth);
            dir.set_bucket_page_id(i, page_id);
            i += stride;
        }
    }
}
