// Hash Bucket Page
//
// On-disk bucket of the extendible hash index, manipulated through typed
// views over the page byte array; layout:
//
//   occupied bitmap | readable bitmap | fixed (K, V) entry array
//
// `readable` implies `occupied`. A slot's occupied bit is never cleared by
// removal (only by a full reset during a split); the readable bit is cleared
// on logical removal.

use std::marker::PhantomData;

use crate::common::types::PAGE_SIZE;
use crate::storage::page::codec::FixedCodec;

/// Largest entry count whose bitmaps and entry array fit in one page.
pub fn max_bucket_capacity<K: FixedCodec, V: FixedCodec>() -> usize {
    let entry_size = K::ENCODED_SIZE + V::ENCODED_SIZE;
    let mut capacity = 4 * PAGE_SIZE / (4 * entry_size + 1);
    while bucket_footprint(capacity, entry_size) > PAGE_SIZE {
        capacity -= 1;
    }
    capacity
}

fn bucket_footprint(capacity: usize, entry_size: usize) -> usize {
    2 * bitmap_bytes(capacity) + capacity * entry_size
}

fn bitmap_bytes(capacity: usize) -> usize {
    (capacity + 7) / 8
}

/// Read-only view of a bucket page.
pub struct BucketView<'a, K, V> {
    data: &'a [u8],
    capacity: usize,
    _marker: PhantomData<(K, V)>,
}

/// Mutable view of a bucket page.
pub struct BucketViewMut<'a, K, V> {
    data: &'a mut [u8],
    capacity: usize,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K, V> BucketView<'a, K, V>
where
    K: FixedCodec + PartialEq,
    V: FixedCodec + PartialEq,
{
    pub fn new(data: &'a [u8], capacity: usize) -> Self {
        debug_assert!(bucket_footprint(capacity, K::ENCODED_SIZE + V::ENCODED_SIZE) <= data.len());
        Self {
            data,
            capacity,
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        read_bit(&self.data[..bitmap_bytes(self.capacity)], slot)
    }

    pub fn is_readable(&self, slot: usize) -> bool {
        let bb = bitmap_bytes(self.capacity);
        read_bit(&self.data[bb..2 * bb], slot)
    }

    pub fn key_at(&self, slot: usize) -> K {
        let at = self.entry_offset(slot);
        K::decode(&self.data[at..at + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, slot: usize) -> V {
        let at = self.entry_offset(slot) + K::ENCODED_SIZE;
        V::decode(&self.data[at..at + V::ENCODED_SIZE])
    }

    /// Collect the values of every readable entry matching `key`.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let mut result = Vec::new();
        for slot in 0..self.capacity {
            if self.is_readable(slot) && self.key_at(slot) == *key {
                result.push(self.value_at(slot));
            }
        }
        result
    }

    pub fn is_full(&self) -> bool {
        (0..self.capacity).all(|slot| self.is_readable(slot))
    }

    pub fn is_empty(&self) -> bool {
        (0..self.capacity).all(|slot| !self.is_readable(slot))
    }

    pub fn num_readable(&self) -> usize {
        (0..self.capacity).filter(|&slot| self.is_readable(slot)).count()
    }

    /// Copy out every readable (key, value) pair; used when a split rehashes
    /// a bucket.
    pub fn readable_entries(&self) -> Vec<(K, V)> {
        (0..self.capacity)
            .filter(|&slot| self.is_readable(slot))
            .map(|slot| (self.key_at(slot), self.value_at(slot)))
            .collect()
    }

    fn entry_offset(&self, slot: usize) -> usize {
        debug_assert!(slot < self.capacity);
        2 * bitmap_bytes(self.capacity) + slot * (K::ENCODED_SIZE + V::ENCODED_SIZE)
    }
}

impl<'a, K, V> BucketViewMut<'a, K, V>
where
    K: FixedCodec + PartialEq,
    V: FixedCodec + PartialEq,
{
    pub fn new(data: &'a mut [u8], capacity: usize) -> Self {
        debug_assert!(bucket_footprint(capacity, K::ENCODED_SIZE + V::ENCODED_SIZE) <= data.len());
        Self {
            data,
            capacity,
            _marker: PhantomData,
        }
    }

    pub fn as_view(&self) -> BucketView<'_, K, V> {
        BucketView::new(self.data, self.capacity)
    }

    /// Insert into the first free slot. Rejects an exact duplicate (key and
    /// value both equal) and a full bucket.
    pub fn insert(&mut self, key: &K, value: &V) -> bool {
        let mut available = None;
        for slot in 0..self.capacity {
            if self.as_view().is_readable(slot) {
                if self.as_view().key_at(slot) == *key && self.as_view().value_at(slot) == *value {
                    return false;
                }
            } else if available.is_none() {
                available = Some(slot);
            }
        }

        let slot = match available {
            Some(slot) => slot,
            None => return false,
        };

        let at = 2 * bitmap_bytes(self.capacity) + slot * (K::ENCODED_SIZE + V::ENCODED_SIZE);
        key.encode(&mut self.data[at..at + K::ENCODED_SIZE]);
        value.encode(&mut self.data[at + K::ENCODED_SIZE..at + K::ENCODED_SIZE + V::ENCODED_SIZE]);
        self.set_occupied(slot);
        self.set_readable(slot);
        true
    }

    /// Clear the readable bit of the matching (key, value) pair.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        for slot in 0..self.capacity {
            if self.as_view().is_readable(slot)
                && self.as_view().key_at(slot) == *key
                && self.as_view().value_at(slot) == *value
            {
                self.remove_at(slot);
                return true;
            }
        }
        false
    }

    pub fn remove_at(&mut self, slot: usize) {
        let bb = bitmap_bytes(self.capacity);
        clear_bit(&mut self.data[bb..2 * bb], slot);
    }

    /// Zero the bitmaps and the entry array; used before a split rehash.
    pub fn reset(&mut self) {
        let entry_size = K::ENCODED_SIZE + V::ENCODED_SIZE;
        let end = bucket_footprint(self.capacity, entry_size);
        self.data[..end].fill(0);
    }

    fn set_occupied(&mut self, slot: usize) {
        let bb = bitmap_bytes(self.capacity);
        set_bit(&mut self.data[..bb], slot);
    }

    fn set_readable(&mut self, slot: usize) {
        let bb = bitmap_bytes(self.capacity);
        set_bit(&mut self.data[bb..2 * bb], slot);
    }
}

fn read_bit(bitmap: &[u8], index: usize) -> bool {
    (bitmap[index / 8] >> (index % 8)) & 1 == 1
}

fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

fn clear_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}
