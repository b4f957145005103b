// Bitcoin Dev Kit
// Written in 2020 by Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020-2021 Bitcoin Dev Kit Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Ordered key-value store adapter
//!
//! The index persists everything in one ordered byte-string store. The
//! contract here is load-bearing: keys iterate in ascending byte order,
//! prefix scans are bounded, and a committed batch is visible as a unit or
//! not at all. [`MemoryStore`] is always available; the `key-value-db`
//! feature adds a [`sled`] backend.

use crate::error::Error;

#[cfg(feature = "key-value-db")]
pub mod keyvalue;
pub mod memory;

pub use memory::MemoryStore;

/// Write operations shared by stores and their pending batches
pub trait BatchOperations {
    /// Insert or overwrite one entry
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error>;
    /// Remove one entry; removing a missing key is not an error
    fn delete(&mut self, key: &[u8]) -> Result<(), Error>;
}

/// Read view over an ordered byte-string store
pub trait Store: BatchOperations {
    /// Point lookup; `None` means the key was never written
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// All entries whose key starts with `prefix`, in ascending key order,
    /// stopping after `limit` entries when one is given
    fn iter_prefix(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;
}

/// A store supporting atomic batched writes
pub trait BatchStore: Store {
    /// Container for a pending batch of operations
    type Batch: BatchOperations;

    /// Create a new batch
    fn begin_batch(&self) -> Self::Batch;
    /// Atomically apply a batch; either every operation is visible
    /// afterwards or none is
    fn commit_batch(&mut self, batch: Self::Batch) -> Result<(), Error>;
}

/// Smallest key strictly greater than every key starting with `key`.
/// Index prefixes are ASCII, so the last byte never wraps.
pub(crate) fn after(key: &[u8]) -> Vec<u8> {
    let mut key = key.to_vec();
    if let Some(last) = key.last_mut() {
        *last += 1;
    }
    key
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub fn test_get_put<D: Store>(mut store: D) {
        assert_eq!(store.get(b"k1").unwrap(), None);

        store.put(b"k1", b"v1").unwrap();
        store.put(b"k2", b"v2").unwrap();

        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));

        store.put(b"k1", b"v1b").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1b".to_vec()));
    }

    pub fn test_delete<D: Store>(mut store: D) {
        store.put(b"k1", b"v1").unwrap();
        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);

        // deleting a missing key is fine
        store.delete(b"nope").unwrap();
    }

    pub fn test_iter_prefix_order<D: Store>(mut store: D) {
        store.put(b"a-3", b"3").unwrap();
        store.put(b"a-1", b"1").unwrap();
        store.put(b"a-2", b"2").unwrap();
        store.put(b"b-1", b"x").unwrap();
        // the entry right past the prefix range must not leak in
        store.put(b"a.", b"y").unwrap();

        let entries = store.iter_prefix(b"a-", None).unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a-1".to_vec(), b"a-2".to_vec(), b"a-3".to_vec()]);
    }

    pub fn test_iter_prefix_limit<D: Store>(mut store: D) {
        for i in 0..10u8 {
            store.put(format!("p-{}", i).as_bytes(), &[i]).unwrap();
        }

        assert_eq!(store.iter_prefix(b"p-", Some(3)).unwrap().len(), 3);
        assert_eq!(store.iter_prefix(b"p-", None).unwrap().len(), 10);
        assert_eq!(store.iter_prefix(b"q-", None).unwrap().len(), 0);
    }

    pub fn test_batch<D: BatchStore>(mut store: D) {
        store.put(b"pre", b"old").unwrap();

        let mut batch = store.begin_batch();
        batch.put(b"k1", b"v1").unwrap();
        batch.put(b"k2", b"v2").unwrap();
        batch.delete(b"pre").unwrap();

        // nothing visible until commit
        assert_eq!(store.get(b"k1").unwrap(), None);
        assert_eq!(store.get(b"pre").unwrap(), Some(b"old".to_vec()));

        store.commit_batch(batch).unwrap();

        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get(b"pre").unwrap(), None);
    }
}
