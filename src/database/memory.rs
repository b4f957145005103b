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

//! In-memory ordered store over a [`BTreeMap`], mainly for tests and
//! throwaway indexes

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use crate::database::{after, BatchOperations, BatchStore, Store};
use crate::error::Error;

/// In-memory ordered key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    deleted_keys: Vec<Vec<u8>>,
}

impl MemoryStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchOperations for MemoryStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.map.remove(key);
        self.deleted_keys.push(key.to_vec());
        Ok(())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.map.get(key).cloned())
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let end = after(prefix);
        let limit = limit.unwrap_or(usize::MAX);
        Ok(self
            .map
            .range::<[u8], _>((Included(prefix), Excluded(end.as_slice())))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl BatchStore for MemoryStore {
    type Batch = Self;

    fn begin_batch(&self) -> Self::Batch {
        MemoryStore::new()
    }

    fn commit_batch(&mut self, mut batch: Self::Batch) -> Result<(), Error> {
        for key in batch.deleted_keys {
            self.map.remove(&key);
        }
        self.map.append(&mut batch.map);

        Ok(())
    }
}
