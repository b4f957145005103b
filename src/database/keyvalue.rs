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

//! Persistent ordered store backed by [`sled`]

use sled::{Batch, Tree};

use crate::database::{BatchOperations, BatchStore, Store};
use crate::error::Error;

impl BatchOperations for Tree {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.remove(key)?;
        Ok(())
    }
}

impl BatchOperations for Batch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.remove(key);
        Ok(())
    }
}

impl Store for Tree {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(Tree::get(self, key)?.map(|v| v.to_vec()))
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let limit = limit.unwrap_or(usize::MAX);
        self.scan_prefix(prefix)
            .take(limit)
            .map(|x| -> Result<_, Error> {
                let (k, v) = x?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }
}

impl BatchStore for Tree {
    type Batch = Batch;

    fn begin_batch(&self) -> Self::Batch {
        Batch::default()
    }

    fn commit_batch(&mut self, batch: Self::Batch) -> Result<(), Error> {
        Ok(self.apply_batch(batch)?)
    }
}
