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

//! A transaction/address indexing engine for blockchain explorers.
//!
//! From a stream of blocks and transactions supplied by a peer-to-peer node,
//! `addrindex` derives a queryable index mapping addresses to balances and
//! transaction history, and outputs to spending inputs. The cross-references
//! stay consistent while data arrives out of order from the p2p stream, the
//! RPC fallback and historical backfill, and while the chain itself can
//! reorganize.
//!
//! The moving parts:
//!
//! - [`database`]: the ordered key-value store contract with an in-memory
//!   backend and a [`sled`] backend behind the `key-value-db` feature
//! - [`index::TransactionIndex`]: output records, spent markers and
//!   per-address activity entries, plus the confirmation cache
//! - [`address::AddressAggregator`]: point-in-time balance/history views,
//!   reconciled against the RPC oracle with bounded concurrency
//! - [`indexer::Indexer`]: the ingestion pipeline reacting to p2p events,
//!   with orphan-block detection and resync triggering
//! - [`blockchain`]: the contracts of the external collaborators (RPC
//!   oracle, chain-tip index, pool matcher, notification listeners)
//!
//! ## Example
//!
//! ```
//! use addrindex::database::MemoryStore;
//! use addrindex::{IndexConfig, TransactionIndex};
//!
//! let index = TransactionIndex::new(MemoryStore::new(), IndexConfig::default());
//! assert_eq!(index.safe_confirmations(), 6);
//! ```

pub extern crate bitcoin;
extern crate log;
extern crate serde;
extern crate serde_json;

#[cfg(feature = "key-value-db")]
pub extern crate sled;

#[cfg(feature = "rpc")]
pub extern crate reqwest;

#[macro_use]
pub mod error;
pub mod address;
pub mod blockchain;
pub mod database;
pub mod index;
pub mod indexer;
pub mod script;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use address::{AddressAggregator, AddressOptions};
pub use error::Error;
pub use index::TransactionIndex;
pub use indexer::Indexer;
pub use types::*;
