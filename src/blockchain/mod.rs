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

//! External collaborator contracts
//!
//! The core calls out to three authorities it does not own: the RPC daemon
//! (confirmation oracle and transaction detail source), the chain-tip index
//! (heights, confirmations, reorg detection), and the historical resync
//! mechanism. It also emits fire-and-forget notifications consumed by the
//! push layer. Everything crosses these trait seams; no ambient handles.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use bitcoin::{BlockHash, Txid};

use async_trait::async_trait;

use crate::error::Error;
use crate::script::ScriptInfo;
use crate::types::{AddressTxItem, BlockSummary, PoolInfo, TransactionSummary};

#[cfg(feature = "rpc")]
pub mod rpc;
#[cfg(feature = "rpc")]
pub use self::rpc::{Auth, RpcConfig, RpcOracle};

/// One input of an oracle-described transaction
#[derive(Debug, Clone)]
pub struct TxInfoInput {
    /// Input index
    pub n: u32,
    /// Previous output's transaction, absent for coinbase inputs
    pub txid: Option<Txid>,
    /// Previous output's index, absent for coinbase inputs
    pub vout: Option<u32>,
    /// Raw coinbase script hex, only on coinbase inputs
    pub coinbase: Option<String>,
}

/// One output of an oracle-described transaction
#[derive(Debug, Clone)]
pub struct TxInfoOutput {
    /// Output index
    pub n: u32,
    /// Output value in satoshis
    pub value_sat: u64,
    /// Script description as supplied by the daemon
    pub script: ScriptInfo,
    /// Raw script hex, when the daemon included it
    pub script_hex: Option<String>,
}

/// Authoritative transaction description from the RPC daemon
#[derive(Debug, Clone)]
pub struct TxInfo {
    /// Transaction id
    pub txid: Txid,
    /// Confirmation depth; zero while in the mempool
    pub confirmations: u32,
    /// Block or reception timestamp, when the daemon reports one
    pub time: Option<u64>,
    /// Serialized size in bytes
    pub size: usize,
    /// Coinbase transaction
    pub is_coinbase: bool,
    /// Sum of outputs in satoshis
    pub value_out_sat: u64,
    /// Inputs with indices assigned
    pub inputs: Vec<TxInfoInput>,
    /// Outputs with script descriptions
    pub outputs: Vec<TxInfoOutput>,
}

/// Authoritative fallback source of confirmation depth and transaction
/// detail, typically the blockchain daemon's RPC interface.
///
/// `Ok(None)` means the daemon genuinely does not know the transaction; it
/// is a normal result, distinct from a transport or server error.
#[async_trait]
pub trait ConfirmationOracle: Send + Sync {
    /// Describe one transaction, or `None` when unknown
    async fn transaction_info(&self, txid: &Txid) -> Result<Option<TxInfo>, Error>;
}

/// A block to append to the chain-tip index
#[derive(Debug, Clone)]
pub struct TipBlock {
    /// Block hash
    pub hash: BlockHash,
    /// Parent block hash
    pub previous_hash: BlockHash,
    /// Block timestamp
    pub time: u64,
    /// Transactions in block order
    pub txids: Vec<Txid>,
}

/// Height and timing detail the chain-tip index holds for a stored block
#[derive(Debug, Clone)]
pub struct BlockInfo {
    /// Block hash
    pub hash: BlockHash,
    /// Height on the active chain
    pub height: u32,
    /// Block timestamp
    pub time: u64,
}

/// The external block-chain-tip/height index. The core never mutates it
/// beyond [`store_tip_block`](ChainTipIndex::store_tip_block); it owns chain
/// geometry, the core owns transaction/address data.
#[async_trait]
pub trait ChainTipIndex: Send + Sync {
    /// Fill fresh confirmation counts (funding and spend side) into the
    /// given activity entries, setting the confirmed flags for entries it
    /// can place on the active chain
    async fn fill_confirmations(&self, items: &mut [AddressTxItem]) -> Result<(), Error>;

    /// Append a block at the tip, returning the new height. Fails with
    /// [`Error::NeedSync`] when the block's parent is unknown (orphan); a
    /// full historical resync is the only recovery path.
    async fn store_tip_block(&self, block: &TipBlock, allow_reorgs: bool) -> Result<u32, Error>;

    /// Detail for a stored block, or `None` when unknown
    async fn block_info(&self, hash: &BlockHash) -> Result<Option<BlockInfo>, Error>;
}

/// Handle to the historical resync mechanism, triggered on orphan blocks
#[async_trait]
pub trait ResyncTrigger: Send + Sync {
    /// Kick off a full resync pass
    async fn trigger(&self) -> Result<(), Error>;
}

/// A resync handle for deployments without one; orphans are only logged
#[derive(Debug, Clone, Default)]
pub struct NoopResync;

#[async_trait]
impl ResyncTrigger for NoopResync {
    async fn trigger(&self) -> Result<(), Error> {
        log::warn!("orphan block received but no resync mechanism is wired up");
        Ok(())
    }
}

/// Best-effort mining pool attribution from a coinbase payout address
pub trait PoolMatcher: Send + Sync {
    /// Pool matching the address, when one is known. Never fails.
    fn matches(&self, address: &str) -> Option<PoolInfo>;
}

/// Config-driven [`PoolMatcher`] over a fixed payout-address table
#[derive(Debug, Clone, Default)]
pub struct StaticPoolMatcher {
    pools: std::collections::HashMap<String, PoolInfo>,
}

impl StaticPoolMatcher {
    /// Build a matcher from `(payout address, pool)` pairs
    pub fn new<I: IntoIterator<Item = (String, PoolInfo)>>(pools: I) -> Self {
        StaticPoolMatcher {
            pools: pools.into_iter().collect(),
        }
    }
}

impl PoolMatcher for StaticPoolMatcher {
    fn matches(&self, address: &str) -> Option<PoolInfo> {
        self.pools.get(address).cloned()
    }
}

/// Outbound notifications, consumed by the push layer. Out-of-band signals:
/// losing one must never corrupt index state, so every hook is
/// fire-and-forget and defaults to a no-op.
pub trait IndexEvents: Send + Sync {
    /// Addresses touched by a freshly indexed transaction
    fn on_addresses_touched(&self, _txid: &Txid, _addresses: &HashSet<String>) {}

    /// A transaction was indexed
    fn on_transaction_indexed(&self, _summary: &TransactionSummary) {}

    /// A block was stored and its transactions indexed
    fn on_block_indexed(&self, _summary: &BlockSummary) {}
}

/// Listener for deployments without a push layer
#[derive(Debug, Clone, Default)]
pub struct NoopEvents;

impl IndexEvents for NoopEvents {}

#[async_trait]
impl<T: ConfirmationOracle> ConfirmationOracle for Arc<T> {
    async fn transaction_info(&self, txid: &Txid) -> Result<Option<TxInfo>, Error> {
        self.deref().transaction_info(txid).await
    }
}

#[async_trait]
impl<T: ChainTipIndex> ChainTipIndex for Arc<T> {
    async fn fill_confirmations(&self, items: &mut [AddressTxItem]) -> Result<(), Error> {
        self.deref().fill_confirmations(items).await
    }

    async fn store_tip_block(&self, block: &TipBlock, allow_reorgs: bool) -> Result<u32, Error> {
        self.deref().store_tip_block(block, allow_reorgs).await
    }

    async fn block_info(&self, hash: &BlockHash) -> Result<Option<BlockInfo>, Error> {
        self.deref().block_info(hash).await
    }
}
