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

//! Ingestion pipeline
//!
//! Consumes normalized peer events one at a time, writes into the
//! transaction index, and coordinates with the chain-tip index for
//! orphan/reorg recovery. Events handed in while disconnected are dropped;
//! the historical resync is the safety net for any gap that opens.

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::Txid;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::blockchain::{
    ChainTipIndex, ConfirmationOracle, IndexEvents, NoopEvents, NoopResync, PoolMatcher,
    ResyncTrigger, StaticPoolMatcher, TipBlock,
};
use crate::database::BatchStore;
use crate::error::Error;
use crate::index::TransactionIndex;
use crate::script::{self, ScriptAddress};
use crate::types::*;

/// Drives the transaction index from peer block/tx events
pub struct Indexer<D: BatchStore, O: ConfirmationOracle, C: ChainTipIndex> {
    index: TransactionIndex<D>,
    oracle: O,
    chain: C,
    pools: Box<dyn PoolMatcher>,
    events: Box<dyn IndexEvents>,
    resync: Box<dyn ResyncTrigger>,
    allow_reorgs: bool,
    connected: bool,
    peer: Option<String>,
}

impl<D: BatchStore, O: ConfirmationOracle, C: ChainTipIndex> Indexer<D, O, C> {
    /// Create a pipeline over injected collaborators. Notifications, pool
    /// matching and resync default to no-ops until wired up.
    pub fn new(index: TransactionIndex<D>, oracle: O, chain: C) -> Self {
        Indexer {
            index,
            oracle,
            chain,
            pools: Box::new(StaticPoolMatcher::default()),
            events: Box::new(NoopEvents),
            resync: Box::new(NoopResync),
            allow_reorgs: false,
            connected: true,
            peer: None,
        }
    }

    /// Attach a notification listener
    pub fn with_events(mut self, events: Box<dyn IndexEvents>) -> Self {
        self.events = events;
        self
    }

    /// Attach a mining pool matcher
    pub fn with_pool_matcher(mut self, pools: Box<dyn PoolMatcher>) -> Self {
        self.pools = pools;
        self
    }

    /// Attach the historical resync mechanism
    pub fn with_resync(mut self, resync: Box<dyn ResyncTrigger>) -> Self {
        self.resync = resync;
        self
    }

    /// Whether the chain-tip index may reorganize when storing blocks
    pub fn allow_reorgs(mut self, allow: bool) -> Self {
        self.allow_reorgs = allow;
        self
    }

    /// The underlying index
    pub fn index(&self) -> &TransactionIndex<D> {
        &self.index
    }

    /// Mutable access to the underlying index
    pub fn index_mut(&mut self) -> &mut TransactionIndex<D> {
        &mut self.index
    }

    /// An [`AddressAggregator`](crate::address::AddressAggregator) borrowing
    /// this pipeline's index and collaborators
    pub fn aggregator(&mut self) -> crate::address::AddressAggregator<'_, D, O, C> {
        crate::address::AddressAggregator::new(&mut self.index, &self.oracle, &self.chain)
    }

    /// Mark the peer connection as established
    pub fn peer_connected(&mut self, peer: Option<String>) {
        info!("peer connected{}", peer.as_deref().unwrap_or(""));
        self.connected = true;
        self.peer = peer;
    }

    /// Mark the peer connection as lost. Events handed in from now on are
    /// dropped; there is no backlog.
    pub fn peer_disconnected(&mut self) {
        warn!("peer disconnected, event forwarding stopped");
        self.connected = false;
    }

    /// Connection status, for operators
    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            connected: self.connected,
            peer: self.peer.clone(),
        }
    }

    /// Handle one transaction event: index it and notify listeners with a
    /// summarized payload. Quarantined transactions are logged and skipped
    /// without failing the stream.
    pub async fn handle_tx(&mut self, mut tx: NormalizedTx) -> Result<(), Error> {
        if !self.connected {
            debug!("dropping tx {} received while disconnected", tx.txid);
            return Ok(());
        }
        if tx.time == 0 {
            tx.time = now_ts();
        }

        let touched = match self.index.record_transaction(&tx) {
            Ok(touched) => touched,
            // already quarantined and logged; the stream goes on
            Err(Error::NonStandardOutput { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        match self.transaction_detail(&tx.txid).await {
            Ok(Some(summary)) => {
                self.events.on_transaction_indexed(&summary);
                self.events.on_addresses_touched(&tx.txid, &touched);
            }
            Ok(None) => debug!("tx {} unknown to the daemon, notification skipped", tx.txid),
            Err(e) => warn!("could not summarize tx {}: {}", tx.txid, e),
        }

        Ok(())
    }

    /// Handle one block event: append it to the chain-tip index, ensure its
    /// transactions are indexed, and notify listeners. An orphan block
    /// (unknown parent) triggers the historical resync and suppresses the
    /// notification.
    pub async fn handle_block(&mut self, mut block: NormalizedBlock) -> Result<(), Error> {
        if !self.connected {
            debug!("dropping block {} received while disconnected", block.hash);
            return Ok(());
        }
        for tx in block.txs.iter_mut() {
            if tx.time == 0 {
                tx.time = block.time;
            }
        }

        let tip = TipBlock {
            hash: block.hash,
            previous_hash: block.previous_hash,
            time: block.time,
            txids: block.txs.iter().map(|tx| tx.txid).collect(),
        };
        let height = match self.chain.store_tip_block(&tip, self.allow_reorgs).await {
            Ok(height) => height,
            Err(Error::NeedSync) => {
                warn!("orphan block {}, triggering historical resync", block.hash);
                if let Err(e) = self.resync.trigger().await {
                    error!("resync trigger failed: {}", e);
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        debug!("block {} stored at height {}", block.hash, height);

        // idempotent: re-applying transactions already seen over p2p writes
        // the same keys again
        self.index.record_many(&block.txs)?;

        let pool = self.pool_attribution(block.txs.first()).await;

        let detail = match self.chain.block_info(&block.hash).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                warn!("block {} vanished from the chain-tip index", block.hash);
                return Ok(());
            }
            Err(e) => {
                warn!("block detail fetch failed for {}: {}", block.hash, e);
                return Ok(());
            }
        };

        self.events.on_block_indexed(&BlockSummary {
            hash: block.hash,
            height: detail.height,
            time: detail.time,
            tx_count: block.txs.len(),
            size: block.size,
            pool,
        });

        Ok(())
    }

    /// Resolve the coinbase payout address through the oracle and match it
    /// against the pool table. Best effort: any failure yields the unknown
    /// pool.
    async fn pool_attribution(&self, coinbase: Option<&NormalizedTx>) -> PoolInfo {
        let coinbase = match coinbase {
            Some(coinbase) => coinbase,
            None => return PoolInfo::default(),
        };
        match self.oracle.transaction_info(&coinbase.txid).await {
            Ok(Some(info)) => {
                if let Some(first) = info.outputs.first() {
                    if let ScriptAddress::Single(addr) = first.script.resolve(self.index.network())
                    {
                        if let Some(pool) = self.pools.matches(&addr) {
                            return pool;
                        }
                    }
                }
                PoolInfo::default()
            }
            Ok(None) => PoolInfo::default(),
            Err(e) => {
                debug!("pool attribution skipped: {}", e);
                PoolInfo::default()
            }
        }
    }

    /// Assemble the human-readable summary of an indexed transaction:
    /// oracle detail plus previous outputs resolved from the index, fee and
    /// input total when every input resolves, double-spend annotations
    /// where the index disagrees with this transaction.
    pub async fn transaction_detail(
        &self,
        txid: &Txid,
    ) -> Result<Option<TransactionSummary>, Error> {
        let info = match self.oracle.transaction_info(txid).await? {
            Some(info) => info,
            None => return Ok(None),
        };
        let network = self.index.network();

        let mut inputs = Vec::with_capacity(info.inputs.len());
        let mut value_in_sat = 0u64;
        let mut incomplete_inputs = false;

        for input in &info.inputs {
            if info.is_coinbase {
                inputs.push(SummaryInput {
                    txid: None,
                    vout: None,
                    address: None,
                    value: None,
                    double_spent_txid: None,
                    merge_mined: input
                        .coinbase
                        .as_deref()
                        .map(script::is_merge_mined)
                        .unwrap_or(false),
                });
                continue;
            }

            let (prev_txid, prev_vout) = match (input.txid, input.vout) {
                (Some(t), Some(v)) => (t, v),
                _ => {
                    incomplete_inputs = true;
                    inputs.push(SummaryInput {
                        txid: None,
                        vout: None,
                        address: None,
                        value: None,
                        double_spent_txid: None,
                        merge_mined: false,
                    });
                    continue;
                }
            };

            let prev = self.index.lookup_output(&prev_txid, prev_vout)?;
            let double_spent_txid = match (&prev.spent, prev.multiple_spent_attempts.is_empty()) {
                (Some(spent), false)
                    if prev
                        .multiple_spent_attempts
                        .iter()
                        .any(|a| a.txid != *txid) =>
                {
                    Some(spent.txid)
                }
                (Some(spent), true) if spent.txid != *txid => Some(spent.txid),
                (None, _) => {
                    warn!("input spent not registered: {}:{}", prev_txid, prev_vout);
                    None
                }
                _ => None,
            };

            match prev.address {
                Some(address) => {
                    value_in_sat += prev.value_sat;
                    inputs.push(SummaryInput {
                        txid: Some(prev_txid),
                        vout: Some(prev_vout),
                        address: Some(address),
                        value: Some(sat_to_coin(prev.value_sat)),
                        double_spent_txid,
                        merge_mined: false,
                    });
                }
                None => {
                    info!(
                        "could not resolve outpoint {}:{} for {}",
                        prev_txid, prev_vout, txid
                    );
                    incomplete_inputs = true;
                    inputs.push(SummaryInput {
                        txid: Some(prev_txid),
                        vout: Some(prev_vout),
                        address: None,
                        value: None,
                        double_spent_txid,
                        merge_mined: false,
                    });
                }
            }
        }

        let outputs = info
            .outputs
            .iter()
            .map(|o| SummaryOutput {
                value: sat_to_coin(o.value_sat),
                n: o.n,
                address: match o.script.resolve(network) {
                    ScriptAddress::Single(addr) => Some(addr),
                    _ => None,
                },
            })
            .collect();

        let (value_in, fees) = if info.is_coinbase || incomplete_inputs {
            (None, None)
        } else {
            (
                Some(sat_to_coin(value_in_sat)),
                Some(sat_to_coin(value_in_sat.saturating_sub(info.value_out_sat))),
            )
        };

        Ok(Some(TransactionSummary {
            txid: info.txid,
            size: info.size,
            value_out: sat_to_coin(info.value_out_sat),
            value_in,
            fees,
            is_coinbase: info.is_coinbase,
            inputs,
            outputs,
        }))
    }
}

fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
