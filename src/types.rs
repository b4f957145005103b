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

use std::collections::HashSet;

use bitcoin::{BlockHash, Network, OutPoint, Txid};

use serde::{Deserialize, Serialize};

use crate::script::ScriptInfo;

/// Satoshis per coin
pub const COIN: u64 = 100_000_000;

/// Convert a satoshi amount to coin units for human-readable payloads
pub fn sat_to_coin(sat: u64) -> f64 {
    sat as f64 / COIN as f64
}

/// Configuration for a [`TransactionIndex`](crate::index::TransactionIndex)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Network used to render addresses extracted from raw scripts
    pub network: Network,
    /// Confirmation depth beyond which confirmed status is cached permanently
    pub safe_confirmations: u32,
    /// Skip the confirmation cache on reads (operator escape hatch)
    pub ignore_cache: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            network: Network::Bitcoin,
            safe_confirmations: 6,
            ignore_cache: false,
        }
    }
}

/// The canonical spend recorded for an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentInfo {
    /// Transaction that consumed the output
    pub txid: Txid,
    /// Input index within the spending transaction
    pub index: u32,
    /// Timestamp the spend was observed with
    pub ts: u64,
}

/// One observed spend attempt; only recorded when an output sees more than
/// one spend (double-spend or reorg artifact)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentAttempt {
    /// Spending transaction
    pub txid: Txid,
    /// Input index within the spending transaction
    pub index: u32,
}

/// Result of a point lookup on one output. A missing record is a valid
/// state ("not yet observed"), flagged through `unconfirmed_input`.
#[derive(Debug, Clone, Default)]
pub struct OutputInfo {
    /// Receiving address, when the output has been indexed
    pub address: Option<String>,
    /// Output value in satoshis
    pub value_sat: u64,
    /// Set when the output record is missing from the index
    pub unconfirmed_input: bool,
    /// Canonical spend, if one was observed
    pub spent: Option<SpentInfo>,
    /// Extra spend attempts beyond the canonical one
    pub multiple_spent_attempts: Vec<SpentAttempt>,
}

/// One output of a transaction as returned by
/// [`transaction_outputs`](crate::index::TransactionIndex::transaction_outputs)
#[derive(Debug, Clone)]
pub struct TxOutputEntry {
    /// Output index
    pub index: u32,
    /// Receiving address
    pub address: String,
    /// Output value in satoshis
    pub value_sat: u64,
    /// Canonical spend, if observed
    pub spent: Option<SpentInfo>,
    /// Extra spend attempts beyond the canonical one
    pub multiple_spent_attempts: Vec<SpentAttempt>,
}

/// A parsed address-activity entry, carried through the reconciliation
/// phases of the aggregator. Cache state and freshly verified confirmation
/// state live side by side so that promotions stay one-way.
#[derive(Debug, Clone)]
pub struct AddressTxItem {
    /// Raw store key of the entry, kept for cache promotion writes
    pub key: Vec<u8>,
    /// Timestamp the funding transaction was indexed with
    pub ts: u64,
    /// Funding transaction
    pub txid: Txid,
    /// Funded output index
    pub index: u32,
    /// Output value in satoshis
    pub value_sat: u64,

    /// Funding transaction is confirmed
    pub confirmed: bool,
    /// Confirmed flag came from the cache payload
    pub confirmed_cached: bool,
    /// Confirmed flag will be cached by the next promotion pass
    pub confirmed_will_cache: bool,
    /// Fresh confirmation count, when a collaborator supplied one
    pub confirmations: Option<u32>,

    /// Cached script pubkey hex (only present while unspent)
    pub script_pubkey: Option<String>,
    /// Script hex came from the cache payload
    pub script_pubkey_cached: bool,

    /// Canonical spend, if observed
    pub spent: Option<SpentInfo>,
    /// Spending transaction is confirmed
    pub spent_confirmed: bool,
    /// Spend-confirmed flag came from the cache payload
    pub spent_confirmed_cached: bool,
    /// Fresh confirmation count for the spend
    pub spent_confirmations: Option<u32>,
    /// Extra spend attempts beyond the canonical one
    pub multiple_spent_attempts: Vec<SpentAttempt>,
}

impl AddressTxItem {
    pub(crate) fn new(key: Vec<u8>, ts: u64, txid: Txid, index: u32, value_sat: u64) -> Self {
        AddressTxItem {
            key,
            ts,
            txid,
            index,
            value_sat,
            confirmed: false,
            confirmed_cached: false,
            confirmed_will_cache: false,
            confirmations: None,
            script_pubkey: None,
            script_pubkey_cached: false,
            spent: None,
            spent_confirmed: false,
            spent_confirmed_cached: false,
            spent_confirmations: None,
            multiple_spent_attempts: Vec::new(),
        }
    }
}

/// One transaction appearing in an address history list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAppearance {
    /// Transaction id
    pub txid: Txid,
    /// Timestamp, populated when full info was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
}

/// Point-in-time view of one address, recomputed per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressAggregate {
    /// The address the view was computed for
    pub address: String,
    /// Spendable balance in satoshis
    pub balance_sat: u64,
    /// Total ever received in satoshis
    pub total_received_sat: u64,
    /// Total spent (with confirmed spends) in satoshis
    pub total_sent_sat: u64,
    /// Balance of outputs whose funding transaction is unconfirmed
    pub unconfirmed_balance_sat: u64,
    /// Confirmed transaction appearances
    pub tx_count: usize,
    /// Unconfirmed transaction appearances
    pub unconfirmed_tx_count: usize,
    /// Transaction history, newest first, each txid at most once
    pub transactions: Vec<TxAppearance>,
}

impl AddressAggregate {
    /// A zeroed aggregate; what a query for an address with no recorded
    /// activity returns
    pub fn new(address: String) -> Self {
        AddressAggregate {
            address,
            balance_sat: 0,
            total_received_sat: 0,
            total_sent_sat: 0,
            unconfirmed_balance_sat: 0,
            tx_count: 0,
            unconfirmed_tx_count: 0,
            transactions: Vec::new(),
        }
    }

    /// Spendable balance in coin units
    pub fn balance(&self) -> f64 {
        sat_to_coin(self.balance_sat)
    }

    /// Unconfirmed balance in coin units
    pub fn unconfirmed_balance(&self) -> f64 {
        sat_to_coin(self.unconfirmed_balance_sat)
    }
}

/// An unspent output of an address, as returned by the `only_unspent` view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Owning address
    pub address: String,
    /// Funding transaction
    pub txid: Txid,
    /// Output index
    pub vout: u32,
    /// Timestamp the output was indexed with
    pub ts: u64,
    /// Script pubkey hex, when known or backfilled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_pub_key: Option<String>,
    /// Output value in satoshis
    pub amount_sat: u64,
    /// Effective confirmation count (the safety threshold when served from
    /// cache, zero when unconfirmed)
    pub confirmations: u32,
    /// Confirmation count was served from the cache
    pub confirmations_from_cache: bool,
}

/// Summarized input for outbound transaction notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryInput {
    /// Previous output's transaction, absent for coinbase inputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<Txid>,
    /// Previous output's index, absent for coinbase inputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vout: Option<u32>,
    /// Address the consumed output paid to, when resolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Consumed value in coin units, when resolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Another transaction already spent the referenced output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_spent_txid: Option<Txid>,
    /// Coinbase input embeds a merge-mining commitment
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merge_mined: bool,
}

/// Summarized output for outbound transaction notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    /// Output value in coin units
    pub value: f64,
    /// Output index
    pub n: u32,
    /// Receiving address, when the script resolves to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Human-readable transaction payload emitted to notification listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Transaction id
    pub txid: Txid,
    /// Serialized size in bytes
    pub size: usize,
    /// Sum of outputs in coin units
    pub value_out: f64,
    /// Sum of resolved inputs in coin units; absent while inputs are
    /// still unresolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_in: Option<f64>,
    /// Fee in coin units; absent while inputs are still unresolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<f64>,
    /// Coinbase transaction
    pub is_coinbase: bool,
    /// Summarized inputs
    pub inputs: Vec<SummaryInput>,
    /// Summarized outputs
    pub outputs: Vec<SummaryOutput>,
}

/// Mining pool attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Pool name, `"Unknown"` when no match
    pub pool_name: String,
    /// Pool url, `"n/a"` when no match
    pub url: String,
}

impl Default for PoolInfo {
    fn default() -> Self {
        PoolInfo {
            pool_name: "Unknown".to_string(),
            url: "n/a".to_string(),
        }
    }
}

/// Block payload emitted to notification listeners after a block is indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Block hash
    pub hash: BlockHash,
    /// Height assigned by the chain-tip index
    pub height: u32,
    /// Block timestamp
    pub time: u64,
    /// Number of transactions in the block
    pub tx_count: usize,
    /// Wire payload size in bytes
    pub size: usize,
    /// Mining pool attribution for the coinbase payout
    pub pool: PoolInfo,
}

/// A transaction rejected during indexing, kept for operator review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedTx {
    /// Rejected transaction
    pub txid: Txid,
    /// Output that triggered the rejection
    pub vout: u32,
    /// Why the output could not be indexed
    pub reason: String,
}

/// A transaction input normalized to the canonical ingestion shape
#[derive(Debug, Clone)]
pub struct NormalizedInput {
    /// Input index
    pub n: u32,
    /// Consumed outpoint, `None` for coinbase inputs
    pub prevout: Option<OutPoint>,
    /// Raw coinbase script hex, only for coinbase inputs
    pub coinbase_script: Option<String>,
}

/// A transaction output normalized to the canonical ingestion shape; the
/// script is resolved to an address exactly once, at indexing time
#[derive(Debug, Clone)]
pub struct NormalizedOutput {
    /// Output index
    pub n: u32,
    /// Output value in satoshis
    pub value_sat: u64,
    /// Script description in whichever shape the source supplied
    pub script: ScriptInfo,
}

/// A transaction normalized from any of the wire/RPC shapes the pipeline
/// consumes
#[derive(Debug, Clone)]
pub struct NormalizedTx {
    /// Transaction id
    pub txid: Txid,
    /// Timestamp to index the transaction with; `0` means "stamp with the
    /// current time at ingestion"
    pub time: u64,
    /// First transaction of a block
    pub is_coinbase: bool,
    /// Normalized inputs
    pub inputs: Vec<NormalizedInput>,
    /// Normalized outputs
    pub outputs: Vec<NormalizedOutput>,
}

impl NormalizedTx {
    /// Addresses receiving at least one output of this transaction, for
    /// callers that need the touched set without consulting the index
    pub fn output_addresses(&self, network: Network) -> HashSet<String> {
        self.outputs
            .iter()
            .filter_map(|o| match o.script.resolve(network) {
                crate::script::ScriptAddress::Single(addr) => Some(addr),
                _ => None,
            })
            .collect()
    }
}

/// A block normalized from the wire shape the pipeline consumes
#[derive(Debug, Clone)]
pub struct NormalizedBlock {
    /// Block hash
    pub hash: BlockHash,
    /// Parent block hash
    pub previous_hash: BlockHash,
    /// Block timestamp
    pub time: u64,
    /// Wire payload size in bytes
    pub size: usize,
    /// Transactions in block order; the first is the coinbase
    pub txs: Vec<NormalizedTx>,
}

/// Connection status exposed by the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Currently forwarding events from a peer
    pub connected: bool,
    /// Peer description, when one was announced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}
