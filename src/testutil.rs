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

//! Builders and scripted collaborators shared by the test modules

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::hashes::hex::FromHex;
use bitcoin::{BlockHash, OutPoint, Txid};

use async_trait::async_trait;

use crate::blockchain::{
    BlockInfo, ChainTipIndex, ConfirmationOracle, IndexEvents, ResyncTrigger, TipBlock, TxInfo,
    TxInfoInput, TxInfoOutput,
};
use crate::error::Error;
use crate::script::ScriptInfo;
use crate::types::*;

// valid base58/bech32 strings so aggregator-level codec validation passes
pub(crate) const ADDR_1: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";
pub(crate) const ADDR_2: &str = "2NBFNJTktNa7GZusGbDbGKRZTxdK9VVez3n";
pub(crate) const ADDR_3: &str = "132F25rTsvBdp9JzLLBHP5mvGY66i1xdiM";

/// A txid made of one repeated hex digit
pub(crate) fn txid(c: char) -> Txid {
    Txid::from_hex(&std::iter::repeat(c).take(64).collect::<String>()).unwrap()
}

pub(crate) fn block_hash(c: char) -> BlockHash {
    BlockHash::from_hex(&std::iter::repeat(c).take(64).collect::<String>()).unwrap()
}

pub(crate) fn addr_script(addr: &str) -> ScriptInfo {
    ScriptInfo::Addresses {
        addresses: vec![addr.to_string()],
        kind: None,
    }
}

pub(crate) fn coinbase_tx(id: char, time: u64, addr: &str, sat: u64) -> NormalizedTx {
    NormalizedTx {
        txid: txid(id),
        time,
        is_coinbase: true,
        inputs: vec![NormalizedInput {
            n: 0,
            prevout: None,
            coinbase_script: Some("04ffff001d0104".to_string()),
        }],
        outputs: vec![NormalizedOutput {
            n: 0,
            value_sat: sat,
            script: addr_script(addr),
        }],
    }
}

pub(crate) fn spend_tx(
    id: char,
    time: u64,
    prev_txid: &Txid,
    prev_n: u32,
    to_addr: &str,
    sat: u64,
) -> NormalizedTx {
    NormalizedTx {
        txid: txid(id),
        time,
        is_coinbase: false,
        inputs: vec![NormalizedInput {
            n: 0,
            prevout: Some(OutPoint {
                txid: *prev_txid,
                vout: prev_n,
            }),
            coinbase_script: None,
        }],
        outputs: vec![NormalizedOutput {
            n: 0,
            value_sat: sat,
            script: addr_script(to_addr),
        }],
    }
}

/// The oracle's view of a normalized transaction with a given depth
pub(crate) fn tx_info_for(tx: &NormalizedTx, confirmations: u32) -> TxInfo {
    let outputs: Vec<TxInfoOutput> = tx
        .outputs
        .iter()
        .map(|o| TxInfoOutput {
            n: o.n,
            value_sat: o.value_sat,
            script: o.script.clone(),
            script_hex: None,
        })
        .collect();
    TxInfo {
        txid: tx.txid,
        confirmations,
        time: Some(tx.time),
        size: 200,
        is_coinbase: tx.is_coinbase,
        value_out_sat: outputs.iter().map(|o| o.value_sat).sum(),
        inputs: tx
            .inputs
            .iter()
            .map(|i| TxInfoInput {
                n: i.n,
                txid: i.prevout.map(|p| p.txid),
                vout: i.prevout.map(|p| p.vout),
                coinbase: i.coinbase_script.clone(),
            })
            .collect(),
        outputs,
    }
}

/// Scripted confirmation oracle with a call counter and a kill switch
#[derive(Default)]
pub(crate) struct MockOracle {
    infos: Mutex<HashMap<Txid, TxInfo>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info(&self, info: TxInfo) {
        self.infos.lock().unwrap().insert(info.txid, info);
    }

    pub fn set_confirmations(&self, txid: &Txid, confirmations: u32) {
        let mut infos = self.infos.lock().unwrap();
        match infos.get_mut(txid) {
            Some(info) => info.confirmations = confirmations,
            None => {
                infos.insert(
                    *txid,
                    TxInfo {
                        txid: *txid,
                        confirmations,
                        time: Some(0),
                        size: 0,
                        is_coinbase: false,
                        value_out_sat: 0,
                        inputs: vec![],
                        outputs: vec![],
                    },
                );
            }
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationOracle for MockOracle {
    async fn transaction_info(&self, txid: &Txid) -> Result<Option<TxInfo>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Generic("rpc connection refused".to_string()));
        }
        Ok(self.infos.lock().unwrap().get(txid).cloned())
    }
}

/// Scripted chain-tip index: a confirmation table, an orphan switch, and a
/// running height
#[derive(Default)]
pub(crate) struct MockChainTip {
    confirmations: Mutex<HashMap<Txid, u32>>,
    orphan: AtomicBool,
    height: AtomicU32,
    blocks: Mutex<HashMap<BlockHash, BlockInfo>>,
}

impl MockChainTip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_confirmations(&self, txid: &Txid, confirmations: u32) {
        self.confirmations
            .lock()
            .unwrap()
            .insert(*txid, confirmations);
    }

    pub fn set_orphan(&self, orphan: bool) {
        self.orphan.store(orphan, Ordering::SeqCst);
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainTipIndex for MockChainTip {
    async fn fill_confirmations(&self, items: &mut [AddressTxItem]) -> Result<(), Error> {
        let table = self.confirmations.lock().unwrap();
        for item in items.iter_mut() {
            if let Some(&confs) = table.get(&item.txid) {
                if confs > 0 {
                    item.confirmed = true;
                    item.confirmations = Some(confs);
                }
            }
            if let Some(spent) = &item.spent {
                if let Some(&confs) = table.get(&spent.txid) {
                    if confs > 0 {
                        item.spent_confirmed = true;
                        item.spent_confirmations = Some(confs);
                    }
                }
            }
        }
        Ok(())
    }

    async fn store_tip_block(&self, block: &TipBlock, _allow_reorgs: bool) -> Result<u32, Error> {
        if self.orphan.load(Ordering::SeqCst) {
            return Err(Error::NeedSync);
        }
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        self.blocks.lock().unwrap().insert(
            block.hash,
            BlockInfo {
                hash: block.hash,
                height,
                time: block.time,
            },
        );
        Ok(height)
    }

    async fn block_info(&self, hash: &BlockHash) -> Result<Option<BlockInfo>, Error> {
        Ok(self.blocks.lock().unwrap().get(hash).cloned())
    }
}

/// Resync handle that only counts how often it fired
#[derive(Default)]
pub(crate) struct MockResync {
    triggered: AtomicUsize,
}

impl MockResync {
    pub fn triggered(&self) -> usize {
        self.triggered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResyncTrigger for Arc<MockResync> {
    async fn trigger(&self) -> Result<(), Error> {
        self.triggered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Listener that records every notification it receives
#[derive(Default)]
pub(crate) struct RecordingEvents {
    pub txs: Mutex<Vec<TransactionSummary>>,
    pub blocks: Mutex<Vec<BlockSummary>>,
    pub touched: Mutex<Vec<(Txid, HashSet<String>)>>,
}

impl IndexEvents for Arc<RecordingEvents> {
    fn on_addresses_touched(&self, txid: &Txid, addresses: &HashSet<String>) {
        self.touched.lock().unwrap().push((*txid, addresses.clone()));
    }

    fn on_transaction_indexed(&self, summary: &TransactionSummary) {
        self.txs.lock().unwrap().push(summary.clone());
    }

    fn on_block_indexed(&self, summary: &BlockSummary) {
        self.blocks.lock().unwrap().push(summary.clone());
    }
}
