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

//! Transaction index
//!
//! The central data structure: three key families over one ordered store,
//! recording per output which address received it, whether and when it was
//! spent, and per address an activity list ordered newest-first. A
//! confirmation cache rides on the activity entries so that settled history
//! never needs re-verification.
//!
//! All writes derived from one transaction commit as a single atomic batch.

use std::collections::HashSet;

use bitcoin::hashes::hex::ToHex;
use bitcoin::{Network, Txid};

use futures::stream::{self, StreamExt};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::blockchain::ConfirmationOracle;
use crate::database::{BatchOperations, BatchStore};
use crate::error::Error;
use crate::script::{ScriptAddress, ScriptInfo};
use crate::types::*;

pub(crate) mod keys;

/// Maximum outstanding oracle calls issued by index-side backfills
pub(crate) const RPC_CONCURRENCY: usize = 10;

/// The transaction/address index over an ordered key-value store
pub struct TransactionIndex<D: BatchStore> {
    db: D,
    network: Network,
    safe_confirmations: u32,
    ignore_cache: bool,
}

impl<D: BatchStore> TransactionIndex<D> {
    /// Create an index over `db` with the given configuration
    pub fn new(db: D, config: IndexConfig) -> Self {
        TransactionIndex {
            db,
            network: config.network,
            safe_confirmations: config.safe_confirmations,
            ignore_cache: config.ignore_cache,
        }
    }

    /// Network used to render addresses extracted from raw scripts
    pub fn network(&self) -> Network {
        self.network
    }

    /// Confirmation depth beyond which confirmed status is cached
    pub fn safe_confirmations(&self) -> u32 {
        self.safe_confirmations
    }

    /// Configured default for skipping the confirmation cache on reads
    pub fn ignore_cache(&self) -> bool {
        self.ignore_cache
    }

    /// The batched writes derived from one transaction, plus the touched
    /// addresses. Fails with [`Error::NonStandardOutput`] without staging
    /// anything when an output can't be attributed to a single address.
    fn tx_ops(
        &self,
        tx: &NormalizedTx,
    ) -> Result<(Vec<(Vec<u8>, Vec<u8>)>, HashSet<String>), Error> {
        let mut ops = Vec::new();
        let mut touched = HashSet::new();

        // inputs mark their outpoint as spent; coinbase inputs have none
        for input in &tx.inputs {
            if let Some(prevout) = input.prevout {
                ops.push((
                    keys::spent_key(&prevout.txid, prevout.vout, &tx.txid, input.n),
                    tx.time.to_string().into_bytes(),
                ));
            }
        }

        for output in &tx.outputs {
            match output.script.resolve(self.network) {
                ScriptAddress::Single(addr) => {
                    ops.push((
                        keys::output_key(&tx.txid, output.n),
                        keys::output_value(&addr, output.value_sat),
                    ));
                    ops.push((
                        keys::addr_key(&addr, tx.time, &tx.txid, output.n),
                        keys::activity_value(output.value_sat),
                    ));
                    touched.insert(addr);
                }
                ScriptAddress::NullData => {
                    debug!("skipping null-data output {}:{}", tx.txid, output.n);
                }
                ScriptAddress::NonStandard(reason) => {
                    return Err(Error::NonStandardOutput {
                        txid: tx.txid,
                        vout: output.n,
                        reason,
                    });
                }
            }
        }

        Ok((ops, touched))
    }

    /// Index one transaction: an output record and an address-activity entry
    /// per standard output, a spent marker per resolvable input. Atomic.
    /// Returns the set of addresses touched.
    ///
    /// A non-standard output rejects the whole transaction into the
    /// quarantine list (none of its writes commit) and surfaces as
    /// [`Error::NonStandardOutput`]; callers are expected to log and keep
    /// ingesting.
    pub fn record_transaction(&mut self, tx: &NormalizedTx) -> Result<HashSet<String>, Error> {
        match self.tx_ops(tx) {
            Ok((ops, touched)) => {
                let mut batch = self.db.begin_batch();
                for (key, value) in &ops {
                    batch.put(key, value)?;
                }
                self.db.commit_batch(batch)?;
                Ok(touched)
            }
            Err(Error::NonStandardOutput { txid, vout, reason }) => {
                self.quarantine(&txid, vout, &reason)?;
                Err(Error::NonStandardOutput { txid, vout, reason })
            }
            Err(e) => Err(e),
        }
    }

    /// Index a batch of already-normalized transactions in one atomic
    /// write. Quarantined transactions are skipped, the rest still commit.
    pub fn record_many(&mut self, txs: &[NormalizedTx]) -> Result<(), Error> {
        let mut batch = self.db.begin_batch();
        for tx in txs {
            match self.tx_ops(tx) {
                Ok((ops, _)) => {
                    for (key, value) in &ops {
                        batch.put(key, value)?;
                    }
                }
                Err(Error::NonStandardOutput { txid, vout, reason }) => {
                    error!(
                        "quarantining {}: output {} is non-standard ({})",
                        txid, vout, reason
                    );
                    batch.put(
                        &keys::quarantine_key(&txid),
                        &keys::quarantine_value(vout, &reason),
                    )?;
                }
                Err(e) => return Err(e),
            }
        }
        self.db.commit_batch(batch)
    }

    fn quarantine(&mut self, txid: &Txid, vout: u32, reason: &str) -> Result<(), Error> {
        error!(
            "quarantining {}: output {} is non-standard ({})",
            txid, vout, reason
        );
        let mut batch = self.db.begin_batch();
        batch.put(
            &keys::quarantine_key(txid),
            &keys::quarantine_value(vout, reason),
        )?;
        self.db.commit_batch(batch)
    }

    /// Transactions rejected during indexing, for operator review
    pub fn quarantined(&self) -> Result<Vec<QuarantinedTx>, Error> {
        self.db
            .iter_prefix(&keys::quarantine_prefix(), None)?
            .into_iter()
            .map(|(k, v)| {
                let txid = keys::parse_quarantine_key(&k)?;
                let (vout, reason) = keys::parse_quarantine_value(&v)?;
                Ok(QuarantinedTx { txid, vout, reason })
            })
            .collect()
    }

    /// Look up one output. A missing record is not an error: it comes back
    /// with `unconfirmed_input` set, meaning "not yet observed".
    pub fn lookup_output(&self, txid: &Txid, n: u32) -> Result<OutputInfo, Error> {
        let mut info = match self.db.get(&keys::output_key(txid, n))? {
            Some(value) => {
                let (address, value_sat) = keys::parse_output_value(&value)?;
                OutputInfo {
                    address: Some(address),
                    value_sat,
                    ..Default::default()
                }
            }
            None => {
                debug!("output {}:{} not yet observed", txid, n);
                OutputInfo {
                    unconfirmed_input: true,
                    ..Default::default()
                }
            }
        };

        for (key, value) in self
            .db
            .iter_prefix(&keys::spent_output_prefix(txid, n), None)?
        {
            let parts = keys::parse_spent_key(&key)?;
            let ts = keys::parse_spent_value(&value)?;
            add_spent_info(
                &mut info.spent,
                &mut info.multiple_spent_attempts,
                parts.in_txid,
                parts.in_n,
                ts,
            );
        }

        Ok(info)
    }

    /// All indexed outputs of one transaction, with spend annotations
    pub fn transaction_outputs(&self, txid: &Txid) -> Result<Vec<TxOutputEntry>, Error> {
        let mut entries = Vec::new();
        for (key, value) in self.db.iter_prefix(&keys::output_tx_prefix(txid), None)? {
            let (_, n) = keys::parse_output_key(&key)?;
            let (address, value_sat) = keys::parse_output_value(&value)?;
            entries.push(TxOutputEntry {
                index: n,
                address,
                value_sat,
                spent: None,
                multiple_spent_attempts: Vec::new(),
            });
        }

        for (key, value) in self.db.iter_prefix(&keys::spent_tx_prefix(txid), None)? {
            let parts = keys::parse_spent_key(&key)?;
            let ts = keys::parse_spent_value(&value)?;
            match entries.iter_mut().find(|e| e.index == parts.out_n) {
                Some(entry) => add_spent_info(
                    &mut entry.spent,
                    &mut entry.multiple_spent_attempts,
                    parts.in_txid,
                    parts.in_n,
                    ts,
                ),
                // spent marker for an output we never indexed (non-standard
                // shape); surfaced through lookup_output instead
                None => warn!(
                    "spent marker without output record: {}:{}",
                    txid, parts.out_n
                ),
            }
        }

        Ok(entries)
    }

    /// Activity entries for one address, newest first. `limit` bounds the
    /// scan; entries are deduplicated by `(txid, vout)`. Spent markers are
    /// filled in for every entry whose spend is not already cache-confirmed.
    pub fn address_activity(
        &self,
        addr: &str,
        limit: Option<usize>,
        ignore_cache: bool,
    ) -> Result<Vec<AddressTxItem>, Error> {
        let mut items = Vec::new();
        let mut unique = HashSet::new();

        for (key, value) in self.db.iter_prefix(&keys::addr_prefix(addr), limit)? {
            let item = keys::parse_activity_entry(&key, &value, ignore_cache)?;
            if unique.insert((item.txid, item.index)) {
                items.push(item);
            }
        }

        for item in items.iter_mut().filter(|i| !i.spent_confirmed) {
            self.fill_spent(item)?;
        }

        Ok(items)
    }

    fn fill_spent(&self, item: &mut AddressTxItem) -> Result<(), Error> {
        for (key, value) in self
            .db
            .iter_prefix(&keys::spent_output_prefix(&item.txid, item.index), None)?
        {
            let parts = keys::parse_spent_key(&key)?;
            let ts = keys::parse_spent_value(&value)?;
            add_spent_info(
                &mut item.spent,
                &mut item.multiple_spent_attempts,
                parts.in_txid,
                parts.in_n,
                ts,
            );
        }
        Ok(())
    }

    /// Promote verified confirmation state into the cache. One-way: nothing
    /// here can demote a cached flag. An entry whose funding transaction is
    /// at or past the safety threshold gets its confirmed flag cached; once
    /// its spend is also past the threshold the cached payload switches from
    /// script to spend identity.
    pub fn cache_confirmations(&mut self, items: &mut [AddressTxItem]) -> Result<(), Error> {
        let mut batch = self.db.begin_batch();
        for item in items.iter_mut() {
            if item.spent_confirmed_cached {
                continue;
            }

            let funding_settled = item.confirmed_cached
                || item.confirmations.unwrap_or(0) >= self.safe_confirmations;
            if !funding_settled {
                continue;
            }

            if item.spent_confirmations.unwrap_or(0) >= self.safe_confirmations {
                if let Some(spent) = &item.spent {
                    // the script cache is overwritten here; a spent output
                    // never needs it again
                    batch.put(&item.key, &keys::activity_value_spent(item.value_sat, spent))?;
                    item.spent_confirmed_cached = true;
                    continue;
                }
            }

            if !item.confirmed_cached {
                batch.put(&item.key, &keys::activity_value_confirmed(item.value_sat))?;
                item.confirmed_will_cache = true;
            }
        }
        self.db.commit_batch(batch)
    }

    /// Cache script pubkeys on confirmed, unspent entries so the unspent
    /// view stops needing the oracle for them
    pub fn cache_script_pubkeys(&mut self, items: &mut [AddressTxItem]) -> Result<(), Error> {
        let mut batch = self.db.begin_batch();
        for item in items.iter_mut() {
            if item.script_pubkey_cached || item.spent.is_some() {
                continue;
            }
            if let Some(script) = &item.script_pubkey {
                let confirmed = item.confirmed_cached || item.confirmed_will_cache;
                batch.put(
                    &item.key,
                    &keys::activity_value_script(item.value_sat, confirmed, script),
                )?;
                item.script_pubkey_cached = true;
            }
        }
        self.db.commit_batch(batch)
    }

    /// Backfill missing script hex on unspent entries from the oracle
    /// (bounded concurrency), then cache what was found. Oracle failures
    /// degrade to leaving the entry without a script.
    pub async fn fill_script_pubkeys<O: ConfirmationOracle>(
        &mut self,
        items: &mut [AddressTxItem],
        oracle: &O,
    ) -> Result<(), Error> {
        let missing: Vec<(usize, Txid, u32)> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.script_pubkey.is_none() && i.spent.is_none())
            .map(|(pos, i)| (pos, i.txid, i.index))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let fetched: Vec<(usize, u32, Result<Option<crate::blockchain::TxInfo>, Error>)> =
            stream::iter(missing)
                .map(|(pos, txid, n)| async move {
                    (pos, n, oracle.transaction_info(&txid).await)
                })
                .buffer_unordered(RPC_CONCURRENCY)
                .collect()
                .await;

        for (pos, n, result) in fetched {
            match result {
                Ok(Some(info)) => {
                    let script_hex =
                        info.outputs.iter().find(|o| o.n == n).and_then(|o| {
                            o.script_hex.clone().or_else(|| match &o.script {
                                ScriptInfo::Raw(script) => Some(script.to_bytes().to_hex()),
                                _ => None,
                            })
                        });
                    if let Some(hex) = script_hex {
                        items[pos].script_pubkey = Some(hex);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("script backfill failed for {}: {}", items[pos].txid, e),
            }
        }

        self.cache_script_pubkeys(items)
    }

    /// Strip the cache payload from every activity entry of one address,
    /// leaving the bare amounts. Operator tool for a cache that went stale
    /// below the safety depth.
    pub fn clear_address_cache(&mut self, addr: &str) -> Result<(), Error> {
        let mut batch = self.db.begin_batch();
        for (key, value) in self.db.iter_prefix(&keys::addr_prefix(addr), None)? {
            let item = keys::parse_activity_entry(&key, &value, true)?;
            batch.put(&key, &keys::activity_value(item.value_sat))?;
        }
        self.db.commit_batch(batch)
    }
}

/// Attach one observed spend to a record. The first spend stays canonical;
/// any further spend lands in the attempts list, seeded with the canonical
/// one so the list shows every contender.
pub(crate) fn add_spent_info(
    spent: &mut Option<SpentInfo>,
    attempts: &mut Vec<SpentAttempt>,
    txid: Txid,
    index: u32,
    ts: u64,
) {
    match spent {
        Some(canonical) => {
            if attempts.is_empty() {
                attempts.push(SpentAttempt {
                    txid: canonical.txid,
                    index: canonical.index,
                });
            }
            attempts.push(SpentAttempt { txid, index });
        }
        None => {
            *spent = Some(SpentInfo { txid, index, ts });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::MemoryStore;
    use crate::database::Store;
    use crate::testutil::{coinbase_tx, spend_tx, txid, ADDR_1, ADDR_2};

    fn get_index() -> TransactionIndex<MemoryStore> {
        TransactionIndex::new(MemoryStore::new(), IndexConfig::default())
    }

    #[test]
    fn records_and_looks_up_output() {
        let mut index = get_index();
        let tx = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);

        let touched = index.record_transaction(&tx).unwrap();
        assert_eq!(touched.len(), 1);
        assert!(touched.contains(ADDR_1));

        let info = index.lookup_output(&tx.txid, 0).unwrap();
        assert_eq!(info.address.as_deref(), Some(ADDR_1));
        assert_eq!(info.value_sat, 50 * COIN);
        assert!(!info.unconfirmed_input);
        assert!(info.spent.is_none());
    }

    #[test]
    fn missing_output_is_not_an_error() {
        let index = get_index();
        let info = index.lookup_output(&txid('f'), 3).unwrap();
        assert!(info.unconfirmed_input);
        assert!(info.address.is_none());
    }

    #[test]
    fn indexing_twice_is_idempotent() {
        let mut index = get_index();
        let tx = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);

        index.record_transaction(&tx).unwrap();
        index.record_transaction(&tx).unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value_sat, 50 * COIN);
    }

    #[test]
    fn activity_is_newest_first() {
        let mut index = get_index();
        index
            .record_transaction(&coinbase_tx('a', 1000, ADDR_1, 10))
            .unwrap();
        index
            .record_transaction(&coinbase_tx('b', 3000, ADDR_1, 30))
            .unwrap();
        index
            .record_transaction(&coinbase_tx('c', 2000, ADDR_1, 20))
            .unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        let ts: Vec<u64> = items.iter().map(|i| i.ts).collect();
        assert_eq!(ts, vec![3000, 2000, 1000]);

        let limited = index.address_activity(ADDR_1, Some(2), false).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].ts, 3000);
    }

    #[test]
    fn spend_links_back_to_output() {
        let mut index = get_index();
        let funding = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        index.record_transaction(&funding).unwrap();

        let spend = spend_tx('b', 2000, &funding.txid, 0, ADDR_2, 50 * COIN);
        index.record_transaction(&spend).unwrap();

        let info = index.lookup_output(&funding.txid, 0).unwrap();
        let spent = info.spent.unwrap();
        assert_eq!(spent.txid, spend.txid);
        assert_eq!(spent.index, 0);
        assert_eq!(spent.ts, 2000);
        assert!(info.multiple_spent_attempts.is_empty());
    }

    #[test]
    fn second_spend_is_an_attempt_not_an_overwrite() {
        let mut index = get_index();
        let funding = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        index.record_transaction(&funding).unwrap();

        let first = spend_tx('b', 2000, &funding.txid, 0, ADDR_2, 50 * COIN);
        let second = spend_tx('c', 3000, &funding.txid, 0, ADDR_2, 50 * COIN);
        index.record_transaction(&first).unwrap();
        index.record_transaction(&second).unwrap();

        let info = index.lookup_output(&funding.txid, 0).unwrap();
        // the first observed spend stays canonical
        assert_eq!(info.spent.as_ref().unwrap().txid, first.txid);
        // and the attempts list names both contenders
        let attempts: Vec<Txid> = info
            .multiple_spent_attempts
            .iter()
            .map(|a| a.txid)
            .collect();
        assert_eq!(attempts, vec![first.txid, second.txid]);
    }

    #[test]
    fn non_standard_output_quarantines_whole_tx() {
        let mut index = get_index();
        let mut tx = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        tx.outputs.push(NormalizedOutput {
            n: 1,
            value_sat: 1,
            script: ScriptInfo::Addresses {
                addresses: vec![ADDR_1.to_string(), ADDR_2.to_string()],
                kind: None,
            },
        });

        let err = index.record_transaction(&tx).unwrap_err();
        assert!(matches!(err, Error::NonStandardOutput { vout: 1, .. }));

        // none of the transaction's writes landed
        assert!(index.lookup_output(&tx.txid, 0).unwrap().unconfirmed_input);
        assert!(index.address_activity(ADDR_1, None, false).unwrap().is_empty());

        let quarantined = index.quarantined().unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].txid, tx.txid);
        assert_eq!(quarantined[0].vout, 1);
    }

    #[test]
    fn null_data_output_is_skipped_silently() {
        let mut index = get_index();
        let mut tx = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        tx.outputs.push(NormalizedOutput {
            n: 1,
            value_sat: 0,
            script: ScriptInfo::Addresses {
                addresses: vec![],
                kind: Some("nulldata".to_string()),
            },
        });

        index.record_transaction(&tx).unwrap();
        assert_eq!(index.address_activity(ADDR_1, None, false).unwrap().len(), 1);
        assert!(index.quarantined().unwrap().is_empty());
    }

    #[test]
    fn record_many_quarantines_and_continues() {
        let mut index = get_index();
        let good = coinbase_tx('a', 1000, ADDR_1, 10);
        let mut bad = coinbase_tx('b', 1000, ADDR_2, 20);
        bad.outputs[0].script = ScriptInfo::Addresses {
            addresses: vec![],
            kind: None,
        };

        index.record_many(&[good.clone(), bad.clone()]).unwrap();

        assert!(!index.lookup_output(&good.txid, 0).unwrap().unconfirmed_input);
        assert!(index.lookup_output(&bad.txid, 0).unwrap().unconfirmed_input);
        assert_eq!(index.quarantined().unwrap()[0].txid, bad.txid);
    }

    #[test]
    fn cache_confirmations_promotes_one_way() {
        let mut index = get_index();
        let tx = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        index.record_transaction(&tx).unwrap();

        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(6);
        index.cache_confirmations(&mut items).unwrap();
        assert!(items[0].confirmed_will_cache);

        // served from cache on the next read
        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(items[0].confirmed && items[0].confirmed_cached);

        // a later pass with a stale zero count cannot demote it
        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(0);
        index.cache_confirmations(&mut items).unwrap();
        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(items[0].confirmed_cached);
    }

    #[test]
    fn shallow_confirmations_are_not_cached() {
        let mut index = get_index();
        index
            .record_transaction(&coinbase_tx('a', 1000, ADDR_1, 10))
            .unwrap();

        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(3);
        index.cache_confirmations(&mut items).unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(!items[0].confirmed_cached);
    }

    #[test]
    fn spend_promotion_replaces_script_cache() {
        let mut index = get_index();
        let funding = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        index.record_transaction(&funding).unwrap();

        // cache the confirmed flag and a script first
        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(10);
        index.cache_confirmations(&mut items).unwrap();
        items[0].script_pubkey = Some("76a914ab88ac".to_string());
        index.cache_script_pubkeys(&mut items).unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(items[0].script_pubkey_cached);

        // now the spend settles past the threshold
        let spend = spend_tx('b', 2000, &funding.txid, 0, ADDR_2, 50 * COIN);
        index.record_transaction(&spend).unwrap();
        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(10);
        items[0].spent_confirmations = Some(6);
        index.cache_confirmations(&mut items).unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(items[0].spent_confirmed_cached);
        assert_eq!(items[0].spent.as_ref().unwrap().txid, spend.txid);
        // the script slot now carries the spend identity instead
        assert!(items[0].script_pubkey.is_none());
    }

    #[test]
    fn clear_address_cache_resets_entries() {
        let mut index = get_index();
        index
            .record_transaction(&coinbase_tx('a', 1000, ADDR_1, 10))
            .unwrap();
        let mut items = index.address_activity(ADDR_1, None, false).unwrap();
        items[0].confirmations = Some(6);
        index.cache_confirmations(&mut items).unwrap();

        index.clear_address_cache(ADDR_1).unwrap();

        let items = index.address_activity(ADDR_1, None, false).unwrap();
        assert!(!items[0].confirmed_cached);
        assert_eq!(items[0].value_sat, 10);
    }

    #[test]
    fn transaction_outputs_carry_spend_annotations() {
        let mut index = get_index();
        let funding = coinbase_tx('a', 1000, ADDR_1, 50 * COIN);
        index.record_transaction(&funding).unwrap();
        let spend = spend_tx('b', 2000, &funding.txid, 0, ADDR_2, 50 * COIN);
        index.record_transaction(&spend).unwrap();

        let outputs = index.transaction_outputs(&funding.txid).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].address, ADDR_1);
        assert_eq!(outputs[0].spent.as_ref().unwrap().txid, spend.txid);
    }

    #[test]
    fn concurrent_key_spaces_do_not_overlap() {
        let mut index = get_index();
        let a = coinbase_tx('a', 1000, ADDR_1, 10);
        let b = coinbase_tx('b', 1000, ADDR_2, 20);
        index.record_transaction(&a).unwrap();
        index.record_transaction(&b).unwrap();

        assert_eq!(index.address_activity(ADDR_1, None, false).unwrap().len(), 1);
        assert_eq!(index.address_activity(ADDR_2, None, false).unwrap().len(), 1);
    }

    #[test]
    fn unknown_address_has_empty_activity() {
        let index = get_index();
        assert!(index
            .address_activity("1BitcoinEaterAddressDontSendf59kuE", None, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn spent_marker_keys_are_content_derived() {
        // re-delivering the same spend overwrites the same key instead of
        // growing the attempt list
        let mut index = get_index();
        let funding = coinbase_tx('a', 1000, ADDR_1, 10);
        index.record_transaction(&funding).unwrap();
        let spend = spend_tx('b', 2000, &funding.txid, 0, ADDR_2, 10);
        index.record_transaction(&spend).unwrap();
        index.record_transaction(&spend).unwrap();

        let info = index.lookup_output(&funding.txid, 0).unwrap();
        assert!(info.multiple_spent_attempts.is_empty());
        assert_eq!(info.spent.unwrap().txid, spend.txid);
    }

    #[test]
    fn inputs_without_prevout_write_no_spent_marker() {
        let mut index = get_index();
        let tx = coinbase_tx('a', 1000, ADDR_1, 10);
        index.record_transaction(&tx).unwrap();

        // no spent marker family entries at all
        let all = index
            .db
            .iter_prefix(keys::SPENT_PREFIX.as_bytes(), None)
            .unwrap();
        assert!(all.is_empty());
    }
}
