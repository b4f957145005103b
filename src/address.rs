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

//! Address aggregation
//!
//! Rebuilds one address's balance, unconfirmed balance and transaction
//! history from the raw index. Cached confirmation state can be stale, so
//! the fold is preceded by reconciliation phases that check doubtful
//! entries against the RPC oracle and the chain-tip index with bounded
//! concurrency, then promote what settled into the cache.
//!
//! Oracle failures degrade to best-available data: a fully dead RPC layer
//! means "trust the cache", never a failed read.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use bitcoin::{Address, Txid};

use futures::stream::{self, StreamExt};

#[allow(unused_imports)]
use log::{debug, info, trace, warn};

use crate::blockchain::{ChainTipIndex, ConfirmationOracle, TxInfo};
use crate::database::BatchStore;
use crate::error::Error;
use crate::index::TransactionIndex;
use crate::types::*;

/// Maximum outstanding oracle calls per reconciliation phase
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Options for an address view computation
#[derive(Debug, Clone, Default)]
pub struct AddressOptions {
    /// Bound on the number of activity entries scanned; `Some(0)` keeps the
    /// scan unbounded but skips collecting the history list
    pub tx_limit: Option<usize>,
    /// Carry timestamps in the history list, not just txids
    pub include_tx_info: bool,
    /// Override of the index-level cache bypass
    pub ignore_cache: Option<bool>,
}

/// Computes point-in-time address views from the index, the oracle and the
/// chain-tip index. Borrows the index mutably because settled confirmation
/// state is promoted into the cache along the way.
pub struct AddressAggregator<'a, D: BatchStore, O: ConfirmationOracle, C: ChainTipIndex> {
    index: &'a mut TransactionIndex<D>,
    oracle: &'a O,
    chain: &'a C,
    concurrency: usize,
}

impl<'a, D: BatchStore, O: ConfirmationOracle, C: ChainTipIndex> AddressAggregator<'a, D, O, C> {
    /// Create a new aggregator over injected collaborators
    pub fn new(index: &'a mut TransactionIndex<D>, oracle: &'a O, chain: &'a C) -> Self {
        AddressAggregator {
            index,
            oracle,
            chain,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the oracle fanout used during reconciliation
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Compute the full aggregate view of one address. An address with no
    /// recorded activity yields a zeroed aggregate; a malformed address is
    /// a client error.
    pub async fn address_view(
        &mut self,
        address: &str,
        opts: &AddressOptions,
    ) -> Result<AddressAggregate, Error> {
        Address::from_str(address)?;

        let items = self.reconciled_activity(address, opts).await?;

        let mut aggregate = AddressAggregate::new(address.to_string());
        let mut seen = HashSet::new();
        let collect_list = opts.tx_limit != Some(0);
        let mut tx_list = Vec::new();

        for item in &items {
            fold_item(
                &mut aggregate,
                &mut seen,
                &mut tx_list,
                collect_list,
                opts.include_tx_info,
                item,
            );
        }

        if collect_list {
            aggregate.transactions = tx_list;
        }
        Ok(aggregate)
    }

    /// The unspent outputs of one address, annotated with effective
    /// confirmation counts and (backfilled) script pubkeys
    pub async fn unspent_outputs(
        &mut self,
        address: &str,
        opts: &AddressOptions,
    ) -> Result<Vec<UnspentOutput>, Error> {
        Address::from_str(address)?;

        let mut items = self.reconciled_activity(address, opts).await?;
        items.retain(|i| i.spent.is_none());
        self.index.fill_script_pubkeys(&mut items, self.oracle).await?;

        let safe_confirmations = self.index.safe_confirmations();
        Ok(items
            .into_iter()
            .map(|i| {
                let confirmations = if i.confirmed {
                    i.confirmations.unwrap_or(safe_confirmations)
                } else {
                    0
                };
                UnspentOutput {
                    address: address.to_string(),
                    txid: i.txid,
                    vout: i.index,
                    ts: i.ts,
                    script_pub_key: i.script_pubkey,
                    amount_sat: i.value_sat,
                    confirmations,
                    confirmations_from_cache: i.confirmed_cached,
                }
            })
            .collect())
    }

    /// Fetch the activity entries and run the four reconciliation phases:
    /// oracle-check doubtful funding transactions, oracle-check doubtful
    /// spends, fill authoritative counts from the chain-tip index, then
    /// promote what settled into the cache. Totals are only derived after
    /// every phase's batch has completed, so batch completion order can't
    /// change the result.
    async fn reconciled_activity(
        &mut self,
        address: &str,
        opts: &AddressOptions,
    ) -> Result<Vec<AddressTxItem>, Error> {
        let ignore_cache = opts.ignore_cache.unwrap_or(self.index.ignore_cache());
        let scan_limit = match opts.tx_limit {
            Some(n) if n > 0 => Some(n),
            _ => None,
        };
        let mut items = self.index.address_activity(address, scan_limit, ignore_cache)?;

        // funding transactions the cache believes unconfirmed
        let doubtful: HashSet<Txid> = items
            .iter()
            .filter(|i| !i.confirmed)
            .map(|i| i.txid)
            .collect();
        let verdicts = self.check_confirmations(doubtful).await;
        for item in items.iter_mut().filter(|i| !i.confirmed) {
            if let Some(&confs) = verdicts.get(&item.txid) {
                debug!("oracle upgraded {} to {} confirmations", item.txid, confs);
                item.confirmed = true;
                item.confirmations = Some(confs);
            }
        }

        // spends present but not cache-confirmed
        let doubtful: HashSet<Txid> = items
            .iter()
            .filter(|i| !i.spent_confirmed)
            .filter_map(|i| i.spent.as_ref().map(|s| s.txid))
            .collect();
        let verdicts = self.check_confirmations(doubtful).await;
        for item in items.iter_mut().filter(|i| !i.spent_confirmed) {
            if let Some(spent) = &item.spent {
                if let Some(&confs) = verdicts.get(&spent.txid) {
                    item.spent_confirmed = true;
                    item.spent_confirmations = Some(confs);
                }
            }
        }

        self.chain.fill_confirmations(&mut items).await?;
        self.index.cache_confirmations(&mut items)?;

        Ok(items)
    }

    /// Query the oracle for a set of transactions with bounded concurrency.
    /// Failures are logged and the transaction stays doubtful; only
    /// positive depth reports make it into the verdict map.
    async fn check_confirmations(
        &self,
        txids: impl IntoIterator<Item = Txid>,
    ) -> HashMap<Txid, u32> {
        let oracle = self.oracle;
        let results: Vec<(Txid, Result<Option<TxInfo>, Error>)> = stream::iter(txids.into_iter())
            .map(|txid| async move {
                let result = oracle.transaction_info(&txid).await;
                (txid, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut verdicts = HashMap::new();
        for (txid, result) in results {
            match result {
                Ok(Some(info)) if info.confirmations > 0 => {
                    verdicts.insert(txid, info.confirmations);
                }
                Ok(_) => {}
                Err(e) => warn!("confirmation check failed for {}: {}", txid, e),
            }
        }
        verdicts
    }
}

/// Fold one activity entry into the running aggregate. State table, by
/// (funding confirmed, spend exists, spend confirmed):
///
/// - funding unconfirmed: counts toward the unconfirmed balance
/// - confirmed, no spend: spendable, received
/// - confirmed, spend confirmed: received and sent, not spendable
/// - confirmed, spend pending: still spendable until the spend confirms
///
/// The `seen` set keeps each txid's appearance in the history list unique
/// even when it shows up as both a funding and a spending event.
fn fold_item(
    aggregate: &mut AddressAggregate,
    seen: &mut HashSet<Txid>,
    tx_list: &mut Vec<TxAppearance>,
    collect_list: bool,
    include_tx_info: bool,
    item: &AddressTxItem,
) {
    let mut add = 0;
    let mut add_spend = 0;

    if seen.insert(item.txid) {
        add = 1;
        if collect_list {
            tx_list.push(TxAppearance {
                txid: item.txid,
                ts: if include_tx_info { Some(item.ts) } else { None },
            });
        }
    }

    if let Some(spent) = &item.spent {
        if seen.insert(spent.txid) {
            add_spend = 1;
            if collect_list {
                tx_list.push(TxAppearance {
                    txid: spent.txid,
                    ts: if include_tx_info { Some(spent.ts) } else { None },
                });
            }
        }
    }

    let value = item.value_sat;
    if item.confirmed {
        aggregate.tx_count += add;
        aggregate.total_received_sat += value;
        match &item.spent {
            None => aggregate.balance_sat += value,
            Some(_) if item.spent_confirmed => {
                aggregate.total_sent_sat += value;
                aggregate.tx_count += add_spend;
            }
            Some(_) => aggregate.balance_sat += value,
        }
    } else {
        aggregate.unconfirmed_balance_sat += value;
        aggregate.unconfirmed_tx_count += add;
    }
}
