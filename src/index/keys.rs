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

//! Key families and value codecs of the transaction index
//!
//! All keys and values are ASCII text within one ordered store:
//!
//! ```text
//! txo-<txid>-<n>                        => <addr>:<sat>
//! txs-<txid>-<n>-<intxid>-<inn>         => <ts>
//! txa2-<addr>-<tsr>-<txid>-<n>          => <sat>[:cache...]
//! txq-<txid>                            => <vout>:<reason>
//! ```
//!
//! `tsr = TS_HORIZON - ts`, zero-padded to a fixed width so that ascending
//! key order is exactly descending time order for every `ts >= 0`.

use std::str;

use bitcoin::hashes::hex::FromHex;
use bitcoin::Txid;

use crate::error::Error;
use crate::types::{AddressTxItem, SpentInfo};

pub(crate) const OUTS_PREFIX: &str = "txo-";
pub(crate) const SPENT_PREFIX: &str = "txs-";
pub(crate) const ADDR_PREFIX: &str = "txa2-";
pub(crate) const QUARANTINE_PREFIX: &str = "txq-";

/// Timestamp horizon used to reverse key order; far enough in the future
/// to outlive any plausible unix timestamp
pub(crate) const TS_HORIZON: u64 = 10_000_000_000_000;

/// Digits of `TS_HORIZON`, the fixed width reversed timestamps are padded to
const TSR_WIDTH: usize = 14;

pub(crate) fn output_key(txid: &Txid, n: u32) -> Vec<u8> {
    format!("{}{}-{}", OUTS_PREFIX, txid, n).into_bytes()
}

pub(crate) fn output_tx_prefix(txid: &Txid) -> Vec<u8> {
    format!("{}{}-", OUTS_PREFIX, txid).into_bytes()
}

pub(crate) fn spent_key(out_txid: &Txid, out_n: u32, in_txid: &Txid, in_n: u32) -> Vec<u8> {
    format!("{}{}-{}-{}-{}", SPENT_PREFIX, out_txid, out_n, in_txid, in_n).into_bytes()
}

pub(crate) fn spent_output_prefix(txid: &Txid, n: u32) -> Vec<u8> {
    format!("{}{}-{}-", SPENT_PREFIX, txid, n).into_bytes()
}

pub(crate) fn spent_tx_prefix(txid: &Txid) -> Vec<u8> {
    format!("{}{}-", SPENT_PREFIX, txid).into_bytes()
}

pub(crate) fn addr_key(addr: &str, ts: u64, txid: &Txid, n: u32) -> Vec<u8> {
    format!(
        "{}{}-{:0width$}-{}-{}",
        ADDR_PREFIX,
        addr,
        TS_HORIZON.saturating_sub(ts),
        txid,
        n,
        width = TSR_WIDTH
    )
    .into_bytes()
}

pub(crate) fn addr_prefix(addr: &str) -> Vec<u8> {
    format!("{}{}-", ADDR_PREFIX, addr).into_bytes()
}

pub(crate) fn quarantine_key(txid: &Txid) -> Vec<u8> {
    format!("{}{}", QUARANTINE_PREFIX, txid).into_bytes()
}

pub(crate) fn quarantine_prefix() -> Vec<u8> {
    QUARANTINE_PREFIX.as_bytes().to_vec()
}

pub(crate) fn parse_quarantine_key(key: &[u8]) -> Result<Txid, Error> {
    let s = as_str(key, "quarantine key")?;
    let hex = s
        .strip_prefix(QUARANTINE_PREFIX)
        .ok_or_else(|| malformed(key, "quarantine key"))?;
    parse_txid(hex, key, "quarantine key txid")
}

pub(crate) fn parse_output_key(key: &[u8]) -> Result<(Txid, u32), Error> {
    let s = as_str(key, "output key")?;
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(malformed(key, "output key"));
    }
    Ok((
        parse_txid(parts[1], key, "output key txid")?,
        parse_num(parts[2], key, "output key vout")?,
    ))
}

fn malformed(key_or_value: &[u8], what: &str) -> Error {
    Error::MalformedRecord(format!(
        "{}: {}",
        what,
        String::from_utf8_lossy(key_or_value)
    ))
}

fn as_str<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, Error> {
    str::from_utf8(bytes).map_err(|_| malformed(bytes, what))
}

fn parse_txid(s: &str, raw: &[u8], what: &str) -> Result<Txid, Error> {
    Txid::from_hex(s).map_err(|_| malformed(raw, what))
}

fn parse_num<T: str::FromStr>(s: &str, raw: &[u8], what: &str) -> Result<T, Error> {
    s.parse().map_err(|_| malformed(raw, what))
}

/// Parsed components of a spent-marker key
pub(crate) struct SpentKeyParts {
    pub out_txid: Txid,
    pub out_n: u32,
    pub in_txid: Txid,
    pub in_n: u32,
}

pub(crate) fn parse_spent_key(key: &[u8]) -> Result<SpentKeyParts, Error> {
    let s = as_str(key, "spent key")?;
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 5 {
        return Err(malformed(key, "spent key"));
    }
    Ok(SpentKeyParts {
        out_txid: parse_txid(parts[1], key, "spent key txid")?,
        out_n: parse_num(parts[2], key, "spent key vout")?,
        in_txid: parse_txid(parts[3], key, "spent key spender")?,
        in_n: parse_num(parts[4], key, "spent key spender index")?,
    })
}

pub(crate) fn parse_spent_value(value: &[u8]) -> Result<u64, Error> {
    let s = as_str(value, "spent value")?;
    parse_num(s, value, "spent value ts")
}

/// Parse an output record value, `<addr>:<sat>`
pub(crate) fn parse_output_value(value: &[u8]) -> Result<(String, u64), Error> {
    let s = as_str(value, "output value")?;
    let mut parts = s.split(':');
    let addr = parts.next().ok_or_else(|| malformed(value, "output value"))?;
    let sat = parts.next().ok_or_else(|| malformed(value, "output value"))?;
    Ok((
        addr.to_string(),
        parse_num(sat, value, "output value sat")?,
    ))
}

pub(crate) fn output_value(addr: &str, sat: u64) -> Vec<u8> {
    format!("{}:{}", addr, sat).into_bytes()
}

pub(crate) fn quarantine_value(vout: u32, reason: &str) -> Vec<u8> {
    format!("{}:{}", vout, reason).into_bytes()
}

pub(crate) fn parse_quarantine_value(value: &[u8]) -> Result<(u32, String), Error> {
    let s = as_str(value, "quarantine value")?;
    let mut parts = s.splitn(2, ':');
    let vout = parts.next().ok_or_else(|| malformed(value, "quarantine value"))?;
    let reason = parts.next().unwrap_or("");
    Ok((
        parse_num(vout, value, "quarantine vout")?,
        reason.to_string(),
    ))
}

/// Encoders for the address-activity value, `<sat>` plus the optional cache
/// payload. The script slot and the spend slot are mutually exclusive uses
/// of the same position.
pub(crate) fn activity_value(sat: u64) -> Vec<u8> {
    format!("{}", sat).into_bytes()
}

pub(crate) fn activity_value_confirmed(sat: u64) -> Vec<u8> {
    format!("{}:1", sat).into_bytes()
}

pub(crate) fn activity_value_script(sat: u64, confirmed: bool, script_hex: &str) -> Vec<u8> {
    format!("{}:{}:{}", sat, confirmed as u8, script_hex).into_bytes()
}

pub(crate) fn activity_value_spent(sat: u64, spent: &SpentInfo) -> Vec<u8> {
    format!("{}:1:1:{}:{}:{}", sat, spent.txid, spent.index, spent.ts).into_bytes()
}

/// Parse one address-activity entry into an [`AddressTxItem`]. With
/// `ignore_cache` only the value amount is read and every cached flag is
/// left cold.
pub(crate) fn parse_activity_entry(
    key: &[u8],
    value: &[u8],
    ignore_cache: bool,
) -> Result<AddressTxItem, Error> {
    let ks = as_str(key, "activity key")?;
    let parts: Vec<&str> = ks.split('-').collect();
    if parts.len() != 5 {
        return Err(malformed(key, "activity key"));
    }
    let tsr: u64 = parse_num(parts[2], key, "activity key tsr")?;
    if tsr > TS_HORIZON {
        return Err(malformed(key, "activity key tsr"));
    }
    let txid = parse_txid(parts[3], key, "activity key txid")?;
    let index = parse_num(parts[4], key, "activity key vout")?;

    let vs = as_str(value, "activity value")?;
    let fields: Vec<&str> = vs.split(':').collect();
    let sat = parse_num(fields[0], value, "activity value sat")?;

    let mut item = AddressTxItem::new(key.to_vec(), TS_HORIZON - tsr, txid, index, sat);
    if ignore_cache {
        return Ok(item);
    }

    if fields.get(1).copied() == Some("1") {
        item.confirmed = true;
        item.confirmed_cached = true;
        match fields.get(2).copied() {
            // spend identity cached
            Some("1") => {
                if fields.len() < 6 {
                    return Err(malformed(value, "activity spend cache"));
                }
                item.spent_confirmed = true;
                item.spent_confirmed_cached = true;
                item.spent = Some(SpentInfo {
                    txid: parse_txid(fields[3], value, "activity spend txid")?,
                    index: parse_num(fields[4], value, "activity spend index")?,
                    ts: parse_num(fields[5], value, "activity spend ts")?,
                });
            }
            // script pubkey cached
            Some(script) if !script.is_empty() => {
                item.script_pubkey = Some(script.to_string());
                item.script_pubkey_cached = true;
            }
            _ => {}
        }
    }

    Ok(item)
}
