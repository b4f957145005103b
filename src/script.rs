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

//! Script-to-address resolution
//!
//! Transactions reach the pipeline in several shapes: raw scripts from the
//! wire, descriptor strings or pre-resolved address lists from RPC verbose
//! results, and bare-pubkey hex for legacy pay-to-pubkey outputs.
//! [`ScriptInfo`] unifies them behind one interface that is resolved exactly
//! once, at ingestion time.

use bitcoin::hashes::hex::FromHex;
use bitcoin::{Address, Network, PublicKey, Script};

use serde::{Deserialize, Serialize};

/// Marker substring embedded in merge-mined coinbase scripts
const MERGE_MINING_MARKER: &str = "6d6d";

/// A script description in whichever shape the source supplied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptInfo {
    /// A raw script pubkey
    Raw(Script),
    /// An output descriptor string, e.g. `addr(...)#checksum`
    Descriptor(String),
    /// Addresses pre-resolved by the supplying side, with the script type
    /// label when one was given
    Addresses {
        /// Resolved addresses
        addresses: Vec<String>,
        /// RPC script type label (`"nulldata"`, `"pubkey"`, ...)
        kind: Option<String>,
    },
    /// Bare pubkey hex, optionally still wrapped in its push/checksig opcodes
    PubkeyHex(String),
}

/// Outcome of resolving a [`ScriptInfo`] to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptAddress {
    /// The script pays exactly one standard address
    Single(String),
    /// Null-data output; skipped silently, never indexed
    NullData,
    /// Any other shape (bare multisig, unparseable script); indexing the
    /// transaction must be rejected rather than silently dropping the output
    NonStandard(String),
}

impl ScriptInfo {
    /// Resolve to a single address, a null-data marker, or a non-standard
    /// rejection. Never fails: unresolvable shapes map to
    /// [`ScriptAddress::NonStandard`] with a reason
    pub fn resolve(&self, network: Network) -> ScriptAddress {
        match self {
            ScriptInfo::Raw(script) => resolve_script(script, network),
            ScriptInfo::Descriptor(desc) => match descriptor_address(desc) {
                Some(addr) => ScriptAddress::Single(addr),
                None => ScriptAddress::NonStandard(format!("unsupported descriptor: {}", desc)),
            },
            ScriptInfo::Addresses { addresses, kind } => {
                if kind.as_deref() == Some("nulldata") {
                    return ScriptAddress::NullData;
                }
                match addresses.as_slice() {
                    [single] => ScriptAddress::Single(single.clone()),
                    [] => ScriptAddress::NonStandard("no address in script".to_string()),
                    _ => ScriptAddress::NonStandard("multiple addresses (bare multisig)".to_string()),
                }
            }
            ScriptInfo::PubkeyHex(hex) => match pubkey_address(hex, network) {
                Some(addr) => ScriptAddress::Single(addr),
                None => ScriptAddress::NonStandard(format!("invalid pubkey: {}", hex)),
            },
        }
    }
}

fn resolve_script(script: &Script, network: Network) -> ScriptAddress {
    if script.is_op_return() {
        return ScriptAddress::NullData;
    }
    if let Some(address) = Address::from_script(script, network) {
        return ScriptAddress::Single(address.to_string());
    }
    // p2pk never had an address form; the explorer convention is to render
    // it as the pubkey-hash address
    if script.is_p2pk() {
        let bytes = script.as_bytes();
        if let Ok(pubkey) = PublicKey::from_slice(&bytes[1..bytes.len() - 1]) {
            return ScriptAddress::Single(Address::p2pkh(&pubkey, network).to_string());
        }
    }
    ScriptAddress::NonStandard("script doesn't have address form".to_string())
}

/// Extract the address of an `addr(...)` descriptor fragment
fn descriptor_address(desc: &str) -> Option<String> {
    let start = desc.find("addr(")? + "addr(".len();
    let end = desc[start..].find(')')? + start;
    if end > start {
        Some(desc[start..end].to_string())
    } else {
        None
    }
}

/// Derive the pubkey-hash address of a bare pubkey given as hex. Accepts
/// both the naked key and the full `<push> <key> OP_CHECKSIG` script hex
fn pubkey_address(hex: &str, network: Network) -> Option<String> {
    let mut bytes = Vec::<u8>::from_hex(hex).ok()?;
    if let Some((&first, _)) = bytes.split_first() {
        if (first == 0x21 || first == 0x41) && bytes.last() == Some(&0xac) {
            bytes = bytes[1..bytes.len() - 1].to_vec();
        }
    }
    if bytes.len() != 33 && bytes.len() != 65 {
        return None;
    }
    let pubkey = PublicKey::from_slice(&bytes).ok()?;
    Some(Address::p2pkh(&pubkey, network).to_string())
}

/// Whether a coinbase script hex embeds a merge-mining commitment
pub fn is_merge_mined(coinbase_hex: &str) -> bool {
    coinbase_hex.contains(MERGE_MINING_MARKER)
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(hex: &str) -> ScriptInfo {
        ScriptInfo::Raw(Script::from(Vec::<u8>::from_hex(hex).unwrap()))
    }

    #[test]
    fn resolves_p2pkh_script() {
        let script = raw("76a91402306a7c23f3e8010de41e9e591348bb83f11daa88ac");
        match script.resolve(Network::Bitcoin) {
            ScriptAddress::Single(addr) => assert!(addr.starts_with('1')),
            other => panic!("expected address, got {:?}", other),
        }
    }

    #[test]
    fn resolves_p2pk_script_to_pubkey_hash() {
        // <push 33> <compressed key> OP_CHECKSIG
        let script = raw("21033b9b137ee87d5a812d6f506efdd37f0affa7ffc310711c06c7f3e097c9447c52ac");
        match script.resolve(Network::Bitcoin) {
            ScriptAddress::Single(addr) => assert!(addr.starts_with('1')),
            other => panic!("expected address, got {:?}", other),
        }
    }

    #[test]
    fn pubkey_hex_matches_raw_p2pk() {
        let key = "033b9b137ee87d5a812d6f506efdd37f0affa7ffc310711c06c7f3e097c9447c52";
        let script = raw(&format!("21{}ac", key));
        let naked = ScriptInfo::PubkeyHex(key.to_string());
        let wrapped = ScriptInfo::PubkeyHex(format!("21{}ac", key));
        assert_eq!(
            script.resolve(Network::Bitcoin),
            naked.resolve(Network::Bitcoin)
        );
        assert_eq!(
            naked.resolve(Network::Bitcoin),
            wrapped.resolve(Network::Bitcoin)
        );
    }

    #[test]
    fn op_return_is_null_data() {
        let script = raw("6a0b68656c6c6f20776f726c64");
        assert_eq!(script.resolve(Network::Bitcoin), ScriptAddress::NullData);
    }

    #[test]
    fn nulldata_kind_is_null_data() {
        let script = ScriptInfo::Addresses {
            addresses: vec![],
            kind: Some("nulldata".to_string()),
        };
        assert_eq!(script.resolve(Network::Bitcoin), ScriptAddress::NullData);
    }

    #[test]
    fn multiple_addresses_are_non_standard() {
        let script = ScriptInfo::Addresses {
            addresses: vec!["a".to_string(), "b".to_string()],
            kind: None,
        };
        assert!(matches!(
            script.resolve(Network::Bitcoin),
            ScriptAddress::NonStandard(_)
        ));
    }

    #[test]
    fn descriptor_address_extraction() {
        let script =
            ScriptInfo::Descriptor("addr(1BitcoinEaterAddressDontSendf59kuE)#8a9lvk3q".to_string());
        assert_eq!(
            script.resolve(Network::Bitcoin),
            ScriptAddress::Single("1BitcoinEaterAddressDontSendf59kuE".to_string())
        );
    }

    #[test]
    fn merge_mining_marker() {
        assert!(is_merge_mined("04ffff001d01046d6d2f6e6f64652f"));
        assert!(!is_merge_mined("04ffff001d0104"));
        assert!(!is_merge_mined(""));
    }
}
