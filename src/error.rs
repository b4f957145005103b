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

use std::fmt;

use bitcoin::{OutPoint, Txid};

/// Errors that can be thrown by the [`TransactionIndex`](crate::index::TransactionIndex)
/// and its collaborators
#[derive(Debug)]
pub enum Error {
    /// Generic error
    Generic(String),
    /// The address string failed codec validation. This is a client input
    /// error, distinct from "address has no recorded activity"
    InvalidAddress(bitcoin::util::address::Error),
    /// This error is thrown when trying to convert Bare and Public key script to address
    ScriptDoesntHaveAddressForm,
    /// A transaction output carried a script shape the index does not track.
    /// The transaction's writes were dropped and a quarantine record written
    NonStandardOutput {
        /// Transaction carrying the offending output
        txid: Txid,
        /// Index of the offending output
        vout: u32,
        /// Short description of the script shape
        reason: String,
    },
    /// Requested outpoint doesn't exist in the tx (vout greater than available outputs)
    InvalidOutpoint(OutPoint),
    /// A stored key or value did not parse back; the index is corrupt at this entry
    MalformedRecord(String),
    /// The chain-tip index rejected a block whose parent it doesn't know; a
    /// full historical resync is the recovery path
    NeedSync,

    /// Encoding error
    Encode(bitcoin::consensus::encode::Error),
    /// Hex decoding error
    Hex(bitcoin::hashes::hex::Error),
    /// Error serializing or deserializing JSON data
    Json(serde_json::Error),

    #[cfg(feature = "key-value-db")]
    /// Sled database error
    Sled(sled::Error),
    #[cfg(feature = "rpc")]
    /// Rpc client error
    Rpc(crate::blockchain::rpc::RpcError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(err) => write!(f, "Generic error: {}", err),
            Self::InvalidAddress(err) => write!(f, "Invalid address: {}", err),
            Self::ScriptDoesntHaveAddressForm => write!(f, "Script doesn't have address form"),
            Self::NonStandardOutput { txid, vout, reason } => write!(
                f,
                "Non-standard output quarantined: {}:{} ({})",
                txid, vout, reason
            ),
            Self::InvalidOutpoint(outpoint) => write!(
                f,
                "Requested outpoint doesn't exist in the tx: {}",
                outpoint
            ),
            Self::MalformedRecord(err) => write!(f, "Malformed index record: {}", err),
            Self::NeedSync => write!(f, "Block parent unknown, full resync required"),
            Self::Encode(err) => write!(f, "Encoding error: {}", err),
            Self::Hex(err) => write!(f, "Hex decoding error: {}", err),
            Self::Json(err) => write!(f, "Serialize/Deserialize JSON error: {}", err),
            #[cfg(feature = "key-value-db")]
            Self::Sled(err) => write!(f, "Sled database error: {}", err),
            #[cfg(feature = "rpc")]
            Self::Rpc(err) => write!(f, "RPC client error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_error {
    ( $from:ty, $to:ident ) => {
        impl_error!($from, $to, $crate::error::Error);
    };
    ( $from:ty, $to:ident, $impl_for:ty ) => {
        impl std::convert::From<$from> for $impl_for {
            fn from(err: $from) -> Self {
                <$impl_for>::$to(err)
            }
        }
    };
}

impl_error!(bitcoin::util::address::Error, InvalidAddress);
impl_error!(bitcoin::consensus::encode::Error, Encode);
impl_error!(bitcoin::hashes::hex::Error, Hex);
impl_error!(serde_json::Error, Json);

#[cfg(feature = "key-value-db")]
impl_error!(sled::Error, Sled);
#[cfg(feature = "rpc")]
impl_error!(crate::blockchain::rpc::RpcError, Rpc);
