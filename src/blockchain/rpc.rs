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

//! Confirmation oracle by way of the daemon's JSON-RPC interface, using
//! `reqwest` as the HTTP client

use std::fmt;
use std::time::Duration;

use bitcoin::hashes::hex::FromHex;
use bitcoin::Txid;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::blockchain::{ConfirmationOracle, TxInfo, TxInfoInput, TxInfoOutput};
use crate::error::Error;
use crate::script::ScriptInfo;
use crate::types::COIN;

/// JSON-RPC error code the daemon uses for "transaction not found"; mapped
/// to the `None` result upstream
const RPC_TX_NOT_FOUND: i64 = -5;

/// Authentication for the daemon's RPC interface
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Auth {
    /// No authentication
    None,
    /// Authentication with username and password
    UserPass {
        /// Username
        username: String,
        /// Password
        password: String,
    },
}

/// Configuration for an [`RpcOracle`]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RpcConfig {
    /// The daemon url, eg. `http://127.0.0.1:8332`
    pub url: String,
    /// The daemon authentication
    pub auth: Auth,
    /// Socket timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Structure that implements the [`ConfirmationOracle`] contract over the
/// daemon's JSON-RPC interface
#[derive(Debug)]
pub struct RpcOracle {
    url: String,
    auth: Auth,
    client: Client,
}

impl RpcOracle {
    /// Create a new oracle from a configuration
    pub fn new(config: RpcConfig) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder.build().map_err(RpcError::from)?;
        Ok(RpcOracle {
            url: config.url,
            auth: config.auth,
            client,
        })
    }

    async fn _call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "addrindex",
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Auth::UserPass { username, password } = &self.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response: Value = request.send().await?.json().await?;
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(RpcError::Server {
                code: error["code"].as_i64().unwrap_or(0),
                message: error["message"].as_str().unwrap_or("").to_string(),
                url: self.url.clone(),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn _get_raw_transaction(&self, txid: &Txid) -> Result<Option<Value>, RpcError> {
        match self
            ._call("getrawtransaction", json!([txid.to_string(), 1]))
            .await
        {
            Ok(result) => Ok(Some(result)),
            Err(RpcError::Server { code, .. }) if code == RPC_TX_NOT_FOUND => {
                debug!("rpc tx not found: {}", txid);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Adapt the daemon's verbose transaction result: number the inputs, lift
/// the coinbase flag, total the outputs, and carry each output's script in
/// whichever shape the daemon described it
fn parse_tx_result(result: &Value) -> Result<TxInfo, RpcError> {
    let invalid = |what: &str| RpcError::InvalidResponse(format!("{}: {}", what, result));

    let txid = result["txid"]
        .as_str()
        .and_then(|s| Txid::from_hex(s).ok())
        .ok_or_else(|| invalid("txid"))?;
    let size = match result["hex"].as_str() {
        Some(hex) => hex.len() / 2,
        None => result["size"].as_u64().unwrap_or(0) as usize,
    };

    let empty = Vec::new();
    let vin = result["vin"].as_array().unwrap_or(&empty);
    let mut is_coinbase = false;
    let inputs = vin
        .iter()
        .enumerate()
        .map(|(n, input)| {
            let coinbase = input["coinbase"].as_str().map(|s| s.to_string());
            if coinbase.is_some() {
                is_coinbase = true;
            }
            TxInfoInput {
                n: n as u32,
                txid: input["txid"].as_str().and_then(|s| Txid::from_hex(s).ok()),
                vout: input["vout"].as_u64().map(|v| v as u32),
                coinbase,
            }
        })
        .collect();

    let vout = result["vout"].as_array().unwrap_or(&empty);
    let mut value_out_sat = 0u64;
    let outputs = vout
        .iter()
        .enumerate()
        .map(|(n, output)| {
            let value_sat = output["value"]
                .as_f64()
                .map(|coins| (coins * COIN as f64).round() as u64)
                .or_else(|| output["valueSat"].as_u64())
                .unwrap_or(0);
            value_out_sat += value_sat;

            let spk = &output["scriptPubKey"];
            let kind = spk["type"].as_str().map(|s| s.to_string());
            let script_hex = spk["hex"].as_str().map(|s| s.to_string());
            let script = if let Some(addr) = spk["address"].as_str() {
                ScriptInfo::Addresses {
                    addresses: vec![addr.to_string()],
                    kind: kind.clone(),
                }
            } else if let Some(addrs) = spk["addresses"].as_array() {
                ScriptInfo::Addresses {
                    addresses: addrs
                        .iter()
                        .filter_map(|a| a.as_str().map(|s| s.to_string()))
                        .collect(),
                    kind: kind.clone(),
                }
            } else if kind.as_deref() == Some("pubkey") && script_hex.is_some() {
                ScriptInfo::PubkeyHex(script_hex.clone().unwrap_or_default())
            } else if let Some(desc) = spk["desc"].as_str() {
                ScriptInfo::Descriptor(desc.to_string())
            } else if let Some(hex) = &script_hex {
                match Vec::<u8>::from_hex(hex) {
                    Ok(bytes) => ScriptInfo::Raw(bitcoin::Script::from(bytes)),
                    Err(_) => ScriptInfo::Addresses {
                        addresses: vec![],
                        kind: kind.clone(),
                    },
                }
            } else {
                ScriptInfo::Addresses {
                    addresses: vec![],
                    kind: kind.clone(),
                }
            };

            TxInfoOutput {
                n: n as u32,
                value_sat,
                script,
                script_hex,
            }
        })
        .collect();

    Ok(TxInfo {
        txid,
        confirmations: result["confirmations"].as_u64().unwrap_or(0) as u32,
        time: result["time"]
            .as_u64()
            .or_else(|| result["blocktime"].as_u64()),
        size,
        is_coinbase,
        value_out_sat,
        inputs,
        outputs,
    })
}

#[async_trait]
impl ConfirmationOracle for RpcOracle {
    async fn transaction_info(&self, txid: &Txid) -> Result<Option<TxInfo>, Error> {
        match self._get_raw_transaction(txid).await? {
            Some(result) => Ok(Some(parse_tx_result(&result)?)),
            None => Ok(None),
        }
    }
}

/// Errors during communication with the RPC daemon
#[derive(Debug)]
pub enum RpcError {
    /// Error during reqwest HTTP request
    Reqwest(reqwest::Error),
    /// Error decoding a response body
    Json(serde_json::Error),
    /// The daemon answered something that isn't a JSON-RPC response
    InvalidResponse(String),
    /// The daemon returned a JSON-RPC error
    Server {
        /// Numeric error code
        code: i64,
        /// Error message
        message: String,
        /// Daemon url, for operator context
        url: String,
    },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server { code, message, url } => {
                write!(f, "RPC error {}: {} [host: {}]", code, message, url)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for RpcError {}

impl_error!(reqwest::Error, Reqwest, RpcError);
impl_error!(serde_json::Error, Json, RpcError);

#[cfg(test)]
mod test {
    use super::*;
    use crate::script::ScriptAddress;

    fn coinbase_fixture() -> Value {
        json!({
            "txid": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            "hex": "01000000",
            "confirmations": 101,
            "time": 1231006505u64,
            "vin": [
                { "coinbase": "04ffff001d01046d6d" }
            ],
            "vout": [
                {
                    "value": 50.0,
                    "n": 0,
                    "scriptPubKey": {
                        "type": "pubkeyhash",
                        "hex": "76a91402306a7c23f3e8010de41e9e591348bb83f11daa88ac",
                        "address": "mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8"
                    }
                }
            ]
        })
    }

    #[test]
    fn parses_coinbase_tx() {
        let info = parse_tx_result(&coinbase_fixture()).unwrap();
        assert!(info.is_coinbase);
        assert_eq!(info.confirmations, 101);
        assert_eq!(info.size, 4);
        assert_eq!(info.value_out_sat, 50 * COIN);
        assert_eq!(info.inputs.len(), 1);
        assert_eq!(info.inputs[0].n, 0);
        assert!(info.inputs[0].txid.is_none());
        assert_eq!(
            info.outputs[0].script.resolve(bitcoin::Network::Testnet),
            ScriptAddress::Single("mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8".to_string())
        );
        assert!(info.outputs[0].script_hex.is_some());
    }

    #[test]
    fn parses_legacy_addresses_list() {
        let mut fixture = coinbase_fixture();
        let spk = &mut fixture["vout"][0]["scriptPubKey"];
        spk.as_object_mut().unwrap().remove("address");
        spk["addresses"] = json!(["mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8"]);

        let info = parse_tx_result(&fixture).unwrap();
        assert_eq!(
            info.outputs[0].script.resolve(bitcoin::Network::Testnet),
            ScriptAddress::Single("mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8".to_string())
        );
    }

    #[test]
    fn missing_confirmations_default_to_zero() {
        let mut fixture = coinbase_fixture();
        fixture.as_object_mut().unwrap().remove("confirmations");
        let info = parse_tx_result(&fixture).unwrap();
        assert_eq!(info.confirmations, 0);
    }

    #[test]
    fn rejects_result_without_txid() {
        assert!(parse_tx_result(&json!({ "vin": [], "vout": [] })).is_err());
    }
}
