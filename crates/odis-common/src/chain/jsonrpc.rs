//! Ethereum JSON-RPC adapter.
//!
//! Reads contract state with `eth_call` using hand-assembled ABI calldata.
//! Only the three view functions ODIS needs are encoded.

use super::{ChainConfig, ChainState, ChainStateError, VerifiedStatus};
use crate::ecdsa::keccak256;
use crate::wire::{parse_address, Address, Hash};
use async_trait::async_trait;
use primitive_types::U256;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const GET_DATA_ENCRYPTION_KEY: &str = "getDataEncryptionKey(address)";
const TOTAL_PAID_CUSD: &str = "totalPaidCUSD(address)";
const GET_ATTESTATION_STATS: &str = "getAttestationStats(bytes32,address)";

/// First four bytes of the keccak hash of a function signature.
fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn calldata(signature: &str, words: &[[u8; 32]]) -> String {
    let mut data = selector(signature).to_vec();
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

fn word(data: &[u8], index: usize) -> Result<&[u8], ChainStateError> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| ChainStateError::Decode(format!("missing ABI word {index}")))
}

fn word_u64(data: &[u8], index: usize) -> Result<u64, ChainStateError> {
    let value = U256::from_big_endian(word(data, index)?);
    if value > U256::from(u64::MAX) {
        return Err(ChainStateError::Decode("ABI value overflows u64".into()));
    }
    Ok(value.as_u64())
}

/// Decodes a single dynamic `bytes` return value.
fn decode_bytes(data: &[u8]) -> Result<Vec<u8>, ChainStateError> {
    let offset = word_u64(data, 0)? as usize;
    let length_word = data
        .get(offset..offset + 32)
        .ok_or_else(|| ChainStateError::Decode("bytes length out of range".into()))?;
    let length = U256::from_big_endian(length_word).low_u64() as usize;
    data.get(offset + 32..offset + 32 + length)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ChainStateError::Decode("bytes body out of range".into()))
}

fn decode_hex_result(value: &str) -> Result<Vec<u8>, ChainStateError> {
    hex::decode(value.trim_start_matches("0x")).map_err(|e| ChainStateError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Full-node adapter.
pub struct JsonRpcChainState {
    client: reqwest::Client,
    url: String,
    accounts: Address,
    payments: Address,
    attestations: Address,
    next_id: AtomicU64,
}

impl JsonRpcChainState {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainStateError> {
        let contract = |name: &str, value: &str| {
            parse_address(value)
                .ok_or_else(|| ChainStateError::Decode(format!("invalid {name} address {value}")))
        };
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainStateError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            accounts: contract("accounts", &config.accounts_address)?,
            payments: contract("payments", &config.payments_address)?,
            attestations: contract("attestations", &config.attestations_address)?,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainStateError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "chain RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainStateError::Transport(e.to_string()))?;
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainStateError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(ChainStateError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| ChainStateError::Decode("response has neither result nor error".into()))
    }

    async fn call(&self, to: &Address, data: String) -> Result<Vec<u8>, ChainStateError> {
        let result = self
            .request(
                "eth_call",
                json!([{"to": format!("{to:?}"), "data": data}, "latest"]),
            )
            .await?;
        let encoded = result
            .as_str()
            .ok_or_else(|| ChainStateError::Decode("eth_call result is not a string".into()))?;
        decode_hex_result(encoded)
    }
}

#[async_trait]
impl ChainState for JsonRpcChainState {
    async fn get_data_encryption_key(
        &self,
        account: Address,
    ) -> Result<Option<String>, ChainStateError> {
        let data = calldata(GET_DATA_ENCRYPTION_KEY, &[encode_address(&account)]);
        let bytes = decode_bytes(&self.call(&self.accounts, data).await?)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(hex::encode(bytes)))
    }

    async fn get_verified_status(
        &self,
        account: Address,
        identifier: Hash,
    ) -> Result<VerifiedStatus, ChainStateError> {
        let data = calldata(
            GET_ATTESTATION_STATS,
            &[identifier.to_fixed_bytes(), encode_address(&account)],
        );
        let result = self.call(&self.attestations, data).await?;
        let completed = word_u64(&result, 0)? as u32;
        let requested = word_u64(&result, 1)? as u32;
        Ok(VerifiedStatus::from_stats(completed, requested))
    }

    async fn get_total_paid_for_queries(&self, account: Address) -> Result<U256, ChainStateError> {
        let data = calldata(TOTAL_PAID_CUSD, &[encode_address(&account)]);
        let result = self.call(&self.payments, data).await?;
        Ok(U256::from_big_endian(word(&result, 0)?))
    }

    async fn get_current_block_number(&self) -> Result<u64, ChainStateError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let encoded = result
            .as_str()
            .ok_or_else(|| ChainStateError::Decode("block number is not a string".into()))?;
        u64::from_str_radix(encoded.trim_start_matches("0x"), 16)
            .map_err(|e| ChainStateError::Decode(e.to_string()))
    }
}
