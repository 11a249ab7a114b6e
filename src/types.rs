// src/types.rs
use ethers::types::{Address, Bytes, U256, U512};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EncodingError;

/// Merkle tree depth assumed when a proof document does not carry one.
pub const DEFAULT_TREE_DEPTH: u64 = 20;

/// ERC-4337 user operation (EntryPoint v0.6 layout) as built by the caller.
///
/// Integer fields are held wider than the 256-bit ABI word so that out-of-range
/// input is reported by the codec instead of being truncated on construction.
/// `sender` is raw bytes for the same reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Bytes,
    pub nonce: U512,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U512,
    pub verification_gas_limit: U512,
    pub pre_verification_gas: U512,
    pub max_fee_per_gas: U512,
    pub max_priority_fee_per_gas: U512,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn with_signature(self, signature: Bytes) -> Self {
        Self { signature, ..self }
    }

    pub fn sender_address(&self) -> Result<Address, EncodingError> {
        if self.sender.len() != Address::len_bytes() {
            return Err(EncodingError::InvalidAddressLength {
                len: self.sender.len(),
            });
        }
        Ok(Address::from_slice(&self.sender))
    }
}

/// JSON shape accepted by `eth_sendUserOperation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUserOperation {
    pub sender: Address,
    pub nonce: String,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: String,
    pub verification_gas_limit: String,
    pub pre_verification_gas: String,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// A Semaphore group-membership proof together with its public inputs.
///
/// Both proof document layouts in circulation are accepted: `points`/`nullifier`/`message`
/// and `proof`/`nullifierHash`/`signal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreProof {
    #[serde(
        alias = "depth",
        default = "default_tree_depth",
        deserialize_with = "de_quantity"
    )]
    pub merkle_tree_depth: U256,
    #[serde(deserialize_with = "de_quantity")]
    pub merkle_tree_root: U256,
    #[serde(alias = "nullifierHash", deserialize_with = "de_quantity")]
    pub nullifier: U256,
    #[serde(alias = "signal", deserialize_with = "de_quantity")]
    pub message: U256,
    #[serde(alias = "proof", deserialize_with = "de_points")]
    pub points: [U256; 8],
}

fn default_tree_depth() -> U256 {
    warn!(
        "Proof carries no merkle tree depth, assuming {}; a wrong depth invalidates the signature",
        DEFAULT_TREE_DEPTH
    );
    U256::from(DEFAULT_TREE_DEPTH)
}

// snarkjs emits decimal strings, ethers emits 0x-hex; accept either.
fn parse_quantity<E: de::Error>(value: &Value) -> Result<U256, E> {
    match value {
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => U256::from_dec_str(s).map_err(|e| e.to_string()),
            };
            parsed.map_err(|e| E::custom(format!("invalid quantity {s}: {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| E::custom(format!("invalid quantity {n}"))),
        other => Err(E::custom(format!("expected quantity, got {other}"))),
    }
}

fn de_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_quantity(&value)
}

fn de_points<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[U256; 8], D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    if values.len() != 8 {
        return Err(de::Error::invalid_length(values.len(), &"8 proof points"));
    }
    let mut points = [U256::zero(); 8];
    for (point, value) in points.iter_mut().zip(values.iter()) {
        *point = parse_quantity::<D::Error>(value)?;
    }
    Ok(points)
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        }
    }
}

/// A JSON-RPC response carrying either `result` or `error`, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    pub message: String,
}
