// src/error.rs
use ethers::types::{H256, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Sender must be 20 bytes, got {len}")]
    InvalidAddressLength { len: usize },

    #[error("Value of {field} does not fit in 256 bits")]
    ValueOutOfRange { field: &'static str },
}

/// Raised by a probe check. Never leaves the readiness gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Transiently unavailable: {0}")]
    TransientUnavailable(String),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Bundler returned {actual}, expected user operation hash {expected:?}")]
    Mismatch { expected: H256, actual: String },

    #[error("Bundler rejected user operation: {0}")]
    Rejected(serde_json::Value),

    #[error("Bundler transport error: {0}")]
    Transport(String),

    #[error("Malformed bundler response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Proof was generated for signal {actual}, expected {expected}")]
    SignalMismatch { expected: U256, actual: U256 },

    #[error("Failed to read proof: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse proof: {0}")]
    Parse(#[from] serde_json::Error),
}
