// src/signature.rs
use std::path::PathBuf;

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Bytes, H256, U256};
use tracing::debug;

use crate::error::ProofError;
use crate::types::SemaphoreProof;

/// Produces a group-membership proof bound to `signal`.
#[async_trait]
pub trait ProofGenerator: Send + Sync {
    async fn generate_proof(&self, signal: H256) -> Result<SemaphoreProof, ProofError>;
}

/// Proof computed out of process and saved as JSON.
pub struct ProofFile {
    path: PathBuf,
}

impl ProofFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProofGenerator for ProofFile {
    async fn generate_proof(&self, signal: H256) -> Result<SemaphoreProof, ProofError> {
        let raw = tokio::fs::read(&self.path).await?;
        let proof: SemaphoreProof = serde_json::from_slice(&raw)?;
        debug!("Loaded proof from {}", self.path.display());
        check_signal(&proof, signal)?;
        Ok(proof)
    }
}

pub fn check_signal(proof: &SemaphoreProof, signal: H256) -> Result<(), ProofError> {
    let expected = U256::from_big_endian(signal.as_bytes());
    if proof.message != expected {
        return Err(ProofError::SignalMismatch {
            expected,
            actual: proof.message,
        });
    }
    Ok(())
}

/// `abi.encode(uint256[8] points, uint256 merkleTreeRoot, uint256 depth, uint256 nullifier)`,
/// the layout the account's `validateSignature` decodes.
pub fn encode_signature(proof: &SemaphoreProof) -> Bytes {
    let points = proof.points.iter().copied().map(Token::Uint).collect();

    Bytes::from(encode(&[
        Token::FixedArray(points),
        Token::Uint(proof.merkle_tree_root),
        Token::Uint(proof.merkle_tree_depth),
        Token::Uint(proof.nullifier),
    ]))
}
