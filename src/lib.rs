// src/lib.rs
//! Hashing, readiness gating and bundler submission for Semaphore-authorized
//! ERC-4337 accounts.
pub mod bundler;
pub mod codec;
pub mod config;
pub mod error;
pub mod readiness;
pub mod signature;
pub mod types;

pub use crate::bundler::{submit, wait_for_receipt, Bundler, HttpBundler};
pub use crate::codec::{domain_hash, operation_hash, transform_for_wire, user_op_hash};
pub use crate::config::Config;
pub use crate::error::{EncodingError, ProbeError, ProofError, SubmissionError};
pub use crate::readiness::{ReadinessGate, ReadinessProbe};
pub use crate::types::{SemaphoreProof, UserOperation, WireUserOperation};
