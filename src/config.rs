// src/config.rs
use anyhow::{Context, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use tracing::info;

use crate::readiness::{PaymasterProbe, ReadinessProbe, RelayProbe};

pub const DEFAULT_BUNDLER_URL: &str = "http://localhost:4337";
pub const DEFAULT_PAYMASTER_URL: &str = "http://localhost:3000";
pub const DEFAULT_NODE_URL: &str = "http://localhost:8545";
/// EntryPoint v0.6
pub const DEFAULT_ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

/// Endpoints and addresses, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bundler_url: String,
    pub paymaster_url: String,
    pub node_url: String,
    pub entry_point: Address,
    pub chain_id: Option<u64>,
}

impl Config {
    pub fn new(
        bundler_url: String,
        paymaster_url: String,
        node_url: String,
        entry_point: &str,
        chain_id: Option<u64>,
    ) -> Result<Self> {
        let entry_point = entry_point
            .parse::<Address>()
            .with_context(|| format!("invalid entry point address {entry_point}"))?;

        Ok(Self {
            bundler_url,
            paymaster_url,
            node_url,
            entry_point,
            chain_id,
        })
    }

    /// Readiness manifest: the bundler relay, then the paymaster.
    pub fn probes(&self) -> Result<Vec<Box<dyn ReadinessProbe>>> {
        Ok(vec![
            Box::new(RelayProbe::new(&self.bundler_url)?),
            Box::new(PaymasterProbe::new(&self.paymaster_url)),
        ])
    }

    /// Configured chain id, or the one reported by the node.
    pub async fn resolve_chain_id(&self) -> Result<U256> {
        if let Some(chain_id) = self.chain_id {
            return Ok(U256::from(chain_id));
        }

        let provider = Provider::<Http>::try_from(self.node_url.as_str())?;
        let chain_id = provider
            .get_chainid()
            .await
            .with_context(|| format!("failed to query chain id from {}", self.node_url))?;
        info!("Using chain id {} reported by {}", chain_id, self.node_url);
        Ok(chain_id)
    }
}
