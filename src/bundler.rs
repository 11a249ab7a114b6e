// src/bundler.rs
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::codec::{transform_for_wire, user_op_hash};
use crate::error::{ProbeError, SubmissionError};
use crate::readiness::{ReadinessGate, ReadinessProbe, Sleeper};
use crate::types::{RpcRequest, RpcResponse, UserOperation, WireUserOperation};

pub const SEND_USER_OPERATION: &str = "eth_sendUserOperation";
pub const GET_USER_OPERATION_RECEIPT: &str = "eth_getUserOperationReceipt";

/// JSON-RPC surface of an ERC-4337 bundler.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn send_user_operation(
        &self,
        op: &WireUserOperation,
        entry_point: Address,
    ) -> Result<RpcResponse, SubmissionError>;

    /// `None` until the operation has been included.
    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<Value>, SubmissionError>;
}

pub struct HttpBundler {
    client: reqwest::Client,
    url: String,
}

impl HttpBundler {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call<P: Serialize + Send + Sync>(
        &self,
        method: &str,
        params: P,
    ) -> Result<RpcResponse, SubmissionError> {
        debug!("{} -> {}", method, self.url);
        self.client
            .post(&self.url)
            .json(&RpcRequest::new(method, params))
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?
            .json::<RpcResponse>()
            .await
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Bundler for HttpBundler {
    async fn send_user_operation(
        &self,
        op: &WireUserOperation,
        entry_point: Address,
    ) -> Result<RpcResponse, SubmissionError> {
        self.call(SEND_USER_OPERATION, json!([op, entry_point])).await
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<Value>, SubmissionError> {
        let response = self.call(GET_USER_OPERATION_RECEIPT, json!([hash])).await?;
        if let Some(error) = response.error {
            return Err(SubmissionError::Rejected(error));
        }
        Ok(response.result.filter(|receipt| !receipt.is_null()))
    }
}

/// Submits a signed operation and checks the bundler reports the same hash we derived.
pub async fn submit(
    bundler: &dyn Bundler,
    op: &UserOperation,
    entry_point: Address,
    chain_id: U256,
) -> Result<H256, SubmissionError> {
    let expected = user_op_hash(op, entry_point, chain_id)?;
    let wire = transform_for_wire(op)?;

    info!("Submitting user operation {:?} from {:?}", expected, wire.sender);
    let response = bundler.send_user_operation(&wire, entry_point).await?;

    if let Some(rejection) = response.error {
        error!("Bundler rejected user operation: {}", rejection);
        return Err(SubmissionError::Rejected(rejection));
    }

    let result = response.result.ok_or_else(|| {
        SubmissionError::MalformedResponse("response has neither result nor error".to_string())
    })?;

    match result.as_str().and_then(|s| s.parse::<H256>().ok()) {
        Some(accepted) if accepted == expected => {
            info!("Bundler accepted user operation {:?}", accepted);
            Ok(accepted)
        }
        _ => {
            let actual = result
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| result.to_string());
            error!("Bundler returned {}, expected {:?}", actual, expected);
            Err(SubmissionError::Mismatch { expected, actual })
        }
    }
}

struct ReceiptProbe<'a> {
    bundler: &'a dyn Bundler,
    hash: H256,
    receipt: Mutex<Option<Value>>,
}

#[async_trait]
impl ReadinessProbe for ReceiptProbe<'_> {
    fn name(&self) -> &str {
        "user operation receipt"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        match self.bundler.get_user_operation_receipt(self.hash).await {
            Ok(Some(receipt)) => {
                *self.receipt.lock().await = Some(receipt);
                Ok(())
            }
            Ok(None) => Err(ProbeError::NotReady(format!("{:?} not included yet", self.hash))),
            Err(e) => Err(ProbeError::TransientUnavailable(e.to_string())),
        }
    }
}

/// Polls the bundler until the operation has a receipt and returns the receipt seen.
pub async fn wait_for_receipt<S: Sleeper>(
    gate: &ReadinessGate<S>,
    bundler: &dyn Bundler,
    hash: H256,
) -> Value {
    let probe = ReceiptProbe {
        bundler,
        hash,
        receipt: Mutex::new(None),
    };

    // check only reports ready after storing the receipt
    loop {
        gate.await_ready(&probe).await;
        if let Some(receipt) = probe.receipt.lock().await.take() {
            return receipt;
        }
    }
}
