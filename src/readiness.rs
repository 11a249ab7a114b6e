// src/readiness.rs
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use tracing::{debug, info};

use crate::error::ProbeError;
use crate::types::PingResponse;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One external dependency that the gate waits on.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// `Ok(())` once the dependency is usable.
    async fn check(&self) -> Result<(), ProbeError>;
}

/// Time source for the wait between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unchecked,
    Polling,
    Ready,
}

/// Polls probes until they report ready.
///
/// There is no retry limit. Dropping the returned future between polls cancels the
/// wait, so callers that need a deadline race it against `tokio::time::timeout` or a
/// cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate<S = TokioSleeper> {
    sleeper: S,
}

impl ReadinessGate<TokioSleeper> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Sleeper> ReadinessGate<S> {
    pub fn with_sleeper(sleeper: S) -> Self {
        Self { sleeper }
    }

    /// Returns the number of checks it took for the probe to report ready.
    pub async fn await_ready(&self, probe: &dyn ReadinessProbe) -> usize {
        let mut state = ProbeState::Unchecked;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match probe.check().await {
                Ok(()) => {
                    debug!("{}: {:?} -> {:?}", probe.name(), state, ProbeState::Ready);
                    info!("{} is ready after {} attempt(s)", probe.name(), attempts);
                    return attempts;
                }
                Err(e) => {
                    if state == ProbeState::Unchecked {
                        debug!("{}: {:?} -> {:?}", probe.name(), state, ProbeState::Polling);
                        state = ProbeState::Polling;
                    }
                    debug!("{} attempt {}: {}", probe.name(), attempts, e);
                    self.sleeper.sleep(probe.interval()).await;
                }
            }
        }
    }

    pub async fn await_all(&self, probes: &[Box<dyn ReadinessProbe>]) {
        for probe in probes {
            self.await_ready(probe.as_ref()).await;
        }
    }
}

/// Ready once the relay answers a chain id query.
pub struct RelayProbe {
    provider: Provider<Http>,
}

impl RelayProbe {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(url)?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl ReadinessProbe for RelayProbe {
    fn name(&self) -> &str {
        "bundler"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        self.provider
            .get_chainid()
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::TransientUnavailable(e.to_string()))
    }
}

/// Ready once `GET {url}/ping` answers `{"message": "pong"}`.
pub struct PaymasterProbe {
    client: reqwest::Client,
    ping_url: String,
}

impl PaymasterProbe {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            ping_url: format!("{}/ping", url.trim_end_matches('/')),
        }
    }
}

pub fn check_pong(response: &PingResponse) -> Result<(), ProbeError> {
    if response.message == "pong" {
        Ok(())
    } else {
        Err(ProbeError::NotReady(format!(
            "paymaster answered {:?}",
            response.message
        )))
    }
}

#[async_trait]
impl ReadinessProbe for PaymasterProbe {
    fn name(&self) -> &str {
        "paymaster"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(&self.ping_url)
            .send()
            .await
            .map_err(|e| ProbeError::TransientUnavailable(e.to_string()))?
            .json::<PingResponse>()
            .await
            .map_err(|e| ProbeError::TransientUnavailable(e.to_string()))?;

        check_pong(&response)
    }
}
