// src/main.rs
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::U256;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use semaphore_aa::codec::{calldata_gas, domain_hash, operation_hash};
use semaphore_aa::config::{
    Config, DEFAULT_BUNDLER_URL, DEFAULT_ENTRY_POINT, DEFAULT_NODE_URL, DEFAULT_PAYMASTER_URL,
};
use semaphore_aa::readiness::ReadinessGate;
use semaphore_aa::signature::{encode_signature, ProofFile, ProofGenerator};
use semaphore_aa::{submit, user_op_hash, wait_for_receipt, HttpBundler, UserOperation};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, env = "BUNDLER_URL", default_value = DEFAULT_BUNDLER_URL)]
    bundler_url: String,

    #[clap(long, env = "PAYMASTER_URL", default_value = DEFAULT_PAYMASTER_URL)]
    paymaster_url: String,

    #[clap(long, env = "NODE_URL", default_value = DEFAULT_NODE_URL)]
    node_url: String,

    #[clap(long, env = "ENTRY_POINT", default_value = DEFAULT_ENTRY_POINT)]
    entry_point: String,

    /// Queried from the node when unset
    #[clap(long, env = "CHAIN_ID")]
    chain_id: Option<u64>,

    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the operation hash and the signal a proof must commit to
    Hash {
        #[clap(long)]
        op: PathBuf,
    },
    /// Block until the bundler and paymaster are ready
    Wait {
        #[clap(long)]
        timeout: Option<u64>,
    },
    /// Attach a membership proof and submit the operation to the bundler
    Send {
        #[clap(long)]
        op: PathBuf,

        #[clap(long)]
        proof: PathBuf,

        #[clap(long)]
        timeout: Option<u64>,

        #[clap(long)]
        wait_receipt: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::new(
        args.bundler_url,
        args.paymaster_url,
        args.node_url,
        &args.entry_point,
        args.chain_id,
    )?;

    match args.command {
        Command::Hash { op } => {
            let op = load_operation(&op).await?;
            let chain_id = config.resolve_chain_id().await?;
            let op_hash = operation_hash(&op)?;

            println!("operation hash: {:?}", op_hash);
            println!("signal:         {:?}", domain_hash(op_hash, config.entry_point, chain_id));
        }
        Command::Wait { timeout } => {
            wait_for_services(&config, timeout).await?;
        }
        Command::Send {
            op,
            proof,
            timeout,
            wait_receipt,
        } => {
            wait_for_services(&config, timeout).await?;
            let op = load_operation(&op).await?;
            let chain_id = config.resolve_chain_id().await?;
            send(&config, op, chain_id, &proof, wait_receipt, timeout).await?;
        }
    }

    Ok(())
}

async fn load_operation(path: &Path) -> anyhow::Result<UserOperation> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid user operation in {}", path.display()))
}

// Race a wait against --timeout and ctrl-c
async fn until_deadline<F: Future>(
    waiting: F,
    timeout: Option<u64>,
    what: &str,
) -> anyhow::Result<F::Output> {
    let deadline = async {
        match timeout {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        output = waiting => Ok(output),
        _ = deadline => bail!("gave up waiting for {} after {}s", what, timeout.unwrap_or_default()),
        _ = tokio::signal::ctrl_c() => bail!("interrupted while waiting for {}", what),
    }
}

async fn wait_for_services(config: &Config, timeout: Option<u64>) -> anyhow::Result<()> {
    let gate = ReadinessGate::new();
    let probes = config.probes()?;
    until_deadline(gate.await_all(&probes), timeout, "services").await
}

async fn send(
    config: &Config,
    op: UserOperation,
    chain_id: U256,
    proof_path: &Path,
    wait_receipt: bool,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let signal = user_op_hash(&op, config.entry_point, chain_id)?;
    info!("Requesting membership proof for signal {:?}", signal);

    let proof = ProofFile::new(proof_path).generate_proof(signal).await?;
    let op = op.with_signature(encode_signature(&proof));
    info!("Calldata gas for signed operation: {}", calldata_gas(&op)?);

    let bundler = HttpBundler::new(config.bundler_url.clone());
    let hash = submit(&bundler, &op, config.entry_point, chain_id).await?;
    println!("user operation hash: {:?}", hash);

    if wait_receipt {
        let gate = ReadinessGate::new();
        let receipt =
            until_deadline(wait_for_receipt(&gate, &bundler, hash), timeout, "the receipt").await?;
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    }

    Ok(())
}
