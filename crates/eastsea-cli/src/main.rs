//! `eastsea-node`: the CLI surface over the node coordinator
//! (spec.md §6). Parses `port`/`bootstrap_port` plus the timing
//! overrides SPEC_FULL.md §6 adds for test determinism, wires up
//! `tracing` from `EASTSEA_LOG_LEVEL`, and either runs the node until
//! a shutdown signal or, under `--demo`, drives a scripted
//! submit-then-mine sequence in-process and reports success/failure
//! via its exit code.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eastsea_node::config::{DEFAULT_DIFFICULTY, DEFAULT_RPC_PORT};
use eastsea_node::{Node, NodeConfig, NodeHandle};
use eastsea_transport::TransportConfig;
use eastsea_types::errors::CoordinatorError;
use eastsea_types::Transaction;
use tracing_subscriber::EnvFilter;

/// Pedagogical blockchain node: P2P overlay, Kademlia DHT,
/// Proof-of-History sequencer, and blockchain engine in one process.
#[derive(Parser, Debug)]
#[command(name = "eastsea-node", version, about)]
struct Args {
    /// Local P2P listen port.
    port: u16,

    /// Bootstrap seed on 127.0.0.1:<bootstrap_port> (spec.md §6).
    bootstrap_port: Option<u16>,

    /// In-process RPC surface port. The JSON-RPC wrapper itself is
    /// out of scope (spec.md §1); this is plumbed through so that
    /// external collaborator can bind to it.
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    rpc_port: u16,

    /// Run a scripted submit-then-mine sequence in-process and exit
    /// non-zero on failure, instead of serving forever (spec.md §6).
    #[arg(long)]
    demo: bool,

    /// Overrides `EASTSEA_LOG_LEVEL` for this process.
    #[arg(long)]
    log_level: Option<String>,

    /// Overrides the default 30s keepalive ping interval (spec.md §4.C).
    #[arg(long)]
    ping_interval_ms: Option<u64>,

    /// Overrides the default 60s pong timeout (spec.md §4.C).
    #[arg(long)]
    pong_timeout_ms: Option<u64>,

    /// Overrides the default 400ms slot duration (spec.md §4.F).
    #[arg(long)]
    slot_duration_ms: Option<u64>,

    /// Mining difficulty: required leading hex-zero count (spec.md §4.H).
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,
}

fn now_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn init_logging(args: &Args) {
    let directive = args
        .log_level
        .clone()
        .or_else(|| std::env::var("EASTSEA_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(args: &Args) -> Result<NodeConfig, String> {
    if let Some(bootstrap_port) = args.bootstrap_port {
        if bootstrap_port == args.port {
            return Err(format!(
                "bootstrap_port {bootstrap_port} must differ from port {}",
                args.port
            ));
        }
    }

    let listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), args.port);
    let mut config = NodeConfig::new(listen_addr);
    config.rpc_port = args.rpc_port;
    config.difficulty = args.difficulty;

    if let Some(bootstrap_port) = args.bootstrap_port {
        config.bootstrap_seeds = vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bootstrap_port)];
    }

    let mut transport = TransportConfig::default();
    if let Some(ms) = args.ping_interval_ms {
        transport.ping_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.pong_timeout_ms {
        transport.pong_timeout = Duration::from_millis(ms);
    }
    config.transport = transport;

    if let Some(ms) = args.slot_duration_ms {
        if ms == 0 {
            return Err("slot_duration_ms must be greater than zero".to_string());
        }
        config.slot_duration = Duration::from_millis(ms);
    }

    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            return ExitCode::from(2);
        }
    };
    runtime.block_on(run(args))
}

async fn run(args: Args) -> ExitCode {
    let demo = args.demo;
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            tracing::error!(error = %msg, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let node = match Node::bind(config).await {
        Ok(node) => node,
        Err(CoordinatorError::BindFailed(err)) => {
            tracing::error!(error = %err, "failed to bind listener");
            return ExitCode::from(2);
        }
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    if demo {
        run_demo(node).await
    } else {
        run_forever(node).await
    }
}

/// Serve until a shutdown signal arrives, then report exit code 3
/// (spec.md §6) if the mempool still held pending work.
async fn run_forever(node: Arc<Node>) -> ExitCode {
    let loop_node = node.clone();
    let event_loop = tokio::spawn(async move { loop_node.run().await });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c; shutting down anyway"),
    }

    node.shutdown().await;
    let _ = event_loop.await;

    if node.mempool_len().await > 0 {
        tracing::warn!("shutdown with pending mempool work");
        ExitCode::from(3)
    } else {
        ExitCode::SUCCESS
    }
}

/// Scripted end-to-end sequence (spec.md §6 `--demo`): submit one
/// transaction, wait for this node (its own sole leader by default,
/// per `NodeConfig::new`) to mine it into a block, then verify the
/// mined block and PoH state are consistent before exiting.
async fn run_demo(node: Arc<Node>) -> ExitCode {
    let loop_node = node.clone();
    let event_loop = tokio::spawn(async move { loop_node.run().await });

    let height_before = node.get_height().await;
    let tx = Transaction::new("alice", "bob", 50, now_s());
    let tx_hash = match node.submit_transaction(tx.clone()).await {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!(error = %err, "demo: transaction was rejected");
            return ExitCode::from(2);
        }
    };
    tracing::info!(tx_hash = %eastsea_crypto::to_hex(&tx_hash), "demo: submitted transaction");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut mined = false;
    while tokio::time::Instant::now() < deadline {
        if node.get_height().await > height_before {
            mined = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let result = if !mined {
        tracing::error!("demo: block was not mined within the deadline");
        ExitCode::from(2)
    } else {
        match node.get_block(height_before + 1).await {
            Some(block) if block.transactions.iter().any(|t| t.hash() == tx.hash()) => {
                let poh = node.get_poh_state().await;
                tracing::info!(
                    height = block.height,
                    tick_count = poh.tick_count,
                    "demo: end-to-end sequence passed"
                );
                ExitCode::SUCCESS
            }
            Some(_) => {
                tracing::error!("demo: mined block is missing the submitted transaction");
                ExitCode::from(2)
            }
            None => {
                tracing::error!("demo: mined block missing from chain");
                ExitCode::from(2)
            }
        }
    };

    node.shutdown().await;
    let _ = event_loop.await;
    result
}
