//! Ember miner daemon.
//!
//! Starts a miner node: RPC server, startup chain sync against the
//! configured peers, and (unless disabled) the mining loop. State lives
//! in memory for the lifetime of the process.

use std::process;

use clap::Parser;
use tracing::{error, info, warn};

use ember_core::constants::DEFAULT_RPC_PORT;
use ember_core::crypto::KeyPair;
use ember_node::{Miner, MinerConfig};

/// Ember miner node.
#[derive(Parser, Debug)]
#[command(name = "ember-miner", version, about = "Ember proof-of-work miner node")]
struct Args {
    /// Miner identity: the public key hex that receives coinbase rewards.
    /// A fresh ephemeral keypair is generated when omitted.
    #[arg(long)]
    miner_id: Option<String>,

    /// RPC server bind address.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// RPC server port (0 picks an ephemeral port).
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    port: u16,

    /// Peer RPC endpoints (comma-separated, e.g. http://10.0.0.2:7732).
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Proof-of-work difficulty in leading zero bits.
    #[arg(long, default_value_t = 6)]
    difficulty: u32,

    /// Mining worker threads; 1 mines sequentially.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Retarget difficulty toward the 10 s block interval.
    #[arg(long)]
    dynamic_difficulty: bool,

    /// Serve queries and relay only; do not mine.
    #[arg(long)]
    no_mine: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json").
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let miner_id = args.miner_id.unwrap_or_else(|| {
        let keypair = KeyPair::generate();
        warn!(
            private_key = %keypair.private_hex(),
            "no --miner-id given; generated an ephemeral key (rewards are lost on restart)"
        );
        keypair.public_hex()
    });

    let config = MinerConfig {
        miner_id,
        bind: args.bind,
        port: args.port,
        peers: args.peers,
        difficulty: args.difficulty,
        mining_threads: args.threads,
        dynamic_difficulty: args.dynamic_difficulty,
        log_level: args.log_level,
    };

    let miner = Miner::new(config);

    let addr = match miner.serve().await {
        Ok(addr) => addr,
        Err(e) => {
            error!("failed to start RPC server: {e}");
            process::exit(1);
        }
    };
    info!(%addr, id = %miner.id(), "ember miner running (Ctrl+C to stop)");

    // Catch up with the mesh before producing blocks of our own.
    miner.sync_with_all_peers().await;

    if !args.no_mine {
        miner.start_mining();
    }

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received Ctrl+C, shutting down...");
    miner.stop();
}

/// Initialize the tracing subscriber.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
