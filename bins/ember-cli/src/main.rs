//! ember-cli — command-line wallet and node client.
//!
//! Talks to a miner node over its RPC surface: key generation, balance
//! and UTXO queries, transaction submission, and chain inspection. Keys
//! are plain hex on the command line; this is a development wallet, not
//! a custody solution.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use ember_core::block::Block;
use ember_core::constants::COIN;
use ember_core::crypto::KeyPair;
use ember_node::rpc::{InputRef, MinerRpcClient, OutputSpec, SubmitTxRequest, peer_client};

/// Ember command-line wallet.
#[derive(Parser)]
#[command(name = "ember-cli", version, about = "Ember wallet and node client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new keypair. The public key is the address.
    Keygen,
    /// Show a node's status.
    Status(NodeArgs),
    /// Query the balance of an address.
    Balance(BalanceArgs),
    /// List the unspent outputs of an address.
    Utxos(BalanceArgs),
    /// Send satoshi to an address.
    Send(SendArgs),
    /// Print a summary of the node's chain.
    Chain(ChainArgs),
}

#[derive(Args)]
struct NodeArgs {
    /// RPC endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:7732")]
    node: String,
}

#[derive(Args)]
struct BalanceArgs {
    /// RPC endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:7732")]
    node: String,

    /// Address (public key hex).
    address: String,
}

#[derive(Args)]
struct SendArgs {
    /// RPC endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:7732")]
    node: String,

    /// Sender's private key hex.
    #[arg(short, long)]
    key: String,

    /// Recipient address (public key hex).
    #[arg(short, long)]
    to: String,

    /// Amount in satoshi.
    #[arg(short, long)]
    amount: i64,

    /// Fee in satoshi, left to the miner.
    #[arg(short, long, default_value_t = 0)]
    fee: i64,
}

#[derive(Args)]
struct ChainArgs {
    /// RPC endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:7732")]
    node: String,

    /// First block index to show.
    #[arg(short, long, default_value_t = 0)]
    start: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Status(args) => status(args).await,
        Commands::Balance(args) => balance(args).await,
        Commands::Utxos(args) => utxos(args).await,
        Commands::Send(args) => send(args).await,
        Commands::Chain(args) => chain(args).await,
    }
}

fn keygen() -> Result<()> {
    let keypair = KeyPair::generate();
    println!("private: {}", keypair.private_hex());
    println!("address: {}", keypair.public_hex());
    Ok(())
}

async fn status(args: NodeArgs) -> Result<()> {
    let client = peer_client(&args.node)?;
    let status = client.get_status().await.context("getstatus failed")?;
    println!("id:           {}", status.id);
    println!("chain length: {}", status.chain_length);
    println!("pending txs:  {}", status.pending_txs);
    println!("peers:        {}", status.peers);
    println!("mining:       {}", status.mining);
    println!("difficulty:   {} bits", status.difficulty);
    Ok(())
}

async fn balance(args: BalanceArgs) -> Result<()> {
    let client = peer_client(&args.node)?;
    let satoshi = client.get_balance(args.address).await.context("getbalance failed")?;
    println!("{satoshi} satoshi ({:.8} EMB)", satoshi as f64 / COIN as f64);
    Ok(())
}

async fn utxos(args: BalanceArgs) -> Result<()> {
    let client = peer_client(&args.node)?;
    let utxos = client.get_utxos(args.address).await.context("getutxos failed")?;
    if utxos.is_empty() {
        println!("no unspent outputs");
        return Ok(());
    }
    for utxo in utxos {
        println!("{}:{}  {} satoshi", utxo.txid, utxo.out_index, utxo.value);
    }
    Ok(())
}

async fn send(args: SendArgs) -> Result<()> {
    if args.amount <= 0 {
        bail!("amount must be positive");
    }
    if args.fee < 0 {
        bail!("fee cannot be negative");
    }
    let keypair = KeyPair::from_private_hex(&args.key).context("invalid private key")?;
    let address = keypair.public_hex();

    let client = peer_client(&args.node)?;
    let utxos = client.get_utxos(address.clone()).await.context("getutxos failed")?;

    // Greedy coin selection in node order.
    let needed = args.amount + args.fee;
    let mut inputs = Vec::new();
    let mut gathered: i64 = 0;
    for utxo in utxos {
        if gathered >= needed {
            break;
        }
        gathered += utxo.value;
        inputs.push(InputRef { txid: utxo.txid, out_index: utxo.out_index });
    }
    if gathered < needed {
        bail!("insufficient funds: have {gathered} satoshi, need {needed}");
    }

    let mut outputs = vec![OutputSpec { value: args.amount, scriptpubkey: args.to }];
    let change = gathered - needed;
    if change > 0 {
        outputs.push(OutputSpec { value: change, scriptpubkey: address.clone() });
    }

    let reply = client
        .submit_transaction(SubmitTxRequest {
            inputs,
            outputs,
            private_keys: HashMap::from([(address, args.key)]),
        })
        .await
        .context("submittransaction failed")?;

    if !reply.success {
        bail!("transaction rejected: {}", reply.error.unwrap_or_default());
    }
    println!("submitted: {}", reply.tx_id.unwrap_or_default());
    Ok(())
}

async fn chain(args: ChainArgs) -> Result<()> {
    let client = peer_client(&args.node)?;
    let reply = client.get_chain(args.start).await.context("getchain failed")?;
    println!("chain length: {}", reply.length);
    for raw in &reply.blocks {
        let block: Block = Block::from_json(raw).context("malformed block from node")?;
        println!(
            "#{:<5} {}  txs={:<3} difficulty={:<2} miner={}",
            block.index,
            block.hash,
            block.transactions.len(),
            block.difficulty,
            block.miner_id
        );
    }
    Ok(())
}
