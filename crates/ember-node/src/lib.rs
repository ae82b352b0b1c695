//! # ember-node
//! Miner node composition: configuration, mining loop, and peer RPC.

pub mod config;
pub mod node;
pub mod rpc;

pub use config::MinerConfig;
pub use node::Miner;
#[cfg(feature = "testing")]
pub use node::Tamper;
