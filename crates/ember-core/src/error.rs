//! Error types for the Ember protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid private key hex")] InvalidPrivateKey,
    #[error("invalid public key hex")] InvalidPublicKey,
    #[error("invalid signature encoding")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a merkle tree with no leaves")] EmptyTree,
    #[error("transaction not found in tree: {0}")] TransactionNotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("missing signature on input {index}")] MissingSignature { index: usize },
    #[error("invalid signature on input {index}")] SignatureVerifyFailed { index: usize },
    #[error("insufficient funds: inputs {inputs}, outputs {outputs}")] InsufficientFunds { inputs: i64, outputs: i64 },
    #[error("no private key for owner {0}")] MissingPrivateKey(String),
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("non-positive output value at index {0}")] NonPositiveOutput(usize),
    #[error("transaction id mismatch: declared {declared}, computed {computed}")] IdMismatch { declared: String, computed: String },
    #[error("unexpected coinbase transaction")] UnexpectedCoinbase,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid index: expected {expected}, got {got}")] InvalidIndex { expected: u64, got: u64 },
    #[error("invalid prev hash")] InvalidPrevHash,
    #[error("invalid block hash")] InvalidHash,
    #[error("insufficient proof of work: {bits} < {required} bits")] InsufficientPow { bits: u32, required: u32 },
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("block has no coinbase")] MissingCoinbase,
    #[error("coinbase at index {0}, must be first")] MisplacedCoinbase(usize),
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("coinbase over-issuance: pays {got}, allowed {max}")] OverIssuance { got: i64, max: i64 },
    #[error("tx error in {index}: {source}")] Transaction { index: usize, source: TransactionError },
    #[error("replacement chain not longer: {candidate} <= {current}")] NotLonger { current: usize, candidate: usize },
    #[error("invalid genesis block")] InvalidGenesis,
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("malformed payload: {0}")] Decode(String),
    #[error("duplicate transaction: {0}")] DuplicateTransaction(String),
    #[error("peer unreachable: {0}")] PeerUnreachable(String),
    #[error("failed to bind RPC listener: {0}")] Bind(String),
    #[error("miner is stopped")] Stopped,
}

#[derive(Error, Debug)]
pub enum EmberError {
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Merkle(#[from] MerkleError),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Node(#[from] NodeError),
}
