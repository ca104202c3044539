//! Error types for the ledger, its store and the sync protocol.

use thiserror::Error;

/// Why a transaction or block was not accepted.
///
/// Rejections are expected and frequent (stale work, spent balance) and
/// never change ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("amount must be > 0")]
    ZeroAmount,

    #[error("fee must be > 0")]
    ZeroFee,

    #[error("amount plus fee overflows")]
    Overflow,

    #[error("bad address length: {0} (expected 96 hex chars)")]
    BadAddress(usize),

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("hash {0} does not meet difficulty {1}")]
    InsufficientWork(String, u32),

    #[error("previous hash mismatch: expected {expected}, got {got}")]
    PreviousHashMismatch { expected: String, got: String },

    #[error("index mismatch: expected {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("invalid coinbase: {0}")]
    InvalidCoinbase(&'static str),

    #[error("coinbase claims {claimed}, at most {allowed} allowed")]
    ExcessiveReward { claimed: u64, allowed: u64 },

    #[error("timestamp {timestamp} not after median {median}")]
    TimestampTooOld { timestamp: i64, median: i64 },

    #[error("timestamp {timestamp} too far in the future (limit {limit})")]
    TimestampTooNew { timestamp: i64, limit: i64 },

    #[error("invalid genesis block: {0}")]
    InvalidGenesis(&'static str),

    #[error("{count} transactions exceed the block limit of {max}")]
    TooManyTransactions { count: usize, max: usize },

    #[error("{bytes} bytes of transactions exceed the block limit of {max}")]
    BlockTooLarge { bytes: usize, max: usize },

    #[error("{0} is full")]
    PoolFull(&'static str),
}

/// Failure of the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store database: {0}")]
    Db(#[from] sled::Error),

    #[error("store record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger already has a genesis block")]
    AlreadyInitialized,

    #[error("ledger has no genesis block")]
    Empty,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid key material")]
    InvalidKey,

    #[error("signing failed")]
    Signing,
}

/// Failure talking to a single peer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Connectivity failure; the peer is dropped from the known set.
    #[error("peer {0} unreachable")]
    Unreachable(String),

    #[error("peer {peer} answered badly: {reason}")]
    Protocol { peer: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("remote genesis rejected: {0}")]
    InvalidGenesis(Rejection),

    #[error("fork at height {height}: local {local}, remote {remote}")]
    ForkMismatch {
        height: u64,
        local: String,
        remote: String,
    },

    #[error("remote block {index} rejected: {reason}")]
    BlockRejected { index: u64, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
