//! Minimal proof-of-work account ledger: signed transfers grouped into
//! hash-linked blocks, a cooperative miner, and catch-up sync between peers.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod network;
pub mod storage;
pub mod transaction;
pub mod wallet;

pub use blockchain::{Block, Blockchain, Mode};
pub use config::{ChainConfig, NodeConfig};
pub use error::{LedgerError, PeerError, Rejection, StoreError, SyncError, WalletError};
pub use ledger::Ledger;
pub use transaction::Transaction;
pub use wallet::KeyPair;
