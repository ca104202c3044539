pub mod block;
pub mod miner;
pub mod model;
pub mod state;
pub mod validation;

pub use block::{Block, meets_difficulty};
pub use model::Blockchain;
pub use state::{LedgerState, Projection};
pub use validation::{LedgerView, Mode};

/// Character a block hash must start with, `difficulty` times.
pub const POW_CHAR: char = '1';

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Number of recent blocks whose median timestamp bounds a new block.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Clock-skew tolerance for strict validation (2 hours, in ms).
pub const MAX_FUTURE_DRIFT_MS: i64 = 2 * 60 * 60 * 1000;

/// Most user transactions a block may carry.
pub const MAX_BLOCK_TRANSACTIONS: usize = 1_000;

/// Most bytes of user transactions (JSON wire form) a block may carry.
pub const MAX_BLOCK_BYTES: usize = 512 * 1024;
