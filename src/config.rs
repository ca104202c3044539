use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Default blocks between difficulty adjustments.
pub const DEFAULT_DIFFICULTY_ADJUST: u64 = 10;

/// Default target seconds per block.
pub const DEFAULT_TIME_TARGET: u64 = 60;

/// Default blocks between reward halvings.
pub const DEFAULT_REWARD_HALVING: u64 = 1_000;

/// Default genesis reward (smallest units).
pub const DEFAULT_INITIAL_REWARD: u64 = 100;

/// Default Proof-of-Work difficulty (number of leading target characters).
pub const DEFAULT_INITIAL_DIFFICULTY: u32 = 4;

/// Consensus parameters shared by every node on the same chain.
///
/// This is the singleton config row of the store and is served to peers
/// so a fresh node can adopt it together with the genesis block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub reward_halving: u64,
    /// Seconds.
    pub time_target: u64,
    pub difficulty_adjust: u64,
    pub initial_reward: u64,
    pub initial_difficulty: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            reward_halving: DEFAULT_REWARD_HALVING,
            time_target: DEFAULT_TIME_TARGET,
            difficulty_adjust: DEFAULT_DIFFICULTY_ADJUST,
            initial_reward: DEFAULT_INITIAL_REWARD,
            initial_difficulty: DEFAULT_INITIAL_DIFFICULTY,
        }
    }
}

impl ChainConfig {
    /// Read consensus parameters from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reward_halving: env_or("REWARD_HALVING", defaults.reward_halving).max(1),
            time_target: env_or("TIME_TARGET", defaults.time_target),
            difficulty_adjust: env_or("DIFFICULTY_ADJUST", defaults.difficulty_adjust).max(1),
            initial_reward: env_or("INITIAL_REWARD", defaults.initial_reward),
            initial_difficulty: env_or("INITIAL_DIFFICULTY", defaults.initial_difficulty).max(1),
        }
    }
}

/// Process-level settings of a node (not shared with peers).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// URL other peers use to reach this node (`host:port`).
    pub public_url: String,
    /// Directory of the chain database.
    pub chain_db: String,
    pub sync_peer: Option<String>,
    pub miner_address: Option<String>,
    pub lowest_fee: u64,
    pub peer_timeout_secs: u64,
    /// Seconds between asking known peers for their peers.
    pub discover_secs: u64,
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_or("PORT", 8000);
        let public_url = env::var("PUBLIC_URL").unwrap_or_else(|_| format!("{host}:{port}"));

        Self {
            public_url,
            host,
            port,
            chain_db: env::var("CHAIN_DB").unwrap_or_else(|_| "blockchain.db".to_string()),
            sync_peer: non_empty_var("SYNC_PEER"),
            miner_address: non_empty_var("MINER_ADDRESS"),
            lowest_fee: env_or("LOWEST_FEE", 1),
            peer_timeout_secs: env_or("PEER_TIMEOUT_SECS", 10),
            discover_secs: env_or("DISCOVER_SECS", 60u64).max(1),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
