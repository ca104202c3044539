//! Account state derived from committed blocks.
//!
//! `LedgerState` is an index over the committed history; the `*_by_scan`
//! functions are the reference definitions it must always agree with.

use std::collections::HashMap;

use super::{Block, MEDIAN_TIME_SPAN};
use crate::error::Rejection;
use crate::transaction::Transaction;

/// Per-address balance and nonce over committed transactions only.
#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    balances: HashMap<String, u64>,
    nonces: HashMap<String, u64>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index by replaying `blocks` from genesis.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut state = Self::new();
        for block in blocks {
            state.apply_block(block);
        }
        state
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Number of committed transactions sent by `address`.
    pub fn nonce(&self, address: &str) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Fold a committed block into the index.
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.data {
            self.apply_transaction(tx);
        }
    }

    fn apply_transaction(&mut self, tx: &Transaction) {
        let to = self.balances.entry(tx.to.clone()).or_insert(0);
        *to = to.saturating_add(tx.amount);

        if tx.is_coinbase() {
            return;
        }
        let cost = tx.amount.saturating_add(tx.fee);
        let from = self.balances.entry(tx.from.clone()).or_insert(0);
        *from = from.saturating_sub(cost);
        *self.nonces.entry(tx.from.clone()).or_insert(0) += 1;
    }
}

/// Received minus sent-plus-fees for `address`, by scanning every block.
pub fn balance_by_scan(blocks: &[Block], address: &str) -> u64 {
    let mut balance: i128 = 0;
    for tx in blocks.iter().flat_map(|b| &b.data) {
        if tx.to == address {
            balance += i128::from(tx.amount);
        }
        if tx.from == address && !tx.is_coinbase() {
            balance -= i128::from(tx.amount) + i128::from(tx.fee);
        }
    }
    u64::try_from(balance.max(0)).unwrap_or(u64::MAX)
}

/// Count of committed transactions sent by `address`, by scanning every block.
pub fn nonce_by_scan(blocks: &[Block], address: &str) -> u64 {
    blocks
        .iter()
        .flat_map(|b| &b.data)
        .filter(|tx| tx.from == address && !tx.is_coinbase())
        .count() as u64
}

/// Median timestamp of the most recent `MEDIAN_TIME_SPAN` blocks (all if fewer).
pub fn median_timestamp(blocks: &[Block]) -> i64 {
    let start = blocks.len().saturating_sub(MEDIAN_TIME_SPAN);
    let mut stamps: Vec<i64> = blocks[start..].iter().map(|b| b.timestamp).collect();
    if stamps.is_empty() {
        return 0;
    }
    stamps.sort_unstable();
    let mid = stamps.len() / 2;
    if stamps.len() % 2 == 0 {
        // mean of the two middle values, rounded down; peers may send any i64
        let sum = i128::from(stamps[mid - 1]) + i128::from(stamps[mid]);
        sum.div_euclid(2) as i64
    } else {
        stamps[mid]
    }
}

/// Ledger state plus the effect of transactions already admitted into one
/// candidate block.
///
/// Both block assembly and block commit admit user transactions through
/// here, so a sender's in-block nonce sequence and cumulative spend are
/// checked the same way in both places. Nothing is credited: coins received
/// in a block are spendable only once that block is committed.
#[derive(Debug)]
pub struct Projection<'a> {
    state: &'a LedgerState,
    balances: HashMap<String, u64>,
    nonces: HashMap<String, u64>,
}

impl<'a> Projection<'a> {
    pub fn new(state: &'a LedgerState) -> Self {
        Self {
            state,
            balances: HashMap::new(),
            nonces: HashMap::new(),
        }
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.balances
            .get(address)
            .copied()
            .unwrap_or_else(|| self.state.balance(address))
    }

    /// Nonce the next transaction from `address` must carry.
    pub fn next_nonce(&self, address: &str) -> u64 {
        self.nonces
            .get(address)
            .copied()
            .unwrap_or_else(|| self.state.nonce(address))
    }

    /// Check `tx` against the projected nonce and balance of its sender and,
    /// if it fits, apply it to the projection.
    pub fn admit(&mut self, tx: &Transaction) -> Result<(), Rejection> {
        let expected = self.next_nonce(&tx.from);
        if tx.nonce != expected {
            return Err(Rejection::InvalidNonce {
                expected,
                got: tx.nonce,
            });
        }
        let cost = tx.total_cost().ok_or(Rejection::Overflow)?;
        let have = self.balance(&tx.from);
        if have < cost {
            return Err(Rejection::InsufficientBalance { have, need: cost });
        }

        self.balances.insert(tx.from.clone(), have - cost);
        self.nonces.insert(tx.from.clone(), expected + 1);
        Ok(())
    }
}
