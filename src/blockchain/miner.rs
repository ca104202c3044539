//! Proof-of-Work search.
//!
//! Every attempt rebuilds the candidate from the current tip and pending
//! pool, so a block found after the tip moved is never a stale one.

use chrono::Utc;
use log::{debug, info};
use std::sync::RwLock;
use tokio::sync::watch;

use super::state::Projection;
use super::validation::LedgerView;
use super::{Block, Blockchain, MAX_BLOCK_BYTES, MAX_BLOCK_TRANSACTIONS, meets_difficulty};
use crate::transaction::Transaction;

/// Pick pending transactions paying at least `lowest_fee`, in nonce order,
/// keeping only those consistent with the sender's nonce and balance after
/// the transactions already picked, up to the block limits.
pub fn select_transactions(chain: &Blockchain, lowest_fee: u64) -> Vec<Transaction> {
    select_within(chain, lowest_fee, MAX_BLOCK_TRANSACTIONS, MAX_BLOCK_BYTES)
}

fn select_within(
    chain: &Blockchain,
    lowest_fee: u64,
    max_txs: usize,
    max_bytes: usize,
) -> Vec<Transaction> {
    let mut candidates: Vec<&Transaction> = chain
        .pending()
        .iter()
        .filter(|tx| tx.fee >= lowest_fee)
        .collect();
    candidates.sort_by(|a, b| {
        a.nonce
            .cmp(&b.nonce)
            .then_with(|| b.fee.cmp(&a.fee))
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut projection = Projection::new(chain.state());
    let mut picked = Vec::new();
    let mut bytes: usize = 0;
    for tx in candidates {
        if picked.len() >= max_txs {
            break;
        }
        let size = tx.wire_size();
        if bytes.saturating_add(size) > max_bytes {
            continue;
        }
        match projection.admit(tx) {
            Ok(()) => {
                bytes += size;
                picked.push(tx.clone());
            }
            Err(reason) => debug!("MINER - skipping {}: {reason}", tx.hash()),
        }
    }
    picked
}

/// Assemble an unsealed block on the current tip with the given `nonce`.
/// `None` while the chain has no genesis.
pub fn candidate_block(
    chain: &Blockchain,
    reward_address: &str,
    lowest_fee: u64,
    nonce: u64,
) -> Option<Block> {
    let tip = chain.last_block()?;
    let selected = select_transactions(chain, lowest_fee);
    let fees = selected.iter().fold(0u64, |acc, tx| acc.saturating_add(tx.fee));
    let coinbase = Transaction::coinbase(reward_address, chain.reward().saturating_add(fees));

    // never older than what strict validation accepts
    let timestamp = Utc::now()
        .timestamp_millis()
        .max(chain.lowest_acceptable_timestamp().saturating_add(1));

    let mut data = Vec::with_capacity(1 + selected.len());
    data.push(coinbase);
    data.extend(selected);

    let mut block = Block::new(chain.height(), tip.hash(), data, timestamp);
    block.nonce = nonce;
    Some(block)
}

/// Search until a candidate meets the current difficulty or `cancel` flips
/// to `true`. Yields to the scheduler after every attempt.
pub async fn mine(
    chain: &RwLock<Blockchain>,
    reward_address: &str,
    lowest_fee: u64,
    cancel: &watch::Receiver<bool>,
) -> Option<Block> {
    let mut nonce: u64 = 0;
    loop {
        if *cancel.borrow() {
            info!("MINER - cancelled after {nonce} attempts");
            return None;
        }

        let found = {
            let chain = chain.read().expect("ledger lock poisoned");
            candidate_block(&chain, reward_address, lowest_fee, nonce)
                .filter(|block| meets_difficulty(&block.hash(), chain.difficulty()))
        };
        if let Some(block) = found {
            info!(
                "MINER - sealed block #{} (nonce={}, txs={})",
                block.index,
                block.nonce,
                block.data.len()
            );
            return Some(block);
        }

        nonce = nonce.wrapping_add(1);
        tokio::task::yield_now().await;
    }
}
