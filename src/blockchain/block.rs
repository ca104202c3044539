use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{GENESIS_PREVIOUS_HASH, POW_CHAR};
use crate::transaction::Transaction;

/// A block of transactions; `data[0]` is always the coinbase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub nonce: u64, // Proof-of-Work nonce
    pub data: Vec<Transaction>,
    pub previous_hash: String,
    pub timestamp: i64, // Unix milliseconds (UTC)
}

impl Block {
    /// Create the genesis block (not mined yet) paying `reward` to `address`.
    pub fn genesis(address: &str, reward: u64) -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH.to_string(),
            vec![Transaction::coinbase(address, reward)],
            Utc::now().timestamp_millis(),
        )
    }

    /// Create a new block (not mined yet) with `nonce` 0.
    pub fn new(index: u64, previous_hash: String, data: Vec<Transaction>, timestamp: i64) -> Self {
        Self {
            index,
            nonce: 0,
            data,
            previous_hash,
            timestamp,
        }
    }

    /// SHA-256 over `index, nonce, previous_hash, data, timestamp`.
    /// Transactions enter the preimage as their JSON wire form, so
    /// signatures are covered too.
    pub fn hash(&self) -> String {
        let data_json = serde_json::to_string(&self.data).expect("serialize txs");
        let preimage = format!(
            "{}{}{}{}{}",
            self.index, self.nonce, self.previous_hash, data_json, self.timestamp
        );
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.data.first()
    }

    /// User transactions (everything after the coinbase).
    pub fn user_transactions(&self) -> &[Transaction] {
        self.data.get(1..).unwrap_or(&[])
    }

    /// Wire size of the user transactions, summed.
    pub fn user_bytes(&self) -> usize {
        self.user_transactions()
            .iter()
            .fold(0usize, |acc, tx| acc.saturating_add(tx.wire_size()))
    }

    /// Sum of fees of the user transactions, `None` on overflow.
    pub fn total_fees(&self) -> Option<u64> {
        self.user_transactions()
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee))
    }

    /// Search nonces until the hash meets `difficulty`.
    pub fn mine(&mut self, difficulty: u32) {
        while !meets_difficulty(&self.hash(), difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

/// Whether `hash` starts with `difficulty` repetitions of the target character.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.chars().take(difficulty).all(|c| c == POW_CHAR)
}
