//! Persistence contract for committed blocks and the config row.
//!
//! The ledger keeps its working state in memory; a store only has to
//! durably record what was committed and hand it back on restart.

pub mod db;
pub mod memory;

pub use db::SledStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::config::ChainConfig;
use crate::error::StoreError;
use crate::transaction::Transaction;

/// Blocks table row, keyed by height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRow {
    pub height: u64,
    pub hash: String,
    pub nonce: u64,
    pub previous_hash: String,
    pub timestamp: i64,
}

/// Transactions table row, keyed by (block_hash, hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRow {
    pub block_hash: String,
    pub hash: String,
    pub to: String,
    pub from: String,
    pub amount: u64,
    pub timestamp: i64,
    pub signature: Option<String>,
    pub nonce: u64,
    pub fee: u64,
}

/// A block row with its transaction rows, written as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlock {
    pub block: BlockRow,
    /// In block order; the coinbase first.
    pub transactions: Vec<TransactionRow>,
}

impl StoredBlock {
    pub fn from_block(block: &Block) -> Self {
        let block_hash = block.hash();
        let transactions = block
            .data
            .iter()
            .map(|tx| TransactionRow {
                block_hash: block_hash.clone(),
                hash: tx.hash(),
                to: tx.to.clone(),
                from: tx.from.clone(),
                amount: tx.amount,
                timestamp: tx.timestamp,
                signature: tx.signature.clone(),
                nonce: tx.nonce,
                fee: tx.fee,
            })
            .collect();
        Self {
            block: BlockRow {
                height: block.index,
                hash: block_hash,
                nonce: block.nonce,
                previous_hash: block.previous_hash.clone(),
                timestamp: block.timestamp,
            },
            transactions,
        }
    }

    /// Reassemble the block, checking the stored hashes still match.
    pub fn into_block(self) -> Result<Block, StoreError> {
        let mut data = Vec::with_capacity(self.transactions.len());
        for row in self.transactions {
            let tx = Transaction {
                to: row.to,
                from: row.from,
                amount: row.amount,
                fee: row.fee,
                nonce: row.nonce,
                timestamp: row.timestamp,
                signature: row.signature,
            };
            if tx.hash() != row.hash || row.block_hash != self.block.hash {
                return Err(StoreError::Corrupt(format!(
                    "transaction {} in block {}",
                    row.hash, self.block.height
                )));
            }
            data.push(tx);
        }

        let mut block = Block::new(
            self.block.height,
            self.block.previous_hash,
            data,
            self.block.timestamp,
        );
        block.nonce = self.block.nonce;
        if block.hash() != self.block.hash {
            return Err(StoreError::Corrupt(format!("block {}", self.block.height)));
        }
        Ok(block)
    }
}

/// Durable home of the chain. Absence of a stored chain means "no chain
/// yet" and is not an error.
pub trait ChainStore: Send + Sync {
    /// Stored config row and blocks in height order, or `None` if empty.
    fn load(&self) -> Result<Option<(ChainConfig, Vec<Block>)>, StoreError>;

    fn write_config(&mut self, config: &ChainConfig) -> Result<(), StoreError>;

    /// Record a committed block and its transactions atomically.
    fn append_block(&mut self, block: &Block) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_round_trip_and_detect_tampering() {
        let mut cb = Transaction::coinbase(&"a".repeat(96), 100);
        cb.timestamp = 7;
        let mut block = Block::new(0, "0".into(), vec![cb], 9);
        block.mine(1);

        let stored = StoredBlock::from_block(&block);
        assert_eq!(stored.block.hash, block.hash());
        assert_eq!(stored.transactions[0].block_hash, block.hash());
        assert_eq!(stored.clone().into_block().unwrap(), block);

        let mut tampered = stored;
        tampered.transactions[0].amount = 1_000;
        assert!(matches!(tampered.into_block(), Err(StoreError::Corrupt(_))));
    }
}
