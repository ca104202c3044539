use log::debug;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

use super::{BlockRow, ChainStore, StoredBlock, TransactionRow};
use crate::blockchain::Block;
use crate::config::ChainConfig;
use crate::error::StoreError;

const BLOCKS_TREE: &str = "blocks";
const TRANSACTIONS_TREE: &str = "transactions";
const CONFIG_KEY: &[u8] = b"config";

/// Embedded `sled` database.
///
/// - `blocks` tree: big-endian height -> `BlockRow`
/// - `transactions` tree: block hash ‖ big-endian position ‖ tx hash -> `TransactionRow`
/// - `config` key in the default tree: the `ChainConfig` row
///
/// A database without a config row holds no chain yet.
pub struct SledStore {
    db: sled::Db,
    blocks: sled::Tree,
    transactions: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let transactions = db.open_tree(TRANSACTIONS_TREE)?;
        debug!(
            "opened store at {} ({} blocks)",
            path.as_ref().display(),
            blocks.len()
        );
        Ok(Self {
            db,
            blocks,
            transactions,
        })
    }

    fn transaction_key(block_hash: &str, position: u32, hash: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(block_hash.len() + 4 + hash.len());
        key.extend_from_slice(block_hash.as_bytes());
        key.extend_from_slice(&position.to_be_bytes());
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn load_block(&self, row: BlockRow) -> Result<Block, StoreError> {
        let mut transactions = Vec::new();
        for entry in self.transactions.scan_prefix(row.hash.as_bytes()) {
            let (_, value) = entry?;
            transactions.push(serde_json::from_slice::<TransactionRow>(&value)?);
        }
        StoredBlock {
            block: row,
            transactions,
        }
        .into_block()
    }
}

impl ChainStore for SledStore {
    fn load(&self) -> Result<Option<(ChainConfig, Vec<Block>)>, StoreError> {
        let config = match self.db.get(CONFIG_KEY)? {
            Some(raw) => serde_json::from_slice::<ChainConfig>(&raw)?,
            None if self.blocks.is_empty() => return Ok(None),
            None => return Err(StoreError::Corrupt("blocks without a config row".into())),
        };

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for entry in self.blocks.iter() {
            let (_, value) = entry?;
            let row: BlockRow = serde_json::from_slice(&value)?;
            if row.height != blocks.len() as u64 {
                return Err(StoreError::Corrupt(format!(
                    "expected block {}, found {}",
                    blocks.len(),
                    row.height
                )));
            }
            blocks.push(self.load_block(row)?);
        }
        Ok(Some((config, blocks)))
    }

    fn write_config(&mut self, config: &ChainConfig) -> Result<(), StoreError> {
        self.db.insert(CONFIG_KEY, serde_json::to_vec(config)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn append_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let stored = StoredBlock::from_block(block);
        let block_key = stored.block.height.to_be_bytes();
        let block_value = serde_json::to_vec(&stored.block)?;
        let mut rows = Vec::with_capacity(stored.transactions.len());
        for (position, row) in stored.transactions.iter().enumerate() {
            let position = u32::try_from(position)
                .map_err(|_| StoreError::Corrupt("too many transactions in block".into()))?;
            rows.push((
                Self::transaction_key(&row.block_hash, position, &row.hash),
                serde_json::to_vec(row)?,
            ));
        }

        // block row and transaction rows land together or not at all
        (&self.blocks, &self.transactions)
            .transaction(|(blocks, transactions)| {
                blocks.insert(&block_key[..], block_value.as_slice())?;
                for (key, value) in &rows {
                    transactions.insert(key.as_slice(), value.as_slice())?;
                }
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::Db(e),
                TransactionError::Abort(()) => StoreError::Corrupt("block write aborted".into()),
            })?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("pow_ledger_{}_{}.db", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&p);
        p
    }

    fn mined(index: u64, previous_hash: String) -> Block {
        let mut b = Block::genesis(&"c".repeat(96), 100);
        b.index = index;
        b.previous_hash = previous_hash;
        b.mine(1);
        b
    }

    #[test]
    fn fresh_database_is_empty_chain() {
        let path = temp_path("fresh");
        let store = SledStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_none());
        drop(store);
        let _ = std::fs::remove_dir_all(&path);
    }

    #[test]
    fn blocks_load_back_in_height_order() {
        let path = temp_path("roundtrip");
        let cfg = ChainConfig::default();
        let genesis = mined(0, "0".into());
        // enough blocks that little-endian keys would sort wrongly
        let mut expected = vec![genesis.clone()];
        {
            let mut store = SledStore::open(&path).unwrap();
            store.write_config(&cfg).unwrap();
            store.append_block(&genesis).unwrap();
            for index in 1..260 {
                let block = mined(index, expected.last().unwrap().hash());
                store.append_block(&block).unwrap();
                expected.push(block);
            }
        }

        let (loaded_cfg, blocks) = SledStore::open(&path).unwrap().load().unwrap().unwrap();
        assert_eq!(loaded_cfg, cfg);
        assert_eq!(blocks, expected);
        let _ = std::fs::remove_dir_all(&path);
    }

    #[test]
    fn transactions_keep_block_order() {
        let path = temp_path("txorder");
        let mut block = mined(0, "0".into());
        for amount in [5, 3, 9] {
            let tx = Transaction::new(&"d".repeat(96), &"e".repeat(96), amount, 1, 0);
            block.data.push(tx);
        }
        block.mine(1);

        let mut store = SledStore::open(&path).unwrap();
        store.write_config(&ChainConfig::default()).unwrap();
        store.append_block(&block).unwrap();
        let (_, blocks) = store.load().unwrap().unwrap();
        let amounts: Vec<u64> = blocks[0].data.iter().map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![100, 5, 3, 9]);
        drop(store);
        let _ = std::fs::remove_dir_all(&path);
    }

    #[test]
    fn blocks_without_config_are_corrupt() {
        let path = temp_path("noconfig");
        let mut store = SledStore::open(&path).unwrap();
        store.append_block(&mined(0, "0".into())).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
        drop(store);
        let _ = std::fs::remove_dir_all(&path);
    }

    #[test]
    fn gap_in_heights_is_corrupt() {
        let path = temp_path("gap");
        let mut store = SledStore::open(&path).unwrap();
        store.write_config(&ChainConfig::default()).unwrap();
        let genesis = mined(0, "0".into());
        store.append_block(&genesis).unwrap();
        store.append_block(&mined(2, genesis.hash())).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
        drop(store);
        let _ = std::fs::remove_dir_all(&path);
    }
}
