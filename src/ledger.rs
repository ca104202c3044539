//! Thread-safe facade over the chain engine.
//!
//! Every mutation takes the write lock for its whole duration, so
//! `add_block`/`add_transaction` calls are serialized. Reads share the
//! lock and see a consistent snapshot.

use std::sync::RwLock;
use tokio::sync::watch;

use crate::blockchain::{Block, Blockchain, LedgerView, Mode, miner};
use crate::config::ChainConfig;
use crate::error::{LedgerError, Rejection};
use crate::storage::ChainStore;
use crate::transaction::Transaction;

pub struct Ledger {
    chain: RwLock<Blockchain>,
}

impl Ledger {
    /// A ledger with no genesis, backed by `store`.
    pub fn new(config: ChainConfig, store: Box<dyn ChainStore>) -> Self {
        Self::from_chain(Blockchain::new(config, store))
    }

    /// Load a ledger from `store`, replaying stored blocks.
    pub fn open(config: ChainConfig, store: Box<dyn ChainStore>) -> Result<Self, LedgerError> {
        Ok(Self::from_chain(Blockchain::open(config, store)?))
    }

    pub fn from_chain(chain: Blockchain) -> Self {
        Self {
            chain: RwLock::new(chain),
        }
    }

    /// Mine and commit a genesis block paying `address`. Returns its hash.
    pub fn mine_genesis(&self, address: &str) -> Result<String, LedgerError> {
        let mut chain = self.chain.write().expect("ledger lock poisoned");
        chain.mine_genesis(address).map(Block::hash)
    }

    /// Adopt a peer's genesis block and its consensus parameters.
    pub fn adopt_genesis(&self, genesis: Block, config: ChainConfig) -> Result<String, LedgerError> {
        let mut chain = self.chain.write().expect("ledger lock poisoned");
        chain.adopt_genesis(genesis, config).map(Block::hash)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<(), Rejection> {
        self.chain.read().expect("ledger lock poisoned").verify_transaction(tx)
    }

    /// Validate and admit `tx` to the pending pool; `Ok(false)` if it was
    /// already pending.
    pub fn add_transaction(&self, tx: Transaction) -> Result<bool, Rejection> {
        self.chain.write().expect("ledger lock poisoned").add_transaction(tx)
    }

    pub fn verify_block(&self, block: &Block, mode: Mode) -> Result<(), Rejection> {
        self.chain.read().expect("ledger lock poisoned").verify_block(block, mode)
    }

    pub fn verify_genesis_block(&self, block: &Block) -> Result<(), Rejection> {
        self.chain
            .read()
            .expect("ledger lock poisoned")
            .verify_genesis_block(block)
    }

    pub fn add_block(&self, block: Block, mode: Mode) -> Result<(), LedgerError> {
        self.chain.write().expect("ledger lock poisoned").add_block(block, mode)
    }

    /// Search for the next block without a way to stop early.
    pub async fn mine_block(&self, reward_address: &str, lowest_fee: u64) -> Option<Block> {
        let (_keep, cancel) = watch::channel(false);
        self.mine_block_until(reward_address, lowest_fee, &cancel).await
    }

    /// Search for the next block until `cancel` reads `true`. The block is
    /// not committed; pass it to `add_block`.
    pub async fn mine_block_until(
        &self,
        reward_address: &str,
        lowest_fee: u64,
        cancel: &watch::Receiver<bool>,
    ) -> Option<Block> {
        miner::mine(&self.chain, reward_address, lowest_fee, cancel).await
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().expect("ledger lock poisoned").is_empty()
    }

    pub fn height(&self) -> u64 {
        self.chain.read().expect("ledger lock poisoned").height()
    }

    pub fn block_at(&self, index: u64) -> Option<Block> {
        self.chain
            .read()
            .expect("ledger lock poisoned")
            .block_at(index)
            .cloned()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.chain
            .read()
            .expect("ledger lock poisoned")
            .last_block()
            .cloned()
    }

    /// Blocks with `start <= index < end`.
    pub fn blocks_in_range(&self, start: u64, end: u64) -> Vec<Block> {
        self.chain
            .read()
            .expect("ledger lock poisoned")
            .blocks_in_range(start, end)
            .to_vec()
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.chain.read().expect("ledger lock poisoned").balance(address)
    }

    /// Next nonce `address` must use.
    pub fn nonce(&self, address: &str) -> u64 {
        self.chain.read().expect("ledger lock poisoned").nonce(address)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.chain
            .read()
            .expect("ledger lock poisoned")
            .pending()
            .iter()
            .cloned()
            .collect()
    }

    pub fn difficulty(&self) -> u32 {
        self.chain.read().expect("ledger lock poisoned").difficulty()
    }

    pub fn reward(&self) -> u64 {
        self.chain.read().expect("ledger lock poisoned").reward()
    }

    pub fn config(&self) -> ChainConfig {
        *self.chain.read().expect("ledger lock poisoned").config()
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chain.try_read() {
            Ok(chain) => std::fmt::Debug::fmt(&*chain, f),
            Err(_) => f.write_str("Ledger { <locked> }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::wallet::KeyPair;
    use std::sync::Arc;

    fn ledger() -> Ledger {
        let cfg = ChainConfig {
            initial_difficulty: 1,
            initial_reward: 100,
            time_target: 0,
            ..ChainConfig::default()
        };
        Ledger::new(cfg, Box::new(MemoryStore::new()))
    }

    #[test]
    fn genesis_once() {
        let l = ledger();
        assert!(l.is_empty());
        let a = KeyPair::generate();
        let hash = l.mine_genesis(a.address()).unwrap();
        assert_eq!(l.last_block().unwrap().hash(), hash);
        assert!(matches!(
            l.mine_genesis(a.address()),
            Err(LedgerError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn concurrent_duplicate_blocks_commit_once() {
        let a = KeyPair::generate();
        let l = Arc::new(ledger());
        l.mine_genesis(a.address()).unwrap();
        let block = l.mine_block(a.address(), 1).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = Arc::clone(&l);
                let block = block.clone();
                std::thread::spawn(move || l.add_block(block, Mode::Strict).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(l.height(), 2);
        assert_eq!(l.balance(a.address()), 200);
    }

    #[test]
    fn range_is_half_open_and_clipped() {
        let l = ledger();
        l.mine_genesis(KeyPair::generate().address()).unwrap();
        assert_eq!(l.blocks_in_range(0, 1).len(), 1);
        assert!(l.blocks_in_range(1, 1).is_empty());
        assert_eq!(l.blocks_in_range(0, 10).len(), 1);
        assert!(l.block_at(1).is_none());
    }
}
