use log::{debug, info, warn};

use super::state::{self, LedgerState, Projection};
use super::validation::{self, LedgerView, Mode};
use super::Block;
use crate::config::ChainConfig;
use crate::error::{LedgerError, Rejection};
use crate::storage::ChainStore;
use crate::transaction::{PendingPool, Transaction};
use crate::wallet::ADDRESS_HEX_LEN;

/// Chain engine: committed blocks, derived account state, pending pool
/// and the consensus parameters that evolve with height.
///
/// `add_block` is the only way a block gets in.
pub struct Blockchain {
    config: ChainConfig,
    blocks: Vec<Block>,
    state: LedgerState,
    difficulty: u32,
    reward: u64,
    pending: PendingPool,
    store: Box<dyn ChainStore>,
}

impl Blockchain {
    /// An empty chain (no genesis yet) backed by `store`.
    pub fn new(config: ChainConfig, store: Box<dyn ChainStore>) -> Self {
        Self {
            difficulty: config.initial_difficulty.max(1),
            reward: config.initial_reward,
            config,
            blocks: Vec::new(),
            state: LedgerState::new(),
            pending: PendingPool::new(),
            store,
        }
    }

    /// Load whatever `store` holds, replaying it so difficulty and reward
    /// are recomputed from height. An empty store yields an empty chain
    /// using `config`.
    pub fn open(config: ChainConfig, store: Box<dyn ChainStore>) -> Result<Self, LedgerError> {
        let Some((stored_config, blocks)) = store.load()? else {
            debug!("store is empty, starting without a chain");
            return Ok(Self::new(config, store));
        };

        let mut chain = Self::new(stored_config, store);
        let mut blocks = blocks.into_iter();
        let Some(genesis) = blocks.next() else {
            return Ok(chain);
        };
        validation::verify_genesis_block(&genesis, &chain.config)?;
        chain.push(genesis);
        for block in blocks {
            chain.commit(block, Mode::Syncing, false)?;
        }
        info!(
            "loaded chain: height={} difficulty={} reward={}",
            chain.height(),
            chain.difficulty,
            chain.reward
        );
        Ok(chain)
    }

    /// Mine the genesis block paying the initial reward to `address`.
    pub fn mine_genesis(&mut self, address: &str) -> Result<&Block, LedgerError> {
        if !self.blocks.is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }
        if address.len() != ADDRESS_HEX_LEN {
            return Err(Rejection::BadAddress(address.len()).into());
        }
        let mut genesis = Block::genesis(address, self.config.initial_reward);
        genesis.mine(self.config.initial_difficulty);
        self.init_with_genesis(genesis)
    }

    /// Start from a peer's genesis block and consensus parameters.
    pub fn adopt_genesis(
        &mut self,
        genesis: Block,
        config: ChainConfig,
    ) -> Result<&Block, LedgerError> {
        if !self.blocks.is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }
        validation::verify_genesis_block(&genesis, &config)?;
        self.config = config;
        self.difficulty = config.initial_difficulty.max(1);
        self.reward = config.initial_reward;
        self.init_with_genesis(genesis)
    }

    fn init_with_genesis(&mut self, genesis: Block) -> Result<&Block, LedgerError> {
        self.store.write_config(&self.config)?;
        self.store.append_block(&genesis)?;
        info!("genesis block {} committed", genesis.hash());
        self.push(genesis);
        self.last_block().ok_or(LedgerError::Empty)
    }

    fn push(&mut self, block: Block) {
        self.state.apply_block(&block);
        self.blocks.push(block);
    }

    /// Admit a transaction into the pending pool. Returns whether it was new;
    /// re-submitting a known transaction is a no-op success.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<bool, Rejection> {
        self.verify_transaction(&tx)?;
        let hash = tx.hash();
        let added = self.pending.insert(tx)?;
        if added {
            debug!("pending += {hash} (size {})", self.pending.len());
        }
        Ok(added)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<(), Rejection> {
        validation::verify_transaction(tx, self)
    }

    pub fn verify_block(&self, block: &Block, mode: Mode) -> Result<(), Rejection> {
        validation::verify_block(block, self, mode)
    }

    pub fn verify_genesis_block(&self, block: &Block) -> Result<(), Rejection> {
        validation::verify_genesis_block(block, &self.config)
    }

    /// Validate and commit `block` on top of the current tip.
    ///
    /// Either the whole block is committed (store row, account state,
    /// pending-pool eviction, retargeting) or nothing changes.
    pub fn add_block(&mut self, block: Block, mode: Mode) -> Result<(), LedgerError> {
        self.commit(block, mode, true)
    }

    fn commit(&mut self, block: Block, mode: Mode, persist: bool) -> Result<(), LedgerError> {
        if self.blocks.is_empty() {
            return Err(LedgerError::Empty);
        }
        if let Err(reason) = self
            .verify_block(&block, mode)
            .and_then(|_| self.verify_block_transactions(&block))
        {
            warn!("block #{} rejected: {reason}", block.index);
            return Err(reason.into());
        }

        if persist {
            self.store.append_block(&block)?;
        }

        let evicted = self.pending.evict(&block.data);
        let hash = block.hash();
        let txs = block.data.len();
        self.push(block);

        // drop pending transactions whose nonce is now spent
        let state = &self.state;
        self.pending.retain(|tx| tx.nonce >= state.nonce(&tx.from));

        self.retarget();
        self.halve_reward();
        info!(
            "block #{} committed (hash={hash}, txs={txs}, evicted={evicted}, difficulty={}, reward={})",
            self.height() - 1,
            self.difficulty,
            self.reward
        );
        Ok(())
    }

    /// Re-check every user transaction against committed state, then against
    /// the same sender's transactions before it in the same block.
    pub fn verify_block_transactions(&self, block: &Block) -> Result<(), Rejection> {
        let mut projection = Projection::new(&self.state);
        for tx in block.user_transactions() {
            self.verify_transaction(tx)?;
            projection.admit(tx)?;
        }
        Ok(())
    }

    /// Every `difficulty_adjust` blocks, raise difficulty if the span was
    /// mined faster than `time_target` per block, else lower it (floor 1).
    fn retarget(&mut self) {
        let height = self.height();
        let span = self.config.difficulty_adjust.max(1);
        if height == 0 || height % span != 0 {
            return;
        }
        let newest = self.blocks[(height - 1) as usize].timestamp;
        let oldest = self.blocks[(height - span) as usize].timestamp;
        let elapsed = i128::from(newest) - i128::from(oldest);
        let budget = i128::from(self.config.time_target) * 1000 * i128::from(span);

        let before = self.difficulty;
        if elapsed < budget {
            self.difficulty += 1;
        } else {
            self.difficulty = self.difficulty.saturating_sub(1).max(1);
        }
        debug!(
            "retarget at height {height}: elapsed={elapsed}ms budget={budget}ms difficulty {before} -> {}",
            self.difficulty
        );
    }

    fn halve_reward(&mut self) {
        let height = self.height();
        if height > 0 && height % self.config.reward_halving.max(1) == 0 {
            self.reward /= 2;
            debug!("reward halved to {} at height {height}", self.reward);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Blocks with `start <= index < end`, clipped to the chain.
    pub fn blocks_in_range(&self, start: u64, end: u64) -> &[Block] {
        let len = self.blocks.len();
        let end = usize::try_from(end).unwrap_or(len).min(len);
        let start = usize::try_from(start).unwrap_or(len).min(end);
        &self.blocks[start..end]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn nonce(&self, address: &str) -> u64 {
        self.state.nonce(address)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn pending(&self) -> &PendingPool {
        &self.pending
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

impl LedgerView for Blockchain {
    fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn tip_hash(&self) -> Option<String> {
        self.blocks.last().map(Block::hash)
    }

    fn balance(&self, address: &str) -> u64 {
        self.state.balance(address)
    }

    fn difficulty(&self) -> u32 {
        self.difficulty
    }

    fn reward(&self) -> u64 {
        self.reward
    }

    fn lowest_acceptable_timestamp(&self) -> i64 {
        state::median_timestamp(&self.blocks)
    }
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("height", &self.blocks.len())
            .field("difficulty", &self.difficulty)
            .field("reward", &self.reward)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::miner;
    use crate::blockchain::state::balance_by_scan;
    use crate::storage::MemoryStore;
    use crate::wallet::KeyPair;

    fn config() -> ChainConfig {
        ChainConfig {
            reward_halving: 1_000,
            time_target: 0,
            difficulty_adjust: 1_000,
            initial_reward: 100,
            initial_difficulty: 1,
        }
    }

    fn chain_with(config: ChainConfig, genesis_to: &str) -> Blockchain {
        let mut chain = Blockchain::new(config, Box::new(MemoryStore::new()));
        chain.mine_genesis(genesis_to).unwrap();
        chain
    }

    fn next_block(chain: &Blockchain, miner_addr: &str) -> Block {
        let mut block = miner::candidate_block(chain, miner_addr, 1, 0).unwrap();
        block.mine(chain.difficulty());
        block
    }

    #[test]
    fn genesis_pays_initial_reward() {
        let keys = KeyPair::generate();
        let chain = chain_with(config(), keys.address());
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.balance(keys.address()), 100);
        assert!(matches!(
            chain_with(config(), keys.address()).mine_genesis(keys.address()),
            Err(LedgerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn genesis_needs_a_real_address() {
        let mut chain = Blockchain::new(config(), Box::new(MemoryStore::new()));
        assert!(matches!(
            chain.mine_genesis("miner"),
            Err(LedgerError::Rejected(Rejection::BadAddress(5)))
        ));
        assert!(chain.is_empty());
    }

    #[test]
    fn empty_chain_refuses_blocks() {
        let mut chain = Blockchain::new(config(), Box::new(MemoryStore::new()));
        let block = Block::genesis(&"a".repeat(96), 100);
        assert!(matches!(
            chain.add_block(block, Mode::Syncing),
            Err(LedgerError::Empty)
        ));
    }

    #[test]
    fn rejected_block_leaves_no_trace() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let mut chain = chain_with(config(), a.address());

        // valid nonce 0, then a duplicate nonce 0 smuggled into the same block
        let good = a.transaction(b.address(), 10, 1, 0).unwrap();
        let replay = a.transaction(b.address(), 20, 1, 0).unwrap();
        chain.add_transaction(good.clone()).unwrap();

        let cb = Transaction::coinbase(b.address(), 102);
        let tip = chain.last_block().unwrap().hash();
        let mut bad = Block::new(1, tip, vec![cb, good, replay], chain.lowest_acceptable_timestamp() + 1);
        bad.mine(chain.difficulty());

        assert!(matches!(
            chain.add_block(bad.clone(), Mode::Strict),
            Err(LedgerError::Rejected(Rejection::InvalidNonce { expected: 1, got: 0 }))
        ));
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.balance(a.address()), 100);
        assert_eq!(chain.pending().len(), 1);

        // replaying the same invalid block is rejected again, state unchanged
        assert!(chain.add_block(bad, Mode::Strict).is_err());
        assert_eq!(chain.balance(a.address()), balance_by_scan(chain.blocks(), a.address()));
    }

    #[test]
    fn coins_received_in_a_block_cannot_be_spent_in_it() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let c = KeyPair::generate();
        let mut chain = chain_with(config(), a.address());

        let to_b = a.transaction(b.address(), 50, 1, 0).unwrap();
        let from_b = b.transaction(c.address(), 40, 1, 0).unwrap();
        assert_eq!(
            chain.verify_transaction(&from_b),
            Err(Rejection::InsufficientBalance { have: 0, need: 41 })
        );

        let cb = Transaction::coinbase(c.address(), 102);
        let tip = chain.last_block().unwrap().hash();
        let mut block = Block::new(
            1,
            tip,
            vec![cb, to_b, from_b],
            chain.lowest_acceptable_timestamp() + 1,
        );
        block.mine(chain.difficulty());

        assert!(matches!(
            chain.add_block(block, Mode::Strict),
            Err(LedgerError::Rejected(Rejection::InsufficientBalance { have: 0, need: 41 }))
        ));
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.balance(b.address()), 0);
        assert_eq!(chain.balance(c.address()), 0);
    }

    #[test]
    fn extreme_synced_timestamps_do_not_panic() {
        let m = KeyPair::generate();
        let mut chain = chain_with(config(), m.address());

        let mut ancient = next_block(&chain, m.address());
        ancient.timestamp = i64::MIN;
        ancient.mine(chain.difficulty());
        chain.add_block(ancient, Mode::Syncing).unwrap();

        // the median is far in the past, so a fresh block still lands
        let block = next_block(&chain, m.address());
        chain.add_block(block, Mode::Strict).unwrap();
        assert_eq!(chain.height(), 3);

        // a majority of the last blocks at the end of time pins the median there
        for _ in 0..4 {
            let mut last = next_block(&chain, m.address());
            last.timestamp = i64::MAX;
            last.mine(chain.difficulty());
            chain.add_block(last, Mode::Syncing).unwrap();
        }
        assert_eq!(chain.lowest_acceptable_timestamp(), i64::MAX);

        // nothing can follow in strict mode, but assembling and checking is safe
        let stuck = next_block(&chain, m.address());
        assert_eq!(stuck.timestamp, i64::MAX);
        assert!(matches!(
            chain.add_block(stuck, Mode::Strict),
            Err(LedgerError::Rejected(Rejection::TimestampTooOld { .. }))
        ));
    }

    #[test]
    fn commit_evicts_included_and_stale_pending() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let mut chain = chain_with(config(), a.address());

        let first = a.transaction(b.address(), 10, 1, 0).unwrap();
        chain.add_transaction(first).unwrap();
        let block = next_block(&chain, b.address());
        assert_eq!(block.data.len(), 2);

        // a competing nonce-0 transaction becomes stale once the block lands
        let competing = a.transaction(b.address(), 5, 1, 0).unwrap();
        chain.add_transaction(competing).unwrap();
        assert_eq!(chain.pending().len(), 2);

        chain.add_block(block, Mode::Strict).unwrap();
        assert!(chain.pending().is_empty());
        assert_eq!(chain.nonce(a.address()), 1);
        assert_eq!(chain.balance(b.address()), 10 + 101);
    }

    #[test]
    fn duplicate_transaction_admission_is_idempotent() {
        let a = KeyPair::generate();
        let mut chain = chain_with(config(), a.address());
        let tx = a.transaction(KeyPair::generate().address(), 1, 1, 0).unwrap();
        assert_eq!(chain.add_transaction(tx.clone()), Ok(true));
        assert_eq!(chain.add_transaction(tx), Ok(false));
        assert_eq!(chain.pending().len(), 1);
    }

    #[test]
    fn difficulty_rises_when_blocks_come_fast() {
        let cfg = ChainConfig {
            difficulty_adjust: 2,
            time_target: 3_600,
            ..config()
        };
        let miner_keys = KeyPair::generate();
        let mut chain = chain_with(cfg, miner_keys.address());
        assert_eq!(chain.difficulty(), 1);
        let block = next_block(&chain, miner_keys.address());
        chain.add_block(block, Mode::Strict).unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.difficulty(), 2);
    }

    #[test]
    fn difficulty_falls_when_blocks_come_slow_but_not_below_one() {
        let cfg = ChainConfig {
            difficulty_adjust: 2,
            time_target: 1,
            initial_difficulty: 2,
            ..config()
        };
        let miner_keys = KeyPair::generate();
        let mut chain = chain_with(cfg, miner_keys.address());
        let genesis_ts = chain.last_block().unwrap().timestamp;

        // two seconds per block against a one second target
        let mut slow = next_block(&chain, miner_keys.address());
        slow.timestamp = genesis_ts + 2_000;
        slow.mine(chain.difficulty());
        chain.add_block(slow, Mode::Syncing).unwrap();
        assert_eq!(chain.difficulty(), 1);

        for _ in 0..2 {
            let mut slow = next_block(&chain, miner_keys.address());
            slow.timestamp = chain.last_block().unwrap().timestamp + 5_000;
            slow.mine(chain.difficulty());
            chain.add_block(slow, Mode::Syncing).unwrap();
        }
        assert_eq!(chain.height(), 4);
        assert_eq!(chain.difficulty(), 1);
    }

    #[test]
    fn reward_halves_on_schedule() {
        let cfg = ChainConfig {
            reward_halving: 2,
            ..config()
        };
        let m = KeyPair::generate();
        let mut chain = chain_with(cfg, m.address());
        assert_eq!(chain.reward(), 100);
        let block = next_block(&chain, m.address());
        chain.add_block(block, Mode::Strict).unwrap();
        assert_eq!(chain.reward(), 50);
        let block = next_block(&chain, m.address());
        assert_eq!(block.data[0].amount, 50);
        chain.add_block(block, Mode::Strict).unwrap();
        assert_eq!(chain.balance(m.address()), 100 + 100 + 50);
    }

    #[test]
    fn reopen_replays_store() {
        use crate::storage::SledStore;
        let mut path = std::env::temp_dir();
        path.push(format!("pow_ledger_reopen_{}.db", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);

        let cfg = ChainConfig {
            reward_halving: 2,
            ..config()
        };
        let m = KeyPair::generate();
        let tip = {
            let mut chain = Blockchain::open(cfg, Box::new(SledStore::open(&path).unwrap())).unwrap();
            assert!(chain.is_empty());
            chain.mine_genesis(m.address()).unwrap();
            for _ in 0..2 {
                let block = next_block(&chain, m.address());
                chain.add_block(block, Mode::Strict).unwrap();
            }
            chain.tip_hash()
        };

        // a different local config is ignored in favour of the stored row
        let reopened = Blockchain::open(config(), Box::new(SledStore::open(&path).unwrap())).unwrap();
        assert_eq!(reopened.height(), 3);
        assert_eq!(reopened.tip_hash(), tip);
        assert_eq!(reopened.reward(), 50);
        assert_eq!(reopened.config().reward_halving, 2);
        assert_eq!(reopened.balance(m.address()), 250);
        drop(reopened);
        let _ = std::fs::remove_dir_all(&path);
    }
}
