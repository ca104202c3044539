use std::collections::HashMap;

use super::model::Transaction;
use crate::error::Rejection;

/// Upper bound on pending transactions held by a node.
pub const MAX_PENDING: usize = 10_000;

/// Upper bound on pending transactions from a single sender.
pub const MAX_PENDING_PER_SENDER: usize = 100;

/// Validated, not-yet-committed transactions keyed by hash.
///
/// Insertion order is kept so `pending_transactions()` is stable.
#[derive(Debug)]
pub struct PendingPool {
    order: Vec<String>,
    map: HashMap<String, Transaction>,
    per_sender: HashMap<String, usize>,
    max_total: usize,
    max_per_sender: usize,
}

impl Default for PendingPool {
    fn default() -> Self {
        Self::with_limits(MAX_PENDING, MAX_PENDING_PER_SENDER)
    }
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_total: usize, max_per_sender: usize) -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
            per_sender: HashMap::new(),
            max_total,
            max_per_sender,
        }
    }

    /// Insert a transaction. Returns `Ok(false)` if its hash was already
    /// present, `PoolFull` if the pool or the sender's share is at its limit.
    pub fn insert(&mut self, tx: Transaction) -> Result<bool, Rejection> {
        let hash = tx.hash();
        if self.map.contains_key(&hash) {
            return Ok(false);
        }
        if self.map.len() >= self.max_total {
            return Err(Rejection::PoolFull("pending pool"));
        }
        if self.sender_len(&tx.from) >= self.max_per_sender {
            return Err(Rejection::PoolFull("sender quota"));
        }
        *self.per_sender.entry(tx.from.clone()).or_insert(0) += 1;
        self.order.push(hash.clone());
        self.map.insert(hash, tx);
        Ok(true)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.map.contains_key(hash)
    }

    /// Pending transactions from `sender`.
    pub fn sender_len(&self, sender: &str) -> usize {
        self.per_sender.get(sender).copied().unwrap_or(0)
    }

    /// Remove every transaction whose hash matches one in `txs`.
    /// Returns how many were evicted.
    pub fn evict<'a>(&mut self, txs: impl IntoIterator<Item = &'a Transaction>) -> usize {
        let before = self.map.len();
        for tx in txs {
            self.map.remove(&tx.hash());
        }
        self.reindex();
        before - self.map.len()
    }

    /// Keep only transactions for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Transaction) -> bool) {
        self.map.retain(|_, tx| keep(tx));
        self.reindex();
    }

    fn reindex(&mut self) {
        let map = &self.map;
        self.order.retain(|h| map.contains_key(h));
        self.per_sender.clear();
        for tx in self.map.values() {
            *self.per_sender.entry(tx.from.clone()).or_insert(0) += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read-only iterator in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|h| self.map.get(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_from(from: &str, nonce: u64) -> Transaction {
        let mut tx = Transaction::new("to", from, 1, 1, nonce);
        tx.timestamp = 42;
        tx
    }

    fn tx(nonce: u64) -> Transaction {
        tx_from("from", nonce)
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut pool = PendingPool::new();
        assert_eq!(pool.insert(tx(0)), Ok(true));
        assert_eq!(pool.insert(tx(0)), Ok(false));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn evict_removes_by_hash_and_keeps_order() {
        let mut pool = PendingPool::new();
        for nonce in 0..3 {
            pool.insert(tx(nonce)).unwrap();
        }
        assert_eq!(pool.evict([&tx(1), &tx(9)]), 1);
        let nonces: Vec<u64> = pool.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![0, 2]);
        assert!(!pool.contains(&tx(1).hash()));
        assert_eq!(pool.sender_len("from"), 2);
    }

    #[test]
    fn one_sender_cannot_fill_the_pool() {
        let mut pool = PendingPool::with_limits(5, 2);
        pool.insert(tx(0)).unwrap();
        pool.insert(tx(1)).unwrap();
        assert_eq!(pool.insert(tx(2)), Err(Rejection::PoolFull("sender quota")));
        // a known transaction is still an idempotent success
        assert_eq!(pool.insert(tx(1)), Ok(false));

        // eviction frees the sender's quota
        pool.evict([&tx(0)]);
        assert_eq!(pool.insert(tx(2)), Ok(true));
    }

    #[test]
    fn full_pool_refuses_new_transactions() {
        let mut pool = PendingPool::with_limits(3, 2);
        pool.insert(tx_from("a", 0)).unwrap();
        pool.insert(tx_from("b", 0)).unwrap();
        pool.insert(tx_from("c", 0)).unwrap();
        assert_eq!(
            pool.insert(tx_from("d", 0)),
            Err(Rejection::PoolFull("pending pool"))
        );
        pool.retain(|tx| tx.from != "a");
        assert_eq!(pool.insert(tx_from("d", 0)), Ok(true));
        assert_eq!(pool.len(), 3);
    }
}
