use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Mutex;

use super::client::PeerClient;
use crate::blockchain::Block;
use crate::error::PeerError;
use crate::transaction::Transaction;

/// Flat set of known peers, never including ourselves.
#[derive(Debug)]
pub struct PeerSet {
    self_url: String,
    peers: Mutex<HashSet<String>>,
}

impl PeerSet {
    pub fn new(self_url: impl Into<String>) -> Self {
        Self {
            self_url: self_url.into(),
            peers: Mutex::new(HashSet::new()),
        }
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Add a peer; returns `false` for ourselves, blanks and known peers.
    pub fn add(&self, peer: &str) -> bool {
        let peer = peer.trim();
        if peer.is_empty() || peer == self.self_url {
            return false;
        }
        let added = self
            .peers
            .lock()
            .expect("mutex poisoned")
            .insert(peer.to_string());
        if added {
            info!("peer added: {peer}");
        }
        added
    }

    /// Add every peer in `peers`; returns how many were new.
    pub fn merge<I, S>(&self, peers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        peers.into_iter().filter(|p| self.add(p.as_ref())).count()
    }

    pub fn remove(&self, peer: &str) -> bool {
        self.peers.lock().expect("mutex poisoned").remove(peer)
    }

    /// Stable copy to iterate over while the set may change.
    pub fn snapshot(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .peers
            .lock()
            .expect("mutex poisoned")
            .iter()
            .cloned()
            .collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `block` to every known peer. Returns how many accepted it.
    pub async fn broadcast_block<C: PeerClient>(&self, client: &C, block: &Block) -> usize {
        let mut accepted = 0;
        let mut gone = Vec::new();
        for peer in self.snapshot() {
            match client.post_block(&peer, block).await {
                Ok(ack) if ack.success => accepted += 1,
                Ok(ack) => debug!("{peer} declined block #{}: {:?}", block.index, ack.reason),
                Err(e) => self.note_failure(peer, e, &mut gone),
            }
        }
        self.drop_all(gone);
        accepted
    }

    /// Send `tx` to every known peer. Returns how many accepted it.
    pub async fn broadcast_transaction<C: PeerClient>(&self, client: &C, tx: &Transaction) -> usize {
        let mut accepted = 0;
        let mut gone = Vec::new();
        for peer in self.snapshot() {
            match client.post_transaction(&peer, tx).await {
                Ok(ack) if ack.success => accepted += 1,
                Ok(ack) => debug!("{peer} declined tx {}: {:?}", tx.hash(), ack.reason),
                Err(e) => self.note_failure(peer, e, &mut gone),
            }
        }
        self.drop_all(gone);
        accepted
    }

    /// Ask every known peer for its peers and merge the answers.
    pub async fn discover<C: PeerClient>(&self, client: &C) -> usize {
        let mut found = Vec::new();
        let mut gone = Vec::new();
        for peer in self.snapshot() {
            match client.peers(&peer).await {
                Ok(list) => found.extend(list),
                Err(e) => self.note_failure(peer, e, &mut gone),
            }
        }
        self.drop_all(gone);
        self.merge(found)
    }

    fn note_failure(&self, peer: String, err: PeerError, gone: &mut Vec<String>) {
        match err {
            PeerError::Unreachable(_) => gone.push(peer),
            other => warn!("{other}"),
        }
    }

    fn drop_all(&self, gone: Vec<String>) {
        for peer in gone {
            if self.remove(&peer) {
                warn!("peer {peer} unreachable, dropped");
            }
        }
    }
}
