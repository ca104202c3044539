use serde::Serialize;
use std::sync::Arc;

use crate::ledger::Ledger;
use crate::network::{HttpPeerClient, PeerSet};

/// Shared application state: the ledger service plus what is needed to
/// gossip accepted items onward.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerSet>,
    pub client: HttpPeerClient,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, peers: Arc<PeerSet>, client: HttpPeerClient) -> Self {
        Self {
            ledger,
            peers,
            client,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub height: u64,
    pub peers: usize,
}

#[derive(Serialize)]
pub struct NewWalletResponse {
    pub private_key: String,
    pub address: String,
}
