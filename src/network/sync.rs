//! Catch-up from a single remote peer.
//!
//! Blocks are replayed through `Ledger::add_block` in syncing mode, strictly
//! in ascending order. The first block that fails halts the sync; nothing is
//! skipped and a diverging chain is never adopted.

use log::{info, warn};

use super::client::PeerClient;
use super::peers::PeerSet;
use crate::blockchain::Mode;
use crate::error::{LedgerError, PeerError, SyncError};
use crate::ledger::Ledger;

/// Blocks fetched per `blockrange` request.
pub const SYNC_CHUNK: u64 = 50;

/// Bring `ledger` up to `peer`'s height. Returns the number of blocks applied
/// (the adopted genesis included).
pub async fn sync_with_peer<C: PeerClient>(
    ledger: &Ledger,
    peers: &PeerSet,
    client: &C,
    peer: &str,
) -> Result<u64, SyncError> {
    let remote_height = client.height(peer).await?;
    if remote_height == 0 {
        return Err(PeerError::Protocol {
            peer: peer.to_string(),
            reason: "peer has no chain".into(),
        }
        .into());
    }

    let mut applied = 0;
    if ledger.is_empty() {
        let genesis = client.block_at(peer, 0).await?;
        let config = client.config(peer).await?;
        match ledger.adopt_genesis(genesis, config) {
            Ok(hash) => info!("adopted genesis {hash} from {peer}"),
            Err(LedgerError::Rejected(reason)) => return Err(SyncError::InvalidGenesis(reason)),
            Err(e) => return Err(e.into()),
        }
        applied += 1;
    } else {
        check_common_tip(ledger, client, peer, remote_height).await?;
    }

    let mut start = ledger.height();
    while start < remote_height {
        let end = remote_height.min(start + SYNC_CHUNK);
        let blocks = client.blocks_in_range(peer, start, end).await?;
        if blocks.is_empty() {
            return Err(PeerError::Protocol {
                peer: peer.to_string(),
                reason: format!("empty block range {start}..{end}"),
            }
            .into());
        }
        for block in blocks {
            let index = block.index;
            ledger
                .add_block(block, Mode::Syncing)
                .map_err(|e| SyncError::BlockRejected {
                    index,
                    reason: e.to_string(),
                })?;
            applied += 1;
        }
        start = ledger.height();
        info!("synced to height {start}/{remote_height} from {peer}");
    }

    join(peers, client, peer).await;
    Ok(applied)
}

/// The remote chain must contain our tip (or, when it is shorter, its tip
/// must be one of our blocks).
async fn check_common_tip<C: PeerClient>(
    ledger: &Ledger,
    client: &C,
    peer: &str,
    remote_height: u64,
) -> Result<(), SyncError> {
    let height = ledger.height().min(remote_height) - 1;
    let local = ledger
        .block_at(height)
        .map(|b| b.hash())
        .unwrap_or_default();
    let remote = client.block_at(peer, height).await?.hash();
    if local != remote {
        warn!("fork with {peer} at height {height}");
        return Err(SyncError::ForkMismatch {
            height,
            local,
            remote,
        });
    }
    Ok(())
}

/// Merge the peer's view of the network and announce ourselves. Failures
/// here do not undo a completed sync.
async fn join<C: PeerClient>(peers: &PeerSet, client: &C, peer: &str) {
    peers.add(peer);
    match client.peers(peer).await {
        Ok(list) => {
            let added = peers.merge(list);
            info!("learned {added} new peers from {peer}");
        }
        Err(e) => warn!("could not fetch peers of {peer}: {e}"),
    }
    if let Err(e) = client.announce(peer, peers.self_url()).await {
        warn!("could not announce to {peer}: {e}");
    }
}
