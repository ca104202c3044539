pub mod client;
pub mod peers;
pub mod sync;

pub use client::{Ack, HttpPeerClient, PeerAnnouncement, PeerClient};
pub use peers::PeerSet;
pub use sync::{SYNC_CHUNK, sync_with_peer};
