use log::debug;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::blockchain::Block;
use crate::config::ChainConfig;
use crate::error::PeerError;
use crate::transaction::Transaction;

/// Body of `POST /peers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub url: String,
}

/// Reply of `POST /block` and `POST /transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Ack {
    pub fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn declined(reason: impl ToString) -> Self {
        Self {
            success: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// What the node needs from a remote peer. `peer` is its `host:port`.
pub trait PeerClient: Send + Sync {
    fn height(&self, peer: &str) -> impl Future<Output = Result<u64, PeerError>> + Send;

    fn block_at(&self, peer: &str, index: u64)
    -> impl Future<Output = Result<Block, PeerError>> + Send;

    /// Blocks with `start <= index < end`.
    fn blocks_in_range(
        &self,
        peer: &str,
        start: u64,
        end: u64,
    ) -> impl Future<Output = Result<Vec<Block>, PeerError>> + Send;

    fn config(&self, peer: &str) -> impl Future<Output = Result<ChainConfig, PeerError>> + Send;

    fn peers(&self, peer: &str) -> impl Future<Output = Result<Vec<String>, PeerError>> + Send;

    /// Tell `peer` that `self_url` exists.
    fn announce(&self, peer: &str, self_url: &str)
    -> impl Future<Output = Result<(), PeerError>> + Send;

    fn post_block(&self, peer: &str, block: &Block)
    -> impl Future<Output = Result<Ack, PeerError>> + Send;

    fn post_transaction(
        &self,
        peer: &str,
        tx: &Transaction,
    ) -> impl Future<Output = Result<Ack, PeerError>> + Send;
}

/// JSON-over-HTTP client for other nodes' REST surface.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    http: Client,
}

impl HttpPeerClient {
    /// Every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PeerError::Protocol {
                peer: "-".into(),
                reason: format!("HTTP client error: {e}"),
            })?;
        Ok(Self { http })
    }

    fn url(peer: &str, path: &str) -> String {
        if peer.starts_with("http://") || peer.starts_with("https://") {
            format!("{}{path}", peer.trim_end_matches('/'))
        } else {
            format!("http://{peer}{path}")
        }
    }

    async fn get<T: DeserializeOwned>(&self, peer: &str, path: &str) -> Result<T, PeerError> {
        let url = Self::url(peer, path);
        debug!("GET {url}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(peer, e))?;
        decode(peer, resp).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
        body: &B,
    ) -> Result<T, PeerError> {
        let url = Self::url(peer, path);
        debug!("POST {url}");
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(peer, e))?;
        decode(peer, resp).await
    }
}

/// Connection refusals and timeouts mean the peer is gone; anything else
/// is a bad answer.
fn transport_error(peer: &str, e: reqwest::Error) -> PeerError {
    if e.is_connect() || e.is_timeout() {
        PeerError::Unreachable(peer.to_string())
    } else {
        PeerError::Protocol {
            peer: peer.to_string(),
            reason: e.to_string(),
        }
    }
}

async fn decode<T: DeserializeOwned>(peer: &str, resp: Response) -> Result<T, PeerError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(PeerError::Protocol {
            peer: peer.to_string(),
            reason: format!("HTTP {status}"),
        });
    }
    resp.json::<T>().await.map_err(|e| transport_error(peer, e))
}

impl PeerClient for HttpPeerClient {
    async fn height(&self, peer: &str) -> Result<u64, PeerError> {
        self.get(peer, "/height").await
    }

    async fn block_at(&self, peer: &str, index: u64) -> Result<Block, PeerError> {
        self.get(peer, &format!("/blocks/{index}")).await
    }

    async fn blocks_in_range(
        &self,
        peer: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Block>, PeerError> {
        self.get(peer, &format!("/blockrange/{start}/{end}")).await
    }

    async fn config(&self, peer: &str) -> Result<ChainConfig, PeerError> {
        self.get(peer, "/config").await
    }

    async fn peers(&self, peer: &str) -> Result<Vec<String>, PeerError> {
        self.get(peer, "/peers").await
    }

    async fn announce(&self, peer: &str, self_url: &str) -> Result<(), PeerError> {
        let body = PeerAnnouncement {
            url: self_url.to_string(),
        };
        let _: Ack = self.post(peer, "/peers", &body).await?;
        Ok(())
    }

    async fn post_block(&self, peer: &str, block: &Block) -> Result<Ack, PeerError> {
        self.post(peer, "/block", block).await
    }

    async fn post_transaction(&self, peer: &str, tx: &Transaction) -> Result<Ack, PeerError> {
        self.post(peer, "/transaction", tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_accept_bare_and_schemed_peers() {
        assert_eq!(
            HttpPeerClient::url("127.0.0.1:8000", "/height"),
            "http://127.0.0.1:8000/height"
        );
        assert_eq!(
            HttpPeerClient::url("https://node.example/", "/peers"),
            "https://node.example/peers"
        );
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let client = HttpPeerClient::new(Duration::from_millis(500)).unwrap();
        // port 9 (discard) is practically never listening on loopback
        let err = client.height("127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, PeerError::Unreachable(_)));
    }

    #[test]
    fn ack_reason_is_optional() {
        let ack: Ack = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(ack.success);
        assert!(ack.reason.is_none());
    }
}
