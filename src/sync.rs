use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::peers::PeerAddr;
use crate::types::Block;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Peer answered with status {0}")]
    UnexpectedStatus(u16),
    #[error("Invalid chain payload: {0}")]
    InvalidPayload(String),
    #[error("Reported length {reported} does not match {actual} received blocks")]
    LengthMismatch { reported: u64, actual: usize },
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("No chain source configured")]
    Unavailable,
}

/// A node's full chain together with its advertised length.
///
/// This is the body of `GET /chain` and what peers are asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len() as u64;
        Self { chain, length }
    }
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch a peer's current chain.
    ///
    /// Ordinary network failures come back as `Err`; the caller skips the
    /// peer and carries on.
    async fn fetch_chain(&self, peer: &PeerAddr) -> Result<ChainSnapshot, SyncError>;
}

/// Fetches chains from peers over HTTP (`GET http://host:port/chain`).
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    client: reqwest::Client,
}

impl HttpChainSource {
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn fetch_chain(&self, peer: &PeerAddr) -> Result<ChainSnapshot, SyncError> {
        let url = format!("{}/chain", peer.base_url());
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::ConnectionTimeout
            } else {
                SyncError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus(status.as_u16()));
        }

        let snapshot: ChainSnapshot = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;

        if snapshot.length != snapshot.chain.len() as u64 {
            return Err(SyncError::LengthMismatch {
                reported: snapshot.length,
                actual: snapshot.chain.len(),
            });
        }
        Ok(snapshot)
    }
}

/// Chain source for nodes that never talk to peers.
#[derive(Debug, Clone)]
pub struct NoopSync;

#[async_trait]
impl ChainSource for NoopSync {
    async fn fetch_chain(&self, _peer: &PeerAddr) -> Result<ChainSnapshot, SyncError> {
        Err(SyncError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_length_follows_chain() {
        let snapshot = ChainSnapshot::new(crate::ledger::Ledger::new().chain().to_vec());
        assert_eq!(snapshot.length, 1);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["length"], 1);
        assert_eq!(json["chain"][0]["index"], 1);
    }

    #[test]
    fn test_wire_format_preserves_digests() {
        // Sub-microsecond fractions around present-day Unix time.
        let blocks: Vec<Block> = (0..20_000u64)
            .map(|i| Block {
                index: i + 1,
                timestamp: 1_760_000_000.0 + i as f64 * 0.000_113_7 + (i % 7) as f64 * 1e-7,
                transactions: Vec::new(),
                proof: i,
                previous_hash: "1".to_string(),
            })
            .collect();
        let snapshot = ChainSnapshot::new(blocks);

        let wire = serde_json::to_string(&snapshot).unwrap();
        let decoded: ChainSnapshot = serde_json::from_str(&wire).unwrap();
        for (sent, received) in snapshot.chain.iter().zip(&decoded.chain) {
            assert_eq!(sent.timestamp.to_bits(), received.timestamp.to_bits());
            assert_eq!(sent.digest().unwrap(), received.digest().unwrap());
        }
    }

    #[test]
    fn test_mined_chain_survives_wire_format() {
        let pow = crate::proof::ProofOfWork::with_difficulty(1);
        let mut ledger = crate::ledger::Ledger::new();
        while ledger.len() < 50 {
            let proof = pow.find_proof(ledger.last_block().unwrap().proof);
            ledger.queue_transaction("alice", "bob", ledger.len() as u64);
            ledger.commit_block(proof, None).unwrap();
        }

        let wire = serde_json::to_vec(&ChainSnapshot::new(ledger.chain().to_vec())).unwrap();
        let decoded: ChainSnapshot = serde_json::from_slice(&wire).unwrap();
        assert_eq!(decoded.chain, ledger.chain());
        assert!(crate::consensus::ConsensusResolver::new(pow).is_valid_chain(&decoded.chain));
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_an_error_not_a_panic() {
        let source = HttpChainSource::new(Duration::from_millis(200)).unwrap();
        // Port 9 on loopback is the discard port and is almost never served.
        let peer = PeerAddr::parse("127.0.0.1:9").unwrap();
        assert!(source.fetch_chain(&peer).await.is_err());
    }

    #[tokio::test]
    async fn test_noop_sync_never_yields_a_chain() {
        let peer = PeerAddr::parse("127.0.0.1:5000").unwrap();
        assert!(matches!(
            NoopSync.fetch_chain(&peer).await,
            Err(SyncError::Unavailable)
        ));
    }
}
