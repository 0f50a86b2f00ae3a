use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::consensus::{ConsensusResolver, Resolution};
use crate::ledger::{Ledger, LedgerError};
use crate::peers::{PeerAddr, PeerError, PeerRegistry};
use crate::proof::ProofOfWork;
use crate::sync::{ChainSnapshot, ChainSource, HttpChainSource, SyncError};
use crate::types::Block;

/// Sender recorded on mining reward transactions.
pub const REWARD_SENDER: &str = "0";

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Peer error: {0}")]
    PeerError(#[from] PeerError),
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Mining worker failed: {0}")]
    MiningWorker(#[from] tokio::task::JoinError),
}

/// Everything a node owns, shared by handle with every request handler.
///
/// The ledger sits behind a single writer lock: mining commits and consensus
/// replacements never interleave.
#[derive(Clone)]
pub struct Runtime {
    ledger: Arc<RwLock<Ledger>>,
    peers: Arc<RwLock<PeerRegistry>>,
    resolver: ConsensusResolver,
    source: Arc<dyn ChainSource>,
    node_id: String,
    mining_reward: u64,
}

impl Runtime {
    pub fn new(pow: ProofOfWork, source: Arc<dyn ChainSource>, mining_reward: u64) -> Self {
        Runtime {
            ledger: Arc::new(RwLock::new(Ledger::new())),
            peers: Arc::new(RwLock::new(PeerRegistry::new())),
            resolver: ConsensusResolver::new(pow),
            source,
            node_id: generate_node_id(),
            mining_reward,
        }
    }

    /// Build a node talking to peers over HTTP, with the configured peers
    /// already registered.
    pub fn from_config(config: &NodeConfig) -> Result<Self, RuntimeError> {
        let source = HttpChainSource::new(Duration::from_millis(config.peer_timeout_ms))?;
        let mut registry = PeerRegistry::new();
        registry.register_all(&config.peers)?;

        let mut runtime = Runtime::new(config.proof_of_work(), Arc::new(source), config.mining_reward);
        runtime.peers = Arc::new(RwLock::new(registry));
        info!(node_id = %runtime.node_id, difficulty = config.difficulty, "node initialised");
        Ok(runtime)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        self.resolver.proof_of_work()
    }

    /// Solve the puzzle for the current tip and seal a new block.
    ///
    /// The search runs on a blocking worker without holding the ledger lock.
    /// If the tip changed in the meantime the search starts over.
    pub async fn mine(&self) -> Result<Block, RuntimeError> {
        let pow = *self.resolver.proof_of_work();
        loop {
            let last_block = self.ledger.read().await.last_block()?.clone();
            let last_proof = last_block.proof;
            let proof = tokio::task::spawn_blocking(move || pow.find_proof(last_proof)).await?;

            let mut ledger = self.ledger.write().await;
            if ledger.last_block()? != &last_block {
                debug!(index = last_block.index, "tip moved while mining, restarting");
                continue;
            }

            let previous_hash = Ledger::digest_of(&last_block)?;
            ledger.queue_transaction(REWARD_SENDER, self.node_id.as_str(), self.mining_reward);
            let block = ledger.commit_block(proof, Some(previous_hash))?;
            info!(index = block.index, proof = block.proof, txs = block.transactions.len(), "block forged");
            return Ok(block);
        }
    }

    /// Queue a transaction; returns the index of the block it should land in.
    pub async fn submit_transaction(&self, sender: &str, recipient: &str, amount: u64) -> u64 {
        let index = self
            .ledger
            .write()
            .await
            .queue_transaction(sender, recipient, amount);
        debug!(sender, recipient, amount, index, "transaction queued");
        index
    }

    pub async fn chain(&self) -> ChainSnapshot {
        ChainSnapshot::new(self.ledger.read().await.chain().to_vec())
    }

    pub async fn pending_count(&self) -> usize {
        self.ledger.read().await.pending_transactions().len()
    }

    /// Register peers in order. On a malformed address the earlier ones stay
    /// registered and the error is returned.
    pub async fn register_peers<A: AsRef<str>>(&self, addresses: &[A]) -> Result<Vec<PeerAddr>, RuntimeError> {
        let mut peers = self.peers.write().await;
        let added = peers.register_all(addresses)?;
        info!(added, total = peers.len(), "peers registered");
        Ok(peers.members())
    }

    pub async fn peers(&self) -> Vec<PeerAddr> {
        self.peers.read().await.members()
    }

    /// Run one consensus round against every registered peer.
    ///
    /// Peer chains are fetched without holding the ledger lock. The
    /// strictly-longer rule is then applied under the write lock against the
    /// chain as it stands at that moment.
    pub async fn resolve(&self) -> Result<(Resolution, ChainSnapshot), RuntimeError> {
        let members = self.peers().await;
        let candidates = self
            .resolver
            .fetch_candidates(&members, self.source.as_ref())
            .await;

        let mut ledger = self.ledger.write().await;
        let resolution = self.resolver.adopt_best(&mut ledger, candidates)?;
        info!(peers = members.len(), ?resolution, length = ledger.len(), "consensus round finished");
        Ok((resolution, ChainSnapshot::new(ledger.chain().to_vec())))
    }
}

fn generate_node_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
