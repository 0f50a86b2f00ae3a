//! Longest-valid-chain consensus.
//!
//! A node adopts a peer's chain only when it is strictly longer than every
//! other candidate seen so far and than the local chain, and only after the
//! whole chain has been re-validated locally.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, LedgerError};
use crate::peers::{PeerAddr, PeerRegistry};
use crate::proof::ProofOfWork;
use crate::sync::{ChainSnapshot, ChainSource, SyncError};
use crate::types::Block;

/// Outcome of a resolution round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local chain was replaced by a longer valid peer chain.
    Replaced,
    /// No peer offered a strictly longer valid chain.
    Kept,
}

impl Resolution {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Resolution::Replaced)
    }
}

/// A peer together with what it answered.
pub type Candidate = (PeerAddr, Result<ChainSnapshot, SyncError>);

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusResolver {
    pow: ProofOfWork,
}

impl ConsensusResolver {
    pub fn new(pow: ProofOfWork) -> Self {
        Self { pow }
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Check the linkage and proof of every adjacent pair of blocks.
    ///
    /// The first block is trusted as the root. An empty sequence has no root
    /// and is rejected.
    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        if chain.is_empty() {
            return false;
        }
        for pair in chain.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            match previous.digest() {
                Ok(digest) if digest == block.previous_hash => {}
                _ => {
                    debug!(index = block.index, "previous_hash mismatch");
                    return false;
                }
            }
            if !self.pow.is_valid_proof(previous.proof, block.proof) {
                debug!(index = block.index, "invalid proof");
                return false;
            }
        }
        true
    }

    /// Ask every peer for its chain.
    ///
    /// Requests run concurrently; answers come back in the order of `peers`.
    pub async fn fetch_candidates<S>(&self, peers: &[PeerAddr], source: &S) -> Vec<Candidate>
    where
        S: ChainSource + ?Sized,
    {
        let answers = join_all(peers.iter().map(|peer| source.fetch_chain(peer))).await;
        peers.iter().cloned().zip(answers).collect()
    }

    /// Pick the longest valid chain strictly longer than `local_len`.
    ///
    /// Candidates are scanned in order, so on equal lengths the earliest one
    /// wins. Failed peers, invalid chains and snapshots whose advertised
    /// length disagrees with the blocks they carry are skipped.
    pub fn select_best(&self, local_len: usize, candidates: Vec<Candidate>) -> Option<Vec<Block>> {
        let mut max_length = local_len as u64;
        let mut best = None;

        for (peer, answer) in candidates {
            let snapshot = match answer {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(%peer, error = %e, "skipping peer");
                    continue;
                }
            };
            let length = snapshot.chain.len() as u64;
            if snapshot.length != length {
                warn!(%peer, reported = snapshot.length, actual = length, "peer misreported its chain length");
                continue;
            }
            if length <= max_length {
                continue;
            }
            if !self.is_valid_chain(&snapshot.chain) {
                warn!(%peer, length, "peer offered an invalid chain");
                continue;
            }
            max_length = length;
            best = Some(snapshot.chain);
        }
        best
    }

    /// Replace the ledger's chain with the best candidate, if any beats it.
    pub fn adopt_best(
        &self,
        ledger: &mut Ledger,
        candidates: Vec<Candidate>,
    ) -> Result<Resolution, LedgerError> {
        let local_len = ledger.len();
        match self.select_best(local_len, candidates) {
            Some(chain) => {
                info!(old_length = local_len, new_length = chain.len(), "chain replaced");
                ledger.replace_chain(chain)?;
                Ok(Resolution::Replaced)
            }
            None => Ok(Resolution::Kept),
        }
    }

    /// Fetch every registered peer's chain and adopt the best one.
    pub async fn resolve<S>(
        &self,
        ledger: &mut Ledger,
        registry: &PeerRegistry,
        source: &S,
    ) -> Result<Resolution, LedgerError>
    where
        S: ChainSource + ?Sized,
    {
        let candidates = self.fetch_candidates(&registry.members(), source).await;
        self.adopt_best(ledger, candidates)
    }
}
