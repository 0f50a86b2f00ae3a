use thiserror::Error;
use tracing::debug;

use crate::types::{
    current_timestamp, Block, DigestError, Transaction, GENESIS_PREVIOUS_HASH, GENESIS_PROOF,
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Digest error: {0}")]
    DigestError(#[from] DigestError),
    #[error("Chain is empty")]
    EmptyChain,
    #[error("Refusing to replace the chain with an empty one")]
    EmptyReplacement,
}

/// The chain of sealed blocks plus the pool of transactions waiting for the
/// next one.
///
/// Only [`commit_block`](Ledger::commit_block) and a validated consensus
/// replacement ever change the chain.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Ledger {
    /// Build a ledger holding only the genesis block.
    pub fn new() -> Self {
        let mut ledger = Ledger {
            chain: Vec::new(),
            pending: Vec::new(),
        };
        ledger.create_genesis();
        ledger
    }

    fn create_genesis(&mut self) {
        let genesis_block = Block {
            index: 1,
            timestamp: current_timestamp(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        };
        self.pending.clear();
        self.chain.push(genesis_block);
    }

    /// Add a transaction to the pool.
    ///
    /// Returns the index of the block the transaction is expected to land in.
    pub fn queue_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
    ) -> u64 {
        self.pending.push(Transaction::new(sender, recipient, amount));
        self.chain.len() as u64 + 1
    }

    /// Seal the pool into a new block and append it.
    ///
    /// `previous_hash` defaults to the digest of the current last block. The
    /// proof is taken as given; callers are expected to have checked it.
    pub fn commit_block(
        &mut self,
        proof: u64,
        previous_hash: Option<String>,
    ) -> Result<Block, LedgerError> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block()?.digest()?,
        };

        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: current_timestamp(),
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        self.chain.push(block.clone());
        debug!(index = block.index, txs = block.transactions.len(), "block committed");
        Ok(block)
    }

    /// Content digest of `block`.
    pub fn digest_of(block: &Block) -> Result<String, LedgerError> {
        Ok(block.digest()?)
    }

    pub fn last_block(&self) -> Result<&Block, LedgerError> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    /// Swap in a whole new chain. The pool is left as is.
    pub(crate) fn replace_chain(&mut self, chain: Vec<Block>) -> Result<(), LedgerError> {
        if chain.is_empty() {
            return Err(LedgerError::EmptyReplacement);
        }
        self.chain = chain;
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ledger_holds_genesis() {
        let ledger = Ledger::new();
        assert_eq!(ledger.len(), 1);
        let genesis = &ledger.chain()[0];
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(genesis.transactions.is_empty());
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_queue_transaction_reports_next_index() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.queue_transaction("a", "b", 1), 2);
        assert_eq!(ledger.queue_transaction("b", "c", 2), 2);
        assert_eq!(ledger.pending_transactions().len(), 2);

        ledger.commit_block(1, None).unwrap();
        assert_eq!(ledger.queue_transaction("c", "a", 3), 3);
    }

    #[test]
    fn test_commit_moves_pool_into_block() {
        let mut ledger = Ledger::new();
        ledger.queue_transaction("alice", "bob", 5);
        ledger.queue_transaction("bob", "carol", 2);

        let block = ledger.commit_block(42, None).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.proof, 42);
        assert_eq!(
            block.transactions,
            vec![
                Transaction::new("alice", "bob", 5),
                Transaction::new("bob", "carol", 2),
            ]
        );
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.last_block().unwrap(), &block);

        // Nothing is carried into the following block.
        let next = ledger.commit_block(43, None).unwrap();
        assert!(next.transactions.is_empty());
    }

    #[test]
    fn test_commit_links_to_previous_digest() {
        let mut ledger = Ledger::new();
        for proof in 0..5 {
            ledger.queue_transaction("x", "y", proof);
            ledger.commit_block(proof, None).unwrap();
        }
        let chain = ledger.chain();
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, Ledger::digest_of(&pair[0]).unwrap());
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
    }

    #[test]
    fn test_commit_honours_previous_hash_override() {
        let mut ledger = Ledger::new();
        let block = ledger.commit_block(7, Some("feed".to_string())).unwrap();
        assert_eq!(block.previous_hash, "feed");
    }

    #[test]
    fn test_replace_chain_rejects_empty() {
        let mut ledger = Ledger::new();
        assert!(matches!(
            ledger.replace_chain(Vec::new()),
            Err(LedgerError::EmptyReplacement)
        ));
        assert_eq!(ledger.len(), 1);
    }
}
