//! Core type definitions for the ledger.
//!
//! This module contains the records that make up the chain, blocks and
//! the transactions sealed inside them, together with the canonical
//! content digest used to link each block to its predecessor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// `previous_hash` carried by the genesis block in place of a real digest.
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// `proof` carried by the genesis block.
pub const GENESIS_PROOF: u64 = 100;

/// Errors that can occur while computing a content digest.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("Canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A transfer record waiting in the pool or sealed in a block.
///
/// No balances or signatures are checked; the record is taken as given.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier of the sending party (`"0"` for mining rewards)
    pub sender: String,
    /// Identifier of the receiving party
    pub recipient: String,
    /// Amount transferred
    pub amount: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }
}

/// A block in the chain.
///
/// Blocks are sealed once committed: the transaction list is the exact
/// pool content at mining time and is never touched again.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, starting from 1 (genesis)
    pub index: u64,
    /// Unix time in seconds, with sub-second precision
    pub timestamp: f64,
    /// Transactions sealed into this block
    pub transactions: Vec<Transaction>,
    /// Proof-of-work solution relative to the previous block's proof
    pub proof: u64,
    /// Content digest of the previous block, or the genesis sentinel
    pub previous_hash: String,
}

impl Block {
    /// Compute the content digest of the block.
    ///
    /// The block is converted to a JSON object whose keys are sorted at every
    /// level, serialized compactly and hashed with SHA-256. Two blocks with
    /// equal fields always hash identically, however they were built.
    ///
    /// # Errors
    ///
    /// Returns `DigestError::Serialization` if the block cannot be
    /// represented as JSON.
    pub fn digest(&self) -> Result<String, DigestError> {
        let canonical = canonical_json(self)?;
        Ok(sha256_hex(&canonical))
    }
}

/// Serialize a value as compact JSON with lexicographically ordered keys.
///
/// `serde_json::Map` is backed by a `BTreeMap`, so routing through
/// `serde_json::Value` orders object keys regardless of field declaration
/// order.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, DigestError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// SHA-256 of `bytes` as a lowercase hexadecimal string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            index: 2,
            timestamp: 1_700_000_000.25,
            transactions: vec![
                Transaction::new("alice", "bob", 5),
                Transaction::new("0", "node", 1),
            ],
            proof: 35293,
            previous_hash: "ab".repeat(32),
        }
    }

    #[test]
    fn test_block_digest_is_stable() {
        let block = sample_block();
        let hash1 = block.digest().unwrap();
        let hash2 = block.clone().digest().unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);

        let mut block_modified = block.clone();
        block_modified.proof += 1;
        assert_ne!(hash1, block_modified.digest().unwrap());
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let encoded = String::from_utf8(canonical_json(&sample_block()).unwrap()).unwrap();
        let index = encoded.find("\"index\"").unwrap();
        let previous_hash = encoded.find("\"previous_hash\"").unwrap();
        let proof = encoded.find("\"proof\"").unwrap();
        let timestamp = encoded.find("\"timestamp\"").unwrap();
        let transactions = encoded.find("\"transactions\"").unwrap();
        assert!(index < previous_hash);
        assert!(previous_hash < proof);
        assert!(proof < timestamp);
        assert!(timestamp < transactions);
        // Nested objects are ordered too.
        assert!(encoded.contains(r#"{"amount":5,"recipient":"bob","sender":"alice"}"#));
    }

    #[test]
    fn test_digest_matches_independent_construction() {
        // A block decoded from JSON with shuffled keys hashes like the block it describes.
        let json = r#"{
            "transactions": [
                {"recipient": "bob", "amount": 5, "sender": "alice"},
                {"amount": 1, "sender": "0", "recipient": "node"}
            ],
            "previous_hash": "abababababababababababababababababababababababababababababababab",
            "proof": 35293,
            "timestamp": 1700000000.25,
            "index": 2
        }"#;
        let decoded: Block = serde_json::from_str(json).unwrap();
        assert_eq!(decoded, sample_block());
        assert_eq!(decoded.digest().unwrap(), sample_block().digest().unwrap());
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
