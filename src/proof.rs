//! Proof-of-work puzzle.
//!
//! A candidate proof `p'` solves the puzzle for a previous proof `p` when the
//! SHA-256 hex digest of the decimal text `"{p}{p'}"` starts with
//! `difficulty` copies of the target digit.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::sha256_hex;

/// Leading digit count required by default.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Hex digit that must repeat at the start of a valid digest by default.
pub const DEFAULT_TARGET: char = '0';

/// Candidates checked between two reads of a cancellation flag.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
    target: char,
}

impl ProofOfWork {
    pub fn new(difficulty: usize, target: char) -> Self {
        Self { difficulty, target }
    }

    pub fn with_difficulty(difficulty: usize) -> Self {
        Self::new(difficulty, DEFAULT_TARGET)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn target(&self) -> char {
        self.target
    }

    /// Whether `candidate` solves the puzzle posed by `previous`.
    pub fn is_valid_proof(&self, previous: u64, candidate: u64) -> bool {
        let guess = format!("{}{}", previous, candidate);
        let digest = sha256_hex(guess.as_bytes());
        digest.len() >= self.difficulty
            && digest
                .chars()
                .take(self.difficulty)
                .all(|c| c == self.target)
    }

    /// Smallest non-negative candidate solving the puzzle for `previous`.
    ///
    /// Blocks the calling thread until a solution is found. Run it on a
    /// blocking worker when calling from async code.
    pub fn find_proof(&self, previous: u64) -> u64 {
        let mut candidate = 0;
        while !self.is_valid_proof(previous, candidate) {
            candidate += 1;
        }
        candidate
    }

    /// Same search as [`find_proof`](Self::find_proof), abandoned once
    /// `cancel` is set.
    ///
    /// Returns `None` if cancelled before a solution was found. When it does
    /// return a value, that value equals `find_proof(previous)`.
    pub fn find_proof_until(&self, previous: u64, cancel: &AtomicBool) -> Option<u64> {
        let mut candidate = 0;
        loop {
            if candidate % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return None;
            }
            if self.is_valid_proof(previous, candidate) {
                return Some(candidate);
            }
            candidate += 1;
        }
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY, DEFAULT_TARGET)
    }
}
