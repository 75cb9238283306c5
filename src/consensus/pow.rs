// Proof of Work implementation

use crate::core::{Block, Hash256, Target, unix_millis};
use std::time::{Duration, Instant};

/// Check if a block hash meets a target (hash < target)
pub fn proof_of_work_valid(hash: &Hash256, target: &Target) -> bool {
    target.is_met_by(hash)
}

/// Attempt-bounded proof-of-work search.
///
/// A single call never runs longer than `max_attempts` hashes, so mining can be
/// interleaved with message processing.
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    pub max_attempts: u64,
}

impl Miner {
    pub fn new(max_attempts: u64) -> Self {
        Self { max_attempts }
    }

    /// Search for a nonce that makes `block` meet its own target.
    ///
    /// Every attempt refreshes `block.time` and bumps the nonce (wrapping). On
    /// success the block is left holding the winning time and nonce.
    pub fn mine(&self, block: &mut Block) -> MiningResult {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        while attempts < self.max_attempts {
            block.time = unix_millis();
            block.nonce = block.nonce.wrapping_add(1);
            let hash = block.hash();
            attempts += 1;

            if proof_of_work_valid(&hash, &block.target) {
                return MiningResult {
                    hash: Some(hash),
                    attempts,
                    duration: start_time.elapsed(),
                };
            }
        }

        log::trace!(
            "no proof of work after {} attempts ({:.1} H/s)",
            attempts,
            attempts as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON)
        );

        MiningResult {
            hash: None,
            attempts,
            duration: start_time.elapsed(),
        }
    }

    /// Verify that a block satisfies its own target
    pub fn verify(block: &Block) -> bool {
        proof_of_work_valid(&block.hash(), &block.target)
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// Winning block hash, if one was found
    pub hash: Option<Hash256>,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    pub fn success(&self) -> bool {
        self.hash.is_some()
    }

    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}
