//! # Proof-of-Work Miner
//!
//! Brute-force search for a nonce whose block hash starts with
//! `difficulty` hex zeros.
//!
//! The timestamp is captured once, before the first attempt, and stays
//! fixed for the whole search: the nonce is the only field that changes
//! between attempts. Expected work is about `16^difficulty` hashes.
//!
//! The search is synchronous, CPU-bound, and has no timeout. Callers that
//! need to keep a UI responsive run it on a blocking thread (see
//! [`super::producer`]) and may stop it early through a [`CancelToken`],
//! which the loop polls every [`CANCEL_POLL_INTERVAL`] attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CANCEL_POLL_INTERVAL;
use crate::crypto::hash::{calculate_hash_with, HashAlgorithm};
use crate::storage::block::{now_millis, Block};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Ways a cancellable search can end without a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    /// The cancel token was set while the search was running.
    #[error("mining of block {index} cancelled after {attempts} attempts")]
    Cancelled { index: u64, attempts: u64 },

    /// Every `u64` nonce was tried without meeting the target.
    #[error("nonce space exhausted while mining block {index}")]
    NonceSpaceExhausted { index: u64 },
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag a running search checks between attempts.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every search holding this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The prefix a hash must start with: `difficulty` copies of `'0'`.
pub fn difficulty_target(difficulty: u32) -> String {
    "0".repeat(difficulty as usize)
}

/// True if the first `difficulty` characters of `hash` are all `'0'`.
///
/// Difficulty 0 accepts every hash. A difficulty longer than the hash
/// accepts none.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.as_bytes()[..needed].iter().all(|&b| b == b'0')
}

// ---------------------------------------------------------------------------
// Miner
// ---------------------------------------------------------------------------

/// A successful search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    /// The sealed block, `mining_time_ms` filled in.
    pub block: Block,
    /// Number of hashes computed, the winning one included.
    pub attempts: u64,
    /// Wall-clock duration of the search.
    pub elapsed: Duration,
}

/// Proof-of-work search bound to a chain's hash algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Miner {
    algorithm: HashAlgorithm,
}

impl Miner {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Mine a block. Runs until a nonce satisfies `difficulty`; there is no
    /// timeout and no failure mode.
    pub fn mine(&self, index: u64, data: &str, previous_hash: &str, difficulty: u32) -> Block {
        let never = CancelToken::new();
        loop {
            match self.mine_cancellable(index, data, previous_hash, difficulty, &never) {
                Ok(mined) => return mined.block,
                // Only reachable after 2^64 attempts; a new timestamp opens a
                // fresh nonce space.
                Err(err) => warn!(%err, "restarting search with a new timestamp"),
            }
        }
    }

    /// Mine a block, giving up early if `cancel` is set.
    ///
    /// # Errors
    ///
    /// [`MiningError::Cancelled`] when the token fires, and
    /// [`MiningError::NonceSpaceExhausted`] if the nonce would overflow.
    pub fn mine_cancellable(
        &self,
        index: u64,
        data: &str,
        previous_hash: &str,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<MinedBlock, MiningError> {
        let timestamp = now_millis();
        let started = Instant::now();
        let mut nonce: u64 = 0;

        loop {
            let hash =
                calculate_hash_with(self.algorithm, index, previous_hash, timestamp, data, nonce);

            if meets_difficulty(&hash, difficulty) {
                let elapsed = started.elapsed();
                let attempts = nonce.saturating_add(1);
                debug!(
                    index,
                    nonce,
                    attempts,
                    difficulty,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "block mined"
                );

                let block = Block {
                    index,
                    timestamp,
                    data: data.to_string(),
                    previous_hash: previous_hash.to_string(),
                    nonce,
                    hash,
                    mining_time_ms: Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
                };
                return Ok(MinedBlock {
                    block,
                    attempts,
                    elapsed,
                });
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(MiningError::NonceSpaceExhausted { index })?;

            if nonce % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                debug!(index, attempts = nonce, "mining cancelled");
                return Err(MiningError::Cancelled {
                    index,
                    attempts: nonce,
                });
            }
        }
    }
}

/// Mine a block on a SHA-256 chain.
///
/// ```
/// use chainlab_protocol::mining::mine_block;
/// use chainlab_protocol::storage::Block;
///
/// let genesis = Block::genesis();
/// let block = mine_block(1, "Alice pays Bob 10 BTC", &genesis.hash, 2);
/// assert!(block.hash.starts_with("00"));
/// ```
pub fn mine_block(index: u64, data: &str, previous_hash: &str, difficulty: u32) -> Block {
    Miner::default().mine(index, data, previous_hash, difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_repeated_zeros() {
        assert_eq!(difficulty_target(0), "");
        assert_eq!(difficulty_target(3), "000");
    }

    #[test]
    fn meets_difficulty_rules() {
        assert!(meets_difficulty("ffff", 0));
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn difficulty_zero_takes_first_nonce() {
        let genesis = Block::genesis();
        let mined = Miner::default()
            .mine_cancellable(1, "anything", &genesis.hash, 0, &CancelToken::new())
            .expect("difficulty 0 always succeeds");
        assert_eq!(mined.block.nonce, 0);
        assert_eq!(mined.attempts, 1);
    }

    #[test]
    fn mined_block_meets_target_and_rehashes() {
        let genesis = Block::genesis();
        let block = mine_block(1, "Alice pays Bob 10 BTC", &genesis.hash, 2);

        assert!(block.hash.starts_with("00"));
        assert_eq!(block.hash, block.compute_hash(HashAlgorithm::Sha256));
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, genesis.hash);
        assert_eq!(block.data, "Alice pays Bob 10 BTC");
        assert!(block.mining_time_ms.is_some());
        assert!(block.timestamp > 0);
    }

    #[test]
    fn nonce_is_the_first_winner() {
        let genesis = Block::genesis();
        let block = mine_block(1, "first winner", &genesis.hash, 1);

        // Every smaller nonce under the same timestamp must miss the target.
        for nonce in 0..block.nonce {
            let hash = calculate_hash_with(
                HashAlgorithm::Sha256,
                1,
                &genesis.hash,
                block.timestamp,
                "first winner",
                nonce,
            );
            assert!(!meets_difficulty(&hash, 1));
        }
    }

    #[test]
    fn miner_does_not_check_index() {
        // Any index is accepted; chain bookkeeping is the caller's job.
        let block = mine_block(42, "out of order", "whatever", 1);
        assert_eq!(block.index, 42);
        assert!(block.hash.starts_with('0'));
    }

    #[test]
    fn blake3_miner_uses_its_algorithm() {
        let genesis = Block::genesis_with(HashAlgorithm::Blake3);
        let miner = Miner::new(HashAlgorithm::Blake3);
        let block = miner.mine(1, "blake", &genesis.hash, 1);
        assert!(block.hash_matches(HashAlgorithm::Blake3));
        assert!(!block.hash_matches(HashAlgorithm::Sha256));
    }

    #[test]
    fn cancelled_token_stops_search() {
        let cancel = CancelToken::new();
        cancel.cancel();

        // 40 leading zeros will not turn up in the first poll window.
        let err = Miner::default()
            .mine_cancellable(1, "never", "0", 40, &cancel)
            .expect_err("search must be cancelled");
        assert_eq!(
            err,
            MiningError::Cancelled {
                index: 1,
                attempts: CANCEL_POLL_INTERVAL
            }
        );
    }

    #[test]
    fn cancel_from_another_thread() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();

        let handle = std::thread::spawn(move || {
            Miner::default().mine_cancellable(1, "long", "0", 40, &remote)
        });
        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        let result = handle.join().expect("miner thread panicked");
        assert!(matches!(result, Err(MiningError::Cancelled { index: 1, .. })));
    }

    #[test]
    fn token_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
