//! # Block Structure
//!
//! A block is one record of the chain: a sequence number, a timestamp, a
//! freeform text payload, the link to its predecessor, the nonce found by
//! the miner, and the hash that seals all of the above.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Block                                       │
//! │  ├── index: u64            (0 = genesis)     │
//! │  ├── timestamp: u64        (ms, 0 = genesis) │
//! │  ├── data: String                            │
//! │  ├── previous_hash: String ("0" = genesis)   │
//! │  ├── nonce: u64                              │
//! │  ├── hash: String          (hex digest)      │
//! │  └── mining_time_ms: Option<u64>  (unhashed) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Immutability
//!
//! Blocks are value records. Nothing in this crate edits a block in place:
//! tampering produces a *new* block via [`Block::with_data`] that keeps the
//! old `hash`, and repairing produces a new block via [`Block::rehashed`].
//! The chain swaps the record at a position; the validator then notices
//! that the stored hash no longer describes the content.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{
    GENESIS_DATA, GENESIS_NONCE, GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP, HASH_PREVIEW_LENGTH,
};
use crate::crypto::hash::{calculate_hash_with, HashAlgorithm};

/// One record of the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain. Genesis is 0; each block is its parent + 1.
    pub index: u64,
    /// Unix timestamp in milliseconds, captured once when mining starts.
    /// `0` marks the genesis block.
    pub timestamp: u64,
    /// Freeform payload, typically a human-readable transaction.
    pub data: String,
    /// Hash of the preceding block, or `"0"` for genesis.
    pub previous_hash: String,
    /// Nonce that made `hash` satisfy the difficulty target.
    pub nonce: u64,
    /// Hex digest over `(index, previous_hash, timestamp, data, nonce)`.
    pub hash: String,
    /// Wall-clock duration of the mining search. Informational only and
    /// not covered by `hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mining_time_ms: Option<u64>,
}

impl Block {
    /// Construct the genesis block of a SHA-256 chain.
    ///
    /// All fields are fixed literals, so every call returns the same block:
    ///
    /// ```
    /// use chainlab_protocol::storage::Block;
    ///
    /// let genesis = Block::genesis();
    /// assert_eq!(genesis.index, 0);
    /// assert_eq!(genesis.previous_hash, "0");
    /// assert_eq!(genesis, Block::genesis());
    /// ```
    pub fn genesis() -> Self {
        Self::genesis_with(HashAlgorithm::Sha256)
    }

    /// Construct the genesis block of a chain hashed with `algorithm`.
    pub fn genesis_with(algorithm: HashAlgorithm) -> Self {
        let hash = calculate_hash_with(
            algorithm,
            0,
            GENESIS_PREVIOUS_HASH,
            GENESIS_TIMESTAMP,
            GENESIS_DATA,
            GENESIS_NONCE,
        );

        Block {
            index: 0,
            timestamp: GENESIS_TIMESTAMP,
            data: GENESIS_DATA.to_string(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: GENESIS_NONCE,
            hash,
            mining_time_ms: None,
        }
    }

    /// Recompute the hash of this block's current fields.
    pub fn compute_hash(&self, algorithm: HashAlgorithm) -> String {
        calculate_hash_with(
            algorithm,
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.data,
            self.nonce,
        )
    }

    /// True if the stored hash describes the current content.
    pub fn hash_matches(&self, algorithm: HashAlgorithm) -> bool {
        self.hash == self.compute_hash(algorithm)
    }

    /// True for the block at position 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// A copy of this block with `data` replaced and every other field,
    /// `hash` included, left as it was. This is the tamper operation: the
    /// result deliberately violates the hash invariant.
    pub fn with_data(&self, data: impl Into<String>) -> Self {
        Block {
            data: data.into(),
            ..self.clone()
        }
    }

    /// A copy of this block with `hash` recomputed from its current fields.
    pub fn rehashed(&self, algorithm: HashAlgorithm) -> Self {
        Block {
            hash: self.compute_hash(algorithm),
            ..self.clone()
        }
    }

    /// Shortened hash for display. See [`truncate_hash`].
    pub fn short_hash(&self) -> String {
        truncate_hash(&self.hash)
    }

    /// Shortened previous hash for display. Genesis shows the bare `"0"`.
    pub fn short_previous_hash(&self) -> String {
        truncate_hash(&self.previous_hash)
    }

    /// Timestamp rendered for humans. See [`format_timestamp`].
    pub fn display_timestamp(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

/// Shorten a hash to its first few characters followed by an ellipsis.
///
/// The genesis sentinel `"0"` (and anything already shorter than the
/// preview) is returned unchanged.
pub fn truncate_hash(hash: &str) -> String {
    if hash == GENESIS_PREVIOUS_HASH || hash.chars().count() <= HASH_PREVIEW_LENGTH {
        return hash.to_string();
    }
    let preview: String = hash.chars().take(HASH_PREVIEW_LENGTH).collect();
    format!("{preview}…")
}

/// Render a block timestamp: `"Genesis"` for the sentinel `0`, RFC 3339
/// (UTC, millisecond precision) otherwise.
pub fn format_timestamp(timestamp: u64) -> String {
    if timestamp == GENESIS_TIMESTAMP {
        return "Genesis".to_string();
    }
    i64::try_from(timestamp)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp.to_string())
}

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
