//! # Hashing Utilities
//!
//! The block hash function and the digest primitives behind it. Two
//! algorithms are supported:
//!
//! - **SHA-256** — the default. Every chain created without an explicit
//!   choice uses it, and the canonical genesis hash is a SHA-256 digest.
//! - **BLAKE3** — available for chains created with
//!   [`HashAlgorithm::Blake3`]. Same 32-byte output, so block hashes keep
//!   their 64-character hex shape.
//!
//! ## Canonical preimage
//!
//! A block hash covers `index || previous_hash || timestamp || data || nonce`,
//! where numbers are rendered in decimal and the fields are concatenated
//! without separators. The mining loop and the validator both go through
//! [`calculate_hash_with`], so there is exactly one definition of the
//! preimage in the codebase.
//!
//! The algorithm is a property of the chain, not of individual blocks. A
//! block hashed with one algorithm never validates under the other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest algorithm a chain is hashed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, rendered as 64 lowercase hex characters.
    #[default]
    Sha256,
    /// BLAKE3 with the default 32-byte output.
    Blake3,
}

impl HashAlgorithm {
    /// Stable lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Hash `data` and return the lowercase hex digest.
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => sha256_hex(data),
            Self::Blake3 => blake3_hex(data),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an algorithm name that is neither `sha256` nor `blake3`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hash algorithm: {0} (expected \"sha256\" or \"blake3\")")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

/// SHA-256 of `data` as lowercase hex.
///
/// # Example
///
/// ```
/// use chainlab_protocol::crypto::sha256_hex;
///
/// let digest = sha256_hex(b"abc");
/// assert_eq!(digest.len(), 64);
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// BLAKE3 of `data` as lowercase hex.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Build the canonical preimage of a block hash.
pub fn block_preimage(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: &str,
    nonce: u64,
) -> String {
    format!("{index}{previous_hash}{timestamp}{data}{nonce}")
}

/// Hash a block's canonical fields with SHA-256.
///
/// This is the hash function of every default chain. Pure and total: the
/// same arguments always produce the same 64-character digest.
///
/// # Example
///
/// ```
/// use chainlab_protocol::crypto::calculate_hash;
///
/// let a = calculate_hash(1, "00ab", 1_700_000_000_000, "Alice pays Bob 10 BTC", 42);
/// let b = calculate_hash(1, "00ab", 1_700_000_000_000, "Alice pays Bob 10 BTC", 42);
/// assert_eq!(a, b);
/// ```
pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: &str,
    nonce: u64,
) -> String {
    calculate_hash_with(HashAlgorithm::Sha256, index, previous_hash, timestamp, data, nonce)
}

/// Hash a block's canonical fields with the given algorithm.
pub fn calculate_hash_with(
    algorithm: HashAlgorithm,
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    data: &str,
    nonce: u64,
) -> String {
    let preimage = block_preimage(index, previous_hash, timestamp, data, nonce);
    algorithm.digest_hex(preimage.as_bytes())
}
