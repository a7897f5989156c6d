//! # Hash Primitives
//!
//! Everything the chain hashes flows through here. We wrap audited
//! implementations (`sha2`, `blake3`) and add exactly one thing on top:
//! the canonical block preimage.

pub mod hash;

pub use hash::{
    blake3_hex, block_preimage, calculate_hash, calculate_hash_with, sha256_hex, HashAlgorithm,
    UnknownAlgorithm,
};
