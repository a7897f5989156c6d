//! # Storage Module
//!
//! The block record and the in-memory chain that owns the block sequence.
//!
//! ```text
//! block.rs  — Block structure, genesis block, hash and display helpers
//! chain.rs  — Ordered chain with append, tamper, repair and validation
//! ```
//!
//! Nothing is persisted: a chain lives for the duration of the process.

pub mod block;
pub mod chain;

pub use block::{format_timestamp, truncate_hash, Block};
pub use chain::{Chain, ChainError, ChainResult, LedgerEntry};
