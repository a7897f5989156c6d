// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainlab Protocol — Core Library
//!
//! A small proof-of-work blockchain built for teaching how hash chains
//! detect tampering.
//!
//! ## Architecture
//!
//! - **crypto** — Block hashing (SHA-256 by default, BLAKE3 optional).
//! - **storage** — The block record, the genesis block, and the chain.
//! - **mining** — Nonce search and the serialized block producer.
//! - **validation** — Hash and link checks over a whole chain.
//! - **config** — Protocol constants and defaults.
//!
//! ## Quick look
//!
//! ```
//! use chainlab_protocol::mining::mine_block;
//! use chainlab_protocol::storage::Block;
//! use chainlab_protocol::validation::{invalid_block_indices, is_chain_valid};
//!
//! let genesis = Block::genesis();
//! let block = mine_block(1, "Alice pays Bob 10 BTC", &genesis.hash, 2);
//! let mut chain = vec![genesis, block];
//! assert!(is_chain_valid(&chain));
//!
//! chain[1] = chain[1].with_data("Alice pays Bob 1000 BTC");
//! assert!(!is_chain_valid(&chain));
//! assert!(invalid_block_indices(&chain).contains(&1));
//! ```

pub mod config;
pub mod crypto;
pub mod mining;
pub mod storage;
pub mod validation;
