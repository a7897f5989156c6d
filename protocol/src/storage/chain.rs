//! In-memory chain: the single owner of the ordered block sequence.
//!
//! Writes only happen at the tail (`append`) or by swapping the record at a
//! position for a new value (`tamper`, `tamper_and_rehash`, `repair`).
//! Validity is never stored; every query re-runs the validator over the
//! whole sequence.

use std::collections::BTreeSet;

use thiserror::Error;

use super::block::Block;
use crate::crypto::hash::HashAlgorithm;
use crate::validation::validator::{ChainValidator, ValidationReport};

/// Errors returned by chain mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("no block at position {0}")]
    BlockNotFound(usize),

    #[error("the genesis block cannot be edited")]
    GenesisLocked,

    #[error("block index mismatch: expected {expected}, got {got}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("block does not extend the tip: expected previous hash {expected}, got {got}")]
    StaleTip { expected: String, got: String },
}

pub type ChainResult<T> = Result<T, ChainError>;

/// One non-genesis entry of the transaction ledger view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub data: String,
}

/// Ordered chain of blocks, genesis first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<Block>,
    algorithm: HashAlgorithm,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// A SHA-256 chain holding only the genesis block.
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Sha256)
    }

    /// A chain holding only the genesis block, hashed with `algorithm`.
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            blocks: vec![Block::genesis_with(algorithm)],
            algorithm,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, genesis included. Never zero.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain starts with its genesis block and never shrinks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The latest block.
    pub fn tip(&self) -> &Block {
        // A chain is constructed with genesis and only grows.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get(&self, position: usize) -> Option<&Block> {
        self.blocks.get(position)
    }

    /// Index the next mined block must carry.
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Append a mined block at the tail.
    ///
    /// The block must carry the next index and point at the current tip.
    /// Proof-of-work is not re-checked here.
    pub fn append(&mut self, block: Block) -> ChainResult<()> {
        let expected = self.next_index();
        if block.index != expected {
            return Err(ChainError::IndexMismatch {
                expected,
                got: block.index,
            });
        }

        let tip_hash = &self.tip().hash;
        if &block.previous_hash != tip_hash {
            return Err(ChainError::StaleTip {
                expected: tip_hash.clone(),
                got: block.previous_hash,
            });
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Replace the data of the block at `position`, leaving its hash stale.
    pub fn tamper(&mut self, position: usize, data: impl Into<String>) -> ChainResult<&Block> {
        let replacement = self.editable(position)?.with_data(data);
        Ok(self.replace(position, replacement))
    }

    /// Replace the data of the block at `position` and re-seal it with a
    /// fresh hash. The block then validates; its successor's link does not.
    pub fn tamper_and_rehash(
        &mut self,
        position: usize,
        data: impl Into<String>,
    ) -> ChainResult<&Block> {
        let replacement = self
            .editable(position)?
            .with_data(data)
            .rehashed(self.algorithm);
        Ok(self.replace(position, replacement))
    }

    /// Recompute the hash of the block at `position` from its current fields.
    pub fn repair(&mut self, position: usize) -> ChainResult<&Block> {
        let replacement = self.editable(position)?.rehashed(self.algorithm);
        Ok(self.replace(position, replacement))
    }

    /// Validator matching this chain's algorithm.
    pub fn validator(&self) -> ChainValidator {
        ChainValidator::new(self.algorithm)
    }

    pub fn is_valid(&self) -> bool {
        self.validator().is_valid(&self.blocks)
    }

    pub fn invalid_indices(&self) -> BTreeSet<usize> {
        self.validator().invalid_indices(&self.blocks)
    }

    pub fn validate(&self) -> ValidationReport {
        self.validator().validate(&self.blocks)
    }

    /// The payload of every mined block, in chain order.
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.blocks
            .iter()
            .skip(1)
            .map(|b| LedgerEntry {
                index: b.index,
                data: b.data.clone(),
            })
            .collect()
    }

    fn editable(&self, position: usize) -> ChainResult<&Block> {
        if position == 0 {
            return Err(ChainError::GenesisLocked);
        }
        self.blocks
            .get(position)
            .ok_or(ChainError::BlockNotFound(position))
    }

    fn replace(&mut self, position: usize, block: Block) -> &Block {
        self.blocks[position] = block;
        &self.blocks[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::miner::{mine_block, Miner};

    fn mine_onto(chain: &mut Chain, data: &str, difficulty: u32) {
        let block = Miner::new(chain.algorithm()).mine(
            chain.next_index(),
            data,
            &chain.tip().hash,
            difficulty,
        );
        chain.append(block).expect("append mined block");
    }

    #[test]
    fn new_chain_holds_genesis() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.tip(), &Block::genesis());
        assert_eq!(chain.next_index(), 1);
        assert!(chain.is_valid());
        assert!(chain.invalid_indices().is_empty());
        assert!(chain.ledger().is_empty());
    }

    #[test]
    fn mined_blocks_append_and_validate() {
        let mut chain = Chain::new();
        for (i, data) in ["a", "b", "c"].iter().enumerate() {
            mine_onto(&mut chain, data, (i % 3) as u32);
        }
        assert_eq!(chain.len(), 4);
        assert!(chain.is_valid());
        assert_eq!(
            chain.ledger(),
            vec![
                LedgerEntry { index: 1, data: "a".into() },
                LedgerEntry { index: 2, data: "b".into() },
                LedgerEntry { index: 3, data: "c".into() },
            ]
        );
    }

    #[test]
    fn append_rejects_wrong_index() {
        let mut chain = Chain::new();
        let block = mine_block(2, "skip", &chain.tip().hash, 0);
        assert_eq!(
            chain.append(block),
            Err(ChainError::IndexMismatch { expected: 1, got: 2 })
        );
    }

    #[test]
    fn append_rejects_stale_tip() {
        let mut chain = Chain::new();
        let genesis_hash = chain.tip().hash.clone();

        // Two searches started from the same tip: the second is a fork.
        let first = mine_block(1, "first", &genesis_hash, 1);
        let second = mine_block(1, "second", &genesis_hash, 1);
        chain.append(first).expect("first append");

        let mut second = second;
        second.index = 2;
        assert!(matches!(chain.append(second), Err(ChainError::StaleTip { .. })));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn tamper_keeps_hash_and_flags_block() {
        let mut chain = Chain::new();
        mine_onto(&mut chain, "Alice pays Bob 10 BTC", 1);
        mine_onto(&mut chain, "Bob pays Charlie 5 BTC", 1);
        let before = chain.get(1).cloned().expect("block 1");

        let tampered = chain.tamper(1, "Alice pays Bob 1000 BTC").expect("tamper");
        assert_eq!(tampered.hash, before.hash);
        assert_eq!(tampered.data, "Alice pays Bob 1000 BTC");

        assert!(!chain.is_valid());
        assert_eq!(chain.invalid_indices(), BTreeSet::from([1]));
    }

    #[test]
    fn tamper_then_repair_round_trip() {
        let mut chain = Chain::new();
        mine_onto(&mut chain, "only block", 1);

        chain.tamper(1, "edited").expect("tamper");
        assert_eq!(chain.invalid_indices(), BTreeSet::from([1]));

        chain.repair(1).expect("repair");
        assert!(chain.invalid_indices().is_empty());
        assert!(chain.is_valid());
        assert_eq!(chain.get(1).map(|b| b.data.as_str()), Some("edited"));
    }

    #[test]
    fn tamper_and_rehash_moves_fault_to_successor() {
        let mut chain = Chain::new();
        mine_onto(&mut chain, "one", 1);
        mine_onto(&mut chain, "two", 1);

        chain.tamper_and_rehash(1, "forged").expect("re-sign");
        assert_eq!(chain.invalid_indices(), BTreeSet::from([2]));
    }

    #[test]
    fn genesis_and_missing_blocks_are_rejected() {
        let mut chain = Chain::new();
        assert_eq!(chain.tamper(0, "x").err(), Some(ChainError::GenesisLocked));
        assert_eq!(chain.repair(0).err(), Some(ChainError::GenesisLocked));
        assert_eq!(chain.tamper(5, "x").err(), Some(ChainError::BlockNotFound(5)));
        assert_eq!(
            chain.tamper_and_rehash(1, "x").err(),
            Some(ChainError::BlockNotFound(1))
        );
    }

    #[test]
    fn validate_report_matches_indices() {
        let mut chain = Chain::new();
        mine_onto(&mut chain, "one", 0);
        mine_onto(&mut chain, "two", 0);
        chain.tamper(2, "edited").expect("tamper");

        let report = chain.validate();
        assert!(!report.is_valid());
        assert_eq!(report.invalid_indices(), chain.invalid_indices());
    }

    #[test]
    fn blake3_chain_validates_with_its_own_algorithm() {
        let mut chain = Chain::with_algorithm(HashAlgorithm::Blake3);
        mine_onto(&mut chain, "blake block", 1);
        assert!(chain.is_valid());
        assert_eq!(chain.tip().previous_hash, Block::genesis_with(HashAlgorithm::Blake3).hash);
    }
}
