//! # Chain Validator
//!
//! Recomputes every block hash and every parent link over an ordered slice
//! of blocks and reports where they disagree with what is stored.
//!
//! ## Checks (per position `i ≥ 1`)
//!
//! 1. **Self-hash** — `blocks[i].hash` equals the hash recomputed from
//!    `blocks[i]`'s own fields.
//! 2. **Link** — `blocks[i].previous_hash` equals the *stored* hash of
//!    `blocks[i - 1]`.
//!
//! Genesis (position 0) has no predecessor and is never checked, so a
//! genesis-only chain is always valid.
//!
//! ## Non-cascading by default
//!
//! Tampering with block `k` leaves its stored `hash` stale. Block `k + 1`
//! still points at that stale value, so its link check passes and only `k`
//! is reported. [`LinkPolicy::RecomputedHash`] switches the link check to
//! the predecessor's recomputed hash, which flags the block right after a
//! tampered one as well. That variant is opt-in.
//!
//! Validation never fails and never caches: callers recompute the report
//! from the full chain whenever they need it.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::crypto::hash::HashAlgorithm;
use crate::storage::block::Block;

/// What a block's `previous_hash` is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    /// The predecessor's stored `hash`. Only directly tampered blocks fail.
    #[default]
    StoredHash,
    /// The predecessor's recomputed hash. The successor of a tampered block
    /// fails too.
    RecomputedHash,
}

/// Why a block failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultKind {
    /// The stored hash does not match the block's content.
    HashMismatch { stored: String, computed: String },
    /// The block does not point at its predecessor.
    BrokenLink { expected: String, found: String },
}

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFault {
    /// Position of the offending block in the chain.
    pub position: usize,
    #[serde(flatten)]
    pub kind: FaultKind,
}

/// Outcome of a full validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    /// Every failed check, in chain order. A block failing both checks
    /// appears twice.
    pub faults: Vec<BlockFault>,
}

impl ValidationReport {
    /// True when no check failed.
    pub fn is_valid(&self) -> bool {
        self.faults.is_empty()
    }

    /// Positions of every block with at least one fault.
    pub fn invalid_indices(&self) -> BTreeSet<usize> {
        self.faults.iter().map(|f| f.position).collect()
    }

    /// Faults recorded for one position.
    pub fn faults_at(&self, position: usize) -> impl Iterator<Item = &BlockFault> {
        self.faults.iter().filter(move |f| f.position == position)
    }
}

/// Validator bound to one hash algorithm and link policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainValidator {
    algorithm: HashAlgorithm,
    link_policy: LinkPolicy,
}

impl ChainValidator {
    /// Validator for a chain hashed with `algorithm`, non-cascading links.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            link_policy: LinkPolicy::StoredHash,
        }
    }

    /// Same validator with a different link policy.
    pub fn with_link_policy(mut self, link_policy: LinkPolicy) -> Self {
        self.link_policy = link_policy;
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn link_policy(&self) -> LinkPolicy {
        self.link_policy
    }

    /// Run both checks on every block and collect all faults.
    pub fn validate(&self, blocks: &[Block]) -> ValidationReport {
        let mut faults = Vec::new();

        for (position, pair) in blocks.windows(2).enumerate() {
            let position = position + 1;
            let (previous, current) = (&pair[0], &pair[1]);

            let computed = current.compute_hash(self.algorithm);
            if current.hash != computed {
                faults.push(BlockFault {
                    position,
                    kind: FaultKind::HashMismatch {
                        stored: current.hash.clone(),
                        computed,
                    },
                });
            }

            let expected = self.expected_link(previous);
            if current.previous_hash != expected {
                faults.push(BlockFault {
                    position,
                    kind: FaultKind::BrokenLink {
                        expected,
                        found: current.previous_hash.clone(),
                    },
                });
            }
        }

        ValidationReport { faults }
    }

    /// True if every block passes both checks. Stops at the first failure.
    pub fn is_valid(&self, blocks: &[Block]) -> bool {
        blocks.windows(2).all(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            current.hash_matches(self.algorithm)
                && current.previous_hash == self.expected_link(previous)
        })
    }

    /// Positions of every block that fails at least one check.
    pub fn invalid_indices(&self, blocks: &[Block]) -> BTreeSet<usize> {
        self.validate(blocks).invalid_indices()
    }

    fn expected_link(&self, previous: &Block) -> String {
        match self.link_policy {
            LinkPolicy::StoredHash => previous.hash.clone(),
            LinkPolicy::RecomputedHash => previous.compute_hash(self.algorithm),
        }
    }
}

/// True if a SHA-256 chain is intact (non-cascading link checks).
pub fn is_chain_valid(blocks: &[Block]) -> bool {
    ChainValidator::default().is_valid(blocks)
}

/// Every position of a SHA-256 chain that fails a check.
pub fn invalid_block_indices(blocks: &[Block]) -> BTreeSet<usize> {
    ChainValidator::default().invalid_indices(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::miner::mine_block;

    /// Genesis plus `n` blocks mined at difficulty 1.
    fn build_chain(n: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis()];
        for i in 1..=n {
            let tip = blocks.last().expect("non-empty");
            let block = mine_block(i as u64, &format!("tx {i}"), &tip.hash, 1);
            blocks.push(block);
        }
        blocks
    }

    fn tamper(blocks: &mut [Block], position: usize, data: &str) {
        blocks[position] = blocks[position].with_data(data);
    }

    #[test]
    fn empty_and_genesis_only_are_valid() {
        assert!(is_chain_valid(&[]));
        assert!(invalid_block_indices(&[]).is_empty());

        let genesis_only = vec![Block::genesis()];
        assert!(is_chain_valid(&genesis_only));
        assert!(invalid_block_indices(&genesis_only).is_empty());
    }

    #[test]
    fn genesis_is_never_checked() {
        // Even a garbage genesis passes when it stands alone.
        let mut genesis = Block::genesis();
        genesis.hash = "not-a-hash".into();
        assert!(is_chain_valid(&[genesis]));
    }

    #[test]
    fn mined_chain_is_valid() {
        let blocks = build_chain(4);
        assert!(is_chain_valid(&blocks));
        assert!(invalid_block_indices(&blocks).is_empty());
    }

    #[test]
    fn tamper_flags_only_the_tampered_block() {
        let mut blocks = build_chain(4);
        tamper(&mut blocks, 2, "tx 2 (edited)");

        assert!(!is_chain_valid(&blocks));
        assert_eq!(invalid_block_indices(&blocks), BTreeSet::from([2]));
    }

    #[test]
    fn tamper_at_tail() {
        let mut blocks = build_chain(3);
        tamper(&mut blocks, 3, "edited");
        assert_eq!(invalid_block_indices(&blocks), BTreeSet::from([3]));
    }

    #[test]
    fn independent_tampers_are_all_reported() {
        let mut blocks = build_chain(5);
        tamper(&mut blocks, 1, "a");
        tamper(&mut blocks, 4, "b");
        assert_eq!(invalid_block_indices(&blocks), BTreeSet::from([1, 4]));
    }

    #[test]
    fn rehashed_tamper_breaks_the_successor_link() {
        let mut blocks = build_chain(3);
        blocks[1] = blocks[1].with_data("re-signed").rehashed(HashAlgorithm::Sha256);

        // Block 1 is self-consistent now; block 2 points at the old hash.
        assert_eq!(invalid_block_indices(&blocks), BTreeSet::from([2]));
    }

    #[test]
    fn repair_restores_validity() {
        let mut blocks = build_chain(2);
        tamper(&mut blocks, 2, "edited");
        assert!(!is_chain_valid(&blocks));

        // Repairing the tail has no successor to break.
        blocks[2] = blocks[2].rehashed(HashAlgorithm::Sha256);
        assert!(is_chain_valid(&blocks));
        assert!(invalid_block_indices(&blocks).is_empty());
    }

    #[test]
    fn literal_link_mismatch_is_flagged() {
        let mut blocks = build_chain(2);
        let mut orphan = blocks[2].clone();
        orphan.previous_hash = "ff".repeat(32);
        blocks[2] = orphan.rehashed(HashAlgorithm::Sha256);

        let report = ChainValidator::default().validate(&blocks);
        assert_eq!(report.invalid_indices(), BTreeSet::from([2]));
        assert!(matches!(
            report.faults[0].kind,
            FaultKind::BrokenLink { .. }
        ));
    }

    #[test]
    fn report_lists_both_faults_for_one_block() {
        let mut blocks = build_chain(2);
        let mut broken = blocks[1].with_data("edited");
        broken.previous_hash = "abc".into();
        blocks[1] = broken;

        let report = ChainValidator::default().validate(&blocks);
        assert_eq!(report.faults_at(1).count(), 2);
        assert_eq!(report.invalid_indices(), BTreeSet::from([1]));
    }

    #[test]
    fn cascading_policy_flags_the_successor() {
        let mut blocks = build_chain(4);
        tamper(&mut blocks, 2, "edited");

        let cascading =
            ChainValidator::new(HashAlgorithm::Sha256).with_link_policy(LinkPolicy::RecomputedHash);
        assert_eq!(cascading.invalid_indices(&blocks), BTreeSet::from([2, 3]));
        assert!(!cascading.is_valid(&blocks));

        // The default policy still reports just the tampered block.
        assert_eq!(invalid_block_indices(&blocks), BTreeSet::from([2]));
    }

    #[test]
    fn wrong_algorithm_invalidates_every_mined_block() {
        let blocks = build_chain(2);
        let blake = ChainValidator::new(HashAlgorithm::Blake3);
        assert_eq!(blake.invalid_indices(&blocks), BTreeSet::from([1, 2]));
    }

    #[test]
    fn is_valid_agrees_with_invalid_indices() {
        let mut blocks = build_chain(3);
        let validator = ChainValidator::default();
        assert_eq!(validator.is_valid(&blocks), validator.invalid_indices(&blocks).is_empty());

        tamper(&mut blocks, 1, "x");
        assert_eq!(validator.is_valid(&blocks), validator.invalid_indices(&blocks).is_empty());
    }

    #[test]
    fn fault_serializes_with_kind_tag() {
        let fault = BlockFault {
            position: 3,
            kind: FaultKind::BrokenLink {
                expected: "aa".into(),
                found: "bb".into(),
            },
        };
        let json = serde_json::to_value(&fault).expect("serialize");
        assert_eq!(json["position"], 3);
        assert_eq!(json["kind"], "broken_link");
        assert_eq!(json["expected"], "aa");
    }
}
