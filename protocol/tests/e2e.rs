//! End-to-end integration tests for chainlab.
//!
//! These walk the full life of a chain through the public API: genesis,
//! mining, tamper detection, re-signing, repair, and the async producer.
//! Each test builds its own chain.

use std::collections::BTreeSet;

use chainlab_protocol::config::{GENESIS_DATA, SAMPLE_TRANSACTIONS};
use chainlab_protocol::crypto::hash::{calculate_hash, HashAlgorithm};
use chainlab_protocol::mining::{mine_block, BlockProducer, ProducerConfig, ProductionError};
use chainlab_protocol::storage::{Block, Chain, ChainError};
use chainlab_protocol::validation::{
    invalid_block_indices, is_chain_valid, ChainValidator, LinkPolicy,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Genesis followed by one mined block per entry of `data`.
fn mined_chain(data: &[&str], difficulty: u32) -> Vec<Block> {
    let mut blocks = vec![Block::genesis()];
    for (i, payload) in data.iter().enumerate() {
        let tip = blocks[blocks.len() - 1].hash.clone();
        blocks.push(mine_block(i as u64 + 1, payload, &tip, difficulty));
    }
    blocks
}

fn quick_producer() -> BlockProducer {
    BlockProducer::new(ProducerConfig {
        auto_mine_step_delay: std::time::Duration::ZERO,
        ..ProducerConfig::default()
    })
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[test]
fn alice_pays_bob_tamper_scenario() {
    let genesis = Block::genesis();
    assert_eq!(genesis.data, GENESIS_DATA);
    assert_eq!(
        genesis.hash,
        "988c37d9df7b23e7462ca89ec726f16480efc0f7d7d42e17c0a4adc3b334b96b"
    );

    let block = mine_block(1, "Alice pays Bob 10 BTC", &genesis.hash, 2);
    assert!(block.hash.starts_with("00"));

    let mut chain = vec![genesis, block];
    assert!(is_chain_valid(&chain));
    assert!(invalid_block_indices(&chain).is_empty());

    chain[1] = chain[1].with_data("Alice pays Bob 1000 BTC");
    assert!(!is_chain_valid(&chain));
    assert_eq!(invalid_block_indices(&chain), BTreeSet::from([1]));
}

#[test]
fn genesis_only_chain_is_valid() {
    let chain = vec![Block::genesis()];
    assert!(is_chain_valid(&chain));
    assert!(invalid_block_indices(&chain).is_empty());
}

// ---------------------------------------------------------------------------
// Validity across lengths and difficulties
// ---------------------------------------------------------------------------

#[test]
fn sequential_mines_are_valid_at_every_difficulty() {
    for difficulty in 0..=3 {
        let data: Vec<String> = (0..4).map(|i| format!("d{difficulty} tx{i}")).collect();
        let refs: Vec<&str> = data.iter().map(String::as_str).collect();
        let chain = mined_chain(&refs, difficulty);

        assert!(is_chain_valid(&chain), "difficulty {difficulty}");
        assert!(invalid_block_indices(&chain).is_empty());
        for block in &chain[1..] {
            assert!(block.hash.starts_with(&"0".repeat(difficulty as usize)));
            assert_eq!(
                block.hash,
                calculate_hash(
                    block.index,
                    &block.previous_hash,
                    block.timestamp,
                    &block.data,
                    block.nonce
                )
            );
        }
    }
}

#[test]
fn tampering_each_position_flags_only_that_position() {
    let base = mined_chain(&["a", "b", "c", "d", "e"], 1);

    for k in 1..base.len() {
        let mut chain = base.clone();
        chain[k] = chain[k].with_data("forged");
        assert_eq!(invalid_block_indices(&chain), BTreeSet::from([k]), "k = {k}");
        assert!(!is_chain_valid(&chain));

        // Repair puts it back in order.
        chain[k] = chain[k].rehashed(HashAlgorithm::Sha256);
        if k == chain.len() - 1 {
            assert!(is_chain_valid(&chain));
        } else {
            // A repaired middle block has a new hash its successor never saw.
            assert!(!invalid_block_indices(&chain).contains(&k));
            assert_eq!(invalid_block_indices(&chain), BTreeSet::from([k + 1]));
        }
    }
}

#[test]
fn cascading_validator_is_opt_in() {
    let mut chain = mined_chain(&["a", "b", "c"], 1);
    chain[1] = chain[1].with_data("forged");

    assert_eq!(invalid_block_indices(&chain), BTreeSet::from([1]));

    let cascading =
        ChainValidator::new(HashAlgorithm::Sha256).with_link_policy(LinkPolicy::RecomputedHash);
    assert_eq!(cascading.invalid_indices(&chain), BTreeSet::from([1, 2]));
}

// ---------------------------------------------------------------------------
// Chain owner
// ---------------------------------------------------------------------------

#[test]
fn chain_owner_full_cycle() {
    let mut chain = Chain::new();
    for data in SAMPLE_TRANSACTIONS {
        let block = mine_block(chain.next_index(), data, &chain.tip().hash, 2);
        chain.append(block).expect("append");
    }
    assert_eq!(chain.len(), 4);
    assert!(chain.is_valid());

    chain.tamper(2, "Bob pays Charlie 500 BTC").expect("tamper");
    assert_eq!(chain.invalid_indices(), BTreeSet::from([2]));

    chain.repair(2).expect("repair");
    assert_eq!(chain.invalid_indices(), BTreeSet::from([3]));

    assert_eq!(chain.tamper(0, "x").err(), Some(ChainError::GenesisLocked));
    assert_eq!(chain.repair(9).err(), Some(ChainError::BlockNotFound(9)));
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn producer_auto_mine_then_tamper() {
    let producer = quick_producer();
    let mined = producer
        .auto_mine(&SAMPLE_TRANSACTIONS[..], 2, |_| {})
        .await
        .expect("auto-mine");
    assert_eq!(mined.len(), 3);
    assert!(mined.iter().all(|m| m.block.hash.starts_with("00")));
    assert!(producer.is_valid());

    producer.tamper(1, "Alice pays Bob 1000 BTC").expect("tamper");
    assert_eq!(producer.invalid_indices(), BTreeSet::from([1]));

    producer.repair(1).expect("repair");
    assert_eq!(producer.invalid_indices(), BTreeSet::from([2]));
}

#[tokio::test]
async fn producer_surfaces_chain_errors() {
    let producer = quick_producer();
    assert_eq!(
        producer.repair(3).err(),
        Some(ProductionError::Chain(ChainError::BlockNotFound(3)))
    );
    assert_eq!(
        producer.mine_next("", 1).await.err(),
        Some(ProductionError::EmptyData)
    );
}
