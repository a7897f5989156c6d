//! # Mining
//!
//! Proof-of-work search ([`miner`]) and the serialized, cancellable
//! pipeline that appends mined blocks to a shared chain ([`producer`]).

pub mod miner;
pub mod producer;

pub use miner::{
    difficulty_target, meets_difficulty, mine_block, CancelToken, MinedBlock, Miner, MiningError,
};
pub use producer::{
    AutoMineProgress, BlockProducer, MiningEvent, ProducerConfig, ProductionError, ProductionResult,
};
