//! # Block Production Pipeline
//!
//! The `BlockProducer` ties the chain and the miner together so that an
//! interactive front end can mine without freezing:
//!
//! ```text
//! 1. CHECK    — trim the data, enforce the difficulty ceiling
//! 2. GATE     — take the mining gate (one search in flight, ever)
//! 3. SNAPSHOT — read next index and tip hash under a read lock
//! 4. SEARCH   — run the proof-of-work on a blocking thread
//! 5. APPEND   — push the block under a write lock
//! ```
//!
//! The chain lock is never held across the search, so readers (validity
//! badges, block listings) stay responsive while mining runs. Tampering
//! with the tip while a search is in flight makes the append fail with
//! [`ChainError::StaleTip`] instead of forking the chain.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use super::miner::{CancelToken, MinedBlock, Miner, MiningError};
use crate::config::{AUTO_MINE_STEP_DELAY, DEFAULT_MAX_DIFFICULTY};
use crate::crypto::hash::HashAlgorithm;
use crate::storage::block::Block;
use crate::storage::chain::{Chain, ChainError, LedgerEntry};
use crate::validation::validator::ValidationReport;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for the producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Hash algorithm for a freshly created chain.
    pub algorithm: HashAlgorithm,

    /// Highest difficulty a request may ask for. The miner itself has no
    /// ceiling; this keeps an interactive session from stalling for hours.
    pub max_difficulty: u32,

    /// Pause between blocks during auto-mine so progress is observable.
    pub auto_mine_step_delay: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            max_difficulty: DEFAULT_MAX_DIFFICULTY,
            auto_mine_step_delay: AUTO_MINE_STEP_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur while producing or editing blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductionError {
    /// Another search holds the mining gate.
    #[error("a block is already being mined")]
    Busy,

    /// The block data was empty after trimming.
    #[error("block data must not be empty")]
    EmptyData,

    #[error("difficulty {requested} exceeds the maximum of {max}")]
    DifficultyTooHigh { requested: u32, max: u32 },

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The blocking mining task panicked or was aborted.
    #[error("mining worker failed: {0}")]
    Worker(String),
}

pub type ProductionResult<T> = Result<T, ProductionError>;

/// Position within an auto-mine run, reported before each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoMineProgress {
    /// 1-based number of the block about to be mined.
    pub current: usize,
    pub total: usize,
}

/// Lifecycle notifications from an observed search.
///
/// Delivered synchronously, in order: `Progress` (auto-mine only), then
/// `Started` once the request is accepted and holds the gate, then `Mined`
/// once the block is on the chain. A rejected request reports nothing.
#[derive(Debug, Clone, Copy)]
pub enum MiningEvent<'a> {
    Progress(AutoMineProgress),
    /// The search for block `index` began.
    Started { index: u64, difficulty: u32 },
    /// The block was appended.
    Mined(&'a MinedBlock),
}

// ---------------------------------------------------------------------------
// BlockProducer
// ---------------------------------------------------------------------------

/// Serializes mining requests against a shared chain.
pub struct BlockProducer {
    chain: Arc<RwLock<Chain>>,
    miner: Miner,
    config: ProducerConfig,

    /// Held for the whole duration of a search (or an auto-mine run).
    gate: tokio::sync::Mutex<()>,

    /// Token of the search currently holding the gate.
    in_flight: Mutex<Option<CancelToken>>,
}

impl BlockProducer {
    /// Creates a producer over a new genesis-only chain.
    pub fn new(config: ProducerConfig) -> Self {
        let chain = Arc::new(RwLock::new(Chain::with_algorithm(config.algorithm)));
        Self::from_chain(chain, config)
    }

    /// Creates a producer over an existing chain. The miner follows the
    /// chain's algorithm; `config.algorithm` is ignored.
    pub fn from_chain(chain: Arc<RwLock<Chain>>, config: ProducerConfig) -> Self {
        let miner = Miner::new(chain.read().algorithm());
        Self {
            chain,
            miner,
            config,
            gate: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Shared handle to the chain.
    pub fn chain(&self) -> Arc<RwLock<Chain>> {
        Arc::clone(&self.chain)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.miner.algorithm()
    }

    /// True while a search holds the mining gate.
    pub fn is_mining(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Mines one block onto the tip, waiting for any in-flight search first.
    pub async fn mine_next(&self, data: &str, difficulty: u32) -> ProductionResult<MinedBlock> {
        let data = self.check_request(data, difficulty)?;
        let guard = self.gate.lock().await;
        self.mine_gated(guard, data, difficulty, &mut |_: MiningEvent<'_>| {})
            .await
    }

    /// Mines one block onto the tip, failing with [`ProductionError::Busy`]
    /// if a search is already running.
    pub async fn try_mine_next(
        &self,
        data: &str,
        difficulty: u32,
    ) -> ProductionResult<MinedBlock> {
        self.try_mine_next_observed(data, difficulty, |_| {}).await
    }

    /// [`try_mine_next`](Self::try_mine_next) that reports
    /// [`MiningEvent::Started`] and [`MiningEvent::Mined`] to `on_event`.
    pub async fn try_mine_next_observed<F>(
        &self,
        data: &str,
        difficulty: u32,
        mut on_event: F,
    ) -> ProductionResult<MinedBlock>
    where
        F: FnMut(MiningEvent<'_>),
    {
        let data = self.check_request(data, difficulty)?;
        let guard = self.gate.try_lock().map_err(|_| ProductionError::Busy)?;
        self.mine_gated(guard, data, difficulty, &mut on_event).await
    }

    /// Mines each sample in order under a single gate acquisition.
    ///
    /// `on_event` sees `Progress` and `Started` before every block and
    /// `Mined` as soon as it is appended. The run stops at the first error,
    /// including a cancel that lands between blocks; blocks already
    /// appended stay on the chain. Fails fast with
    /// [`ProductionError::Busy`] if a search is already running.
    pub async fn auto_mine<S, F>(
        &self,
        samples: &[S],
        difficulty: u32,
        mut on_event: F,
    ) -> ProductionResult<Vec<MinedBlock>>
    where
        S: AsRef<str>,
        F: FnMut(MiningEvent<'_>),
    {
        let requests = samples
            .iter()
            .map(|s| self.check_request(s.as_ref(), difficulty))
            .collect::<ProductionResult<Vec<_>>>()?;

        let _guard = self.gate.try_lock().map_err(|_| ProductionError::Busy)?;
        let slot = InFlight::arm(&self.in_flight);
        let total = requests.len();
        let mut mined = Vec::with_capacity(total);

        info!(total, difficulty, "auto-mine started");

        for (i, data) in requests.into_iter().enumerate() {
            if i > 0 && !self.config.auto_mine_step_delay.is_zero() {
                tokio::time::sleep(self.config.auto_mine_step_delay).await;
            }
            if slot.token.is_cancelled() {
                let index = self.chain.read().next_index();
                debug!(index, "auto-mine cancelled between blocks");
                return Err(MiningError::Cancelled { index, attempts: 0 }.into());
            }
            on_event(MiningEvent::Progress(AutoMineProgress {
                current: i + 1,
                total,
            }));
            mined.push(
                self.search_and_append(data, difficulty, &slot.token, &mut on_event)
                    .await?,
            );
        }

        info!(total, "auto-mine finished");
        Ok(mined)
    }

    /// Stops the in-flight search, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                debug!("cancel requested");
                true
            }
            None => false,
        }
    }

    // -- Chain access -------------------------------------------------------

    /// Copy of every block, genesis first.
    pub fn snapshot(&self) -> Vec<Block> {
        self.chain.read().blocks().to_vec()
    }

    pub fn block(&self, position: usize) -> Option<Block> {
        self.chain.read().get(position).cloned()
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.chain.read().ledger()
    }

    pub fn is_valid(&self) -> bool {
        self.chain.read().is_valid()
    }

    pub fn invalid_indices(&self) -> BTreeSet<usize> {
        self.chain.read().invalid_indices()
    }

    pub fn validate(&self) -> ValidationReport {
        self.chain.read().validate()
    }

    pub fn tamper(&self, position: usize, data: &str) -> ProductionResult<Block> {
        let block = self.chain.write().tamper(position, data)?.clone();
        warn!(position, "block data tampered");
        Ok(block)
    }

    pub fn tamper_and_rehash(&self, position: usize, data: &str) -> ProductionResult<Block> {
        let block = self.chain.write().tamper_and_rehash(position, data)?.clone();
        warn!(position, "block data tampered and re-signed");
        Ok(block)
    }

    pub fn repair(&self, position: usize) -> ProductionResult<Block> {
        let block = self.chain.write().repair(position)?.clone();
        info!(position, hash = %block.short_hash(), "block hash repaired");
        Ok(block)
    }

    // -- Internals ----------------------------------------------------------

    fn check_request(&self, data: &str, difficulty: u32) -> ProductionResult<String> {
        let data = data.trim();
        if data.is_empty() {
            return Err(ProductionError::EmptyData);
        }
        if difficulty > self.config.max_difficulty {
            return Err(ProductionError::DifficultyTooHigh {
                requested: difficulty,
                max: self.config.max_difficulty,
            });
        }
        Ok(data.to_string())
    }

    async fn mine_gated<F>(
        &self,
        _guard: MutexGuard<'_, ()>,
        data: String,
        difficulty: u32,
        on_event: &mut F,
    ) -> ProductionResult<MinedBlock>
    where
        F: FnMut(MiningEvent<'_>),
    {
        let slot = InFlight::arm(&self.in_flight);
        self.search_and_append(data, difficulty, &slot.token, on_event)
            .await
    }

    async fn search_and_append<F>(
        &self,
        data: String,
        difficulty: u32,
        cancel: &CancelToken,
        on_event: &mut F,
    ) -> ProductionResult<MinedBlock>
    where
        F: FnMut(MiningEvent<'_>),
    {
        let (index, previous_hash) = {
            let chain = self.chain.read();
            (chain.next_index(), chain.tip().hash.clone())
        };

        debug!(index, difficulty, "mining started");
        on_event(MiningEvent::Started { index, difficulty });

        let miner = self.miner;
        let token = cancel.clone();
        let mined = tokio::task::spawn_blocking(move || {
            miner.mine_cancellable(index, &data, &previous_hash, difficulty, &token)
        })
        .await
        .map_err(|e| ProductionError::Worker(e.to_string()))??;

        self.chain.write().append(mined.block.clone())?;

        info!(
            index,
            nonce = mined.block.nonce,
            attempts = mined.attempts,
            hash = %mined.block.short_hash(),
            elapsed_ms = mined.elapsed.as_millis() as u64,
            "block appended"
        );
        on_event(MiningEvent::Mined(&mined));

        Ok(mined)
    }
}

/// Publishes a fresh cancel token for the duration of a search.
///
/// Dropping it cancels the token, so a search whose caller went away
/// stops on its next poll.
struct InFlight<'a> {
    slot: &'a Mutex<Option<CancelToken>>,
    token: CancelToken,
}

impl<'a> InFlight<'a> {
    fn arm(slot: &'a Mutex<Option<CancelToken>>) -> Self {
        let token = CancelToken::new();
        *slot.lock() = Some(token.clone());
        Self { slot, token }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        *self.slot.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
