//! # Protocol Configuration & Constants
//!
//! Every fixed literal in chainlab lives here: the genesis fields, the
//! difficulty bounds the UI offers, the sample transactions used by the
//! quick demo, and the default ports of the node.
//!
//! The genesis literals are part of the integrity contract. Change one and
//! every previously computed genesis hash stops matching.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version string reported by the node's `/status` endpoint and CLI.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Genesis Block
// ---------------------------------------------------------------------------

/// Payload of the genesis block.
pub const GENESIS_DATA: &str = "Genesis Block";

/// Sentinel stored in the genesis block's `previous_hash` field. There is
/// no predecessor to point at, so a single `"0"` stands in for one.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Genesis timestamp. Zero is reserved: any block with this timestamp is
/// rendered as "Genesis" rather than a date.
pub const GENESIS_TIMESTAMP: u64 = 0;

/// Genesis nonce. The genesis block is never mined.
pub const GENESIS_NONCE: u64 = 0;

// ---------------------------------------------------------------------------
// Mining
// ---------------------------------------------------------------------------

/// Difficulty a fresh node starts with.
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// Lowest difficulty the difficulty selector offers.
pub const MIN_SELECTABLE_DIFFICULTY: u32 = 1;

/// Highest difficulty the difficulty selector offers. Expected work is
/// roughly `16^difficulty` attempts, so 4 already means ~65k hashes.
pub const MAX_SELECTABLE_DIFFICULTY: u32 = 4;

/// Hard ceiling the block producer enforces on mining requests. The miner
/// itself has no upper bound; this only protects the node from a request
/// that would pin a CPU for hours.
pub const DEFAULT_MAX_DIFFICULTY: u32 = 6;

/// Number of nonce attempts between two polls of the cancellation flag.
pub const CANCEL_POLL_INTERVAL: u64 = 1024;

/// Transactions mined by the "quick demo" auto-mine action, in order.
pub const SAMPLE_TRANSACTIONS: [&str; 3] = [
    "Alice pays Bob 10 BTC",
    "Bob pays Charlie 5 BTC",
    "Charlie pays Dave 3 BTC",
];

/// Pause between two auto-mined blocks so progress events reach
/// subscribers one at a time.
pub const AUTO_MINE_STEP_DELAY: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Number of hex characters kept when a hash is shortened for display.
pub const HASH_PREVIEW_LENGTH: usize = 12;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default bind address of the node API. Loopback only: this is a
/// single-user teaching tool, not a public service.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9750;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9751;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns true if `difficulty` is one of the values the UI lets a user pick.
pub fn is_selectable_difficulty(difficulty: u32) -> bool {
    (MIN_SELECTABLE_DIFFICULTY..=MAX_SELECTABLE_DIFFICULTY).contains(&difficulty)
}
