//! # CLI Interface
//!
//! Defines the command-line argument structure for `chainlab-node` using
//! `clap` derive. Supports four subcommands: `run`, `demo`, `mine`,
//! and `version`.

use clap::{Args, Parser, Subcommand, ValueEnum};

use chainlab_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_BIND_ADDRESS, DEFAULT_DIFFICULTY, DEFAULT_MAX_DIFFICULTY,
    DEFAULT_METRICS_PORT,
};
use chainlab_protocol::crypto::hash::HashAlgorithm;

use crate::logging::LogFormat;

/// chainlab node.
///
/// Serves an educational proof-of-work blockchain over a local HTTP and
/// WebSocket API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "chainlab-node",
    about = "chainlab educational blockchain node",
    version,
    propagate_version = true
)]
pub struct ChainlabCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the chainlab node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API and metrics servers.
    Run(RunArgs),
    /// Walk through mining, tampering and repair in the terminal.
    Demo(DemoArgs),
    /// Mine one block on a fresh chain and print it as JSON.
    Mine(MineArgs),
    /// Print version information and exit.
    Version,
}

/// Chain settings shared by every subcommand that builds a chain.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// Number of leading zero hex digits a block hash must have.
    #[arg(long, short = 'D', env = "CHAINLAB_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Highest difficulty a mining request may ask for.
    #[arg(long, env = "CHAINLAB_MAX_DIFFICULTY", default_value_t = DEFAULT_MAX_DIFFICULTY)]
    pub max_difficulty: u32,

    /// Block hash algorithm, fixed for the lifetime of the chain.
    #[arg(long, value_enum, env = "CHAINLAB_ALGORITHM", default_value_t = AlgorithmArg::Sha256)]
    pub algorithm: AlgorithmArg,

    /// Log output format.
    #[arg(long, value_enum, env = "CHAINLAB_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Address the API and metrics servers bind to.
    #[arg(long, env = "CHAINLAB_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "CHAINLAB_PORT", default_value_t = DEFAULT_API_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CHAINLAB_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    #[command(flatten)]
    pub chain: ChainArgs,
}

/// Arguments for the `demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Replacement data written into block 1.
    #[arg(long, default_value = "Alice pays Bob 1000 BTC")]
    pub tamper_with: String,

    #[command(flatten)]
    pub chain: ChainArgs,
}

/// Arguments for the `mine` subcommand.
#[derive(Args, Debug)]
pub struct MineArgs {
    /// Block data to seal.
    pub data: String,

    #[command(flatten)]
    pub chain: ChainArgs,
}

/// Hash algorithm as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmArg {
    Sha256,
    Blake3,
}

impl From<AlgorithmArg> for HashAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Sha256 => HashAlgorithm::Sha256,
            AlgorithmArg::Blake3 => HashAlgorithm::Blake3,
        }
    }
}
