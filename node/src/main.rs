// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainlab Node
//!
//! Entry point for the `chainlab-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the chain over HTTP/WS.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — serve the API and metrics endpoints
//! - `demo`    — mine, tamper and repair in the terminal
//! - `mine`    — mine a single block and print it as JSON
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;

use chainlab_protocol::config::SAMPLE_TRANSACTIONS;
use chainlab_protocol::mining::{BlockProducer, MiningEvent, ProducerConfig};
use chainlab_protocol::storage::Block;

use cli::{ChainArgs, ChainlabCli, Commands};
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ChainlabCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Demo(args) => run_demo(args).await,
        Commands::Mine(args) => mine_once(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn init_logging(chain: &ChainArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, chain.log_format)
        .context("failed to initialize logging")
}

fn build_producer(chain: &ChainArgs) -> Result<BlockProducer> {
    if chain.difficulty > chain.max_difficulty {
        anyhow::bail!(
            "difficulty {} exceeds --max-difficulty {}",
            chain.difficulty,
            chain.max_difficulty
        );
    }
    Ok(BlockProducer::new(ProducerConfig {
        algorithm: chain.algorithm.into(),
        max_difficulty: chain.max_difficulty,
        ..ProducerConfig::default()
    }))
}

/// Starts the API and metrics servers and waits for a shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    init_logging(&args.chain)?;

    let producer = Arc::new(build_producer(&args.chain)?);
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    tracing::info!(
        bind = %args.bind,
        port = args.port,
        metrics_port = args.metrics_port,
        difficulty = args.chain.difficulty,
        algorithm = %producer.algorithm(),
        genesis = %producer.block(0).map(|b| b.short_hash()).unwrap_or_default(),
        "starting chainlab-node"
    );

    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            chainlab_protocol::config::PROTOCOL_VERSION,
        ),
        Arc::clone(&producer),
        args.chain.difficulty,
        event_tx,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    // A search left running on a blocking thread would hold up runtime exit.
    producer.cancel();
    tracing::info!("chainlab-node stopped");
    Ok(())
}

/// Auto-mines the sample transactions, tampers with block 1, shows the
/// invalid set, repairs, and shows the chain valid again.
async fn run_demo(args: cli::DemoArgs) -> Result<()> {
    init_logging(&args.chain)?;
    let producer = build_producer(&args.chain)?;
    let difficulty = args.chain.difficulty;

    println!(
        "Mining {} sample transactions at difficulty {} ({})",
        SAMPLE_TRANSACTIONS.len(),
        difficulty,
        producer.algorithm()
    );
    producer
        .auto_mine(&SAMPLE_TRANSACTIONS[..], difficulty, |event| match event {
            MiningEvent::Progress(p) => println!("  [{}/{}] mining...", p.current, p.total),
            MiningEvent::Mined(m) => println!(
                "        block #{} found after {} attempts",
                m.block.index, m.attempts
            ),
            MiningEvent::Started { .. } => {}
        })
        .await
        .context("auto-mine failed")?;
    print_chain(&producer);

    let original = producer
        .block(1)
        .context("block 1 missing after auto-mine")?
        .data;

    println!("Tampering block 1: {:?} -> {:?}", original, args.tamper_with);
    producer.tamper(1, &args.tamper_with)?;
    print_chain(&producer);

    println!("Repairing block 1 with the forged data still in place");
    producer.repair(1)?;
    print_chain(&producer);

    println!("Restoring the original data of block 1 and repairing");
    producer.tamper(1, &original)?;
    producer.repair(1)?;
    print_chain(&producer);

    Ok(())
}

/// Mines one block on a fresh chain and prints it as JSON on stdout.
async fn mine_once(args: cli::MineArgs) -> Result<()> {
    init_logging(&args.chain)?;
    let producer = build_producer(&args.chain)?;

    let mined = producer
        .mine_next(&args.data, args.chain.difficulty)
        .await
        .context("mining failed")?;
    tracing::info!(
        attempts = mined.attempts,
        elapsed_ms = mined.elapsed.as_millis() as u64,
        "block mined"
    );

    let json = serde_json::to_string_pretty(&mined.block).context("failed to encode block")?;
    println!("{json}");
    Ok(())
}

fn print_chain(producer: &BlockProducer) {
    let invalid = producer.invalid_indices();
    for (position, block) in producer.snapshot().iter().enumerate() {
        print_block(block, invalid.contains(&position));
    }
    if invalid.is_empty() {
        println!("Chain valid\n");
    } else {
        println!("Chain INVALID at blocks {:?}\n", invalid);
    }
}

fn print_block(block: &Block, invalid: bool) {
    let marker = if invalid { "✗" } else { "✓" };
    println!(
        "  {marker} #{:<3} {:<28} nonce={:<8} hash={} prev={} time={}",
        block.index,
        block.data,
        block.nonce,
        block.short_hash(),
        block.short_previous_hash(),
        block.display_timestamp(),
    );
}

/// Prints version information to stdout.
fn print_version() {
    println!("chainlab-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", chainlab_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is never delivered.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
