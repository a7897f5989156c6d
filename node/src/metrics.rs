//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything is registered in a dedicated [`prometheus::Registry`]
//! under the `chainlab` prefix.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks appended by a successful search.
    pub blocks_mined_total: IntCounter,
    /// Hashes computed across all successful searches.
    pub mining_attempts_total: IntCounter,
    pub mining_cancelled_total: IntCounter,
    /// Tamper and re-sign edits.
    pub tamper_events_total: IntCounter,
    /// Blocks in the chain, genesis included.
    pub chain_length: IntGauge,
    /// 1 when the last validation passed, 0 otherwise.
    pub chain_valid: IntGauge,
    pub mining_duration_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chainlab".into()), None)?;

        let blocks_mined_total = IntCounter::new("blocks_mined_total", "Blocks mined and appended")?;
        let mining_attempts_total = IntCounter::new(
            "mining_attempts_total",
            "Hashes computed by successful mining searches",
        )?;
        let mining_cancelled_total =
            IntCounter::new("mining_cancelled_total", "Mining searches cancelled")?;
        let tamper_events_total =
            IntCounter::new("tamper_events_total", "Block data edits, re-signed or not")?;
        let chain_length = IntGauge::new("chain_length", "Blocks in the chain, genesis included")?;
        let chain_valid = IntGauge::new("chain_valid", "1 if the chain currently validates")?;
        let mining_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mining_duration_seconds",
                "Wall-clock time of successful mining searches",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0]),
        )?;

        registry.register(Box::new(blocks_mined_total.clone()))?;
        registry.register(Box::new(mining_attempts_total.clone()))?;
        registry.register(Box::new(mining_cancelled_total.clone()))?;
        registry.register(Box::new(tamper_events_total.clone()))?;
        registry.register(Box::new(chain_length.clone()))?;
        registry.register(Box::new(chain_valid.clone()))?;
        registry.register(Box::new(mining_duration_seconds.clone()))?;

        chain_length.set(1);
        chain_valid.set(1);

        Ok(Self {
            registry,
            blocks_mined_total,
            mining_attempts_total,
            mining_cancelled_total,
            tamper_events_total,
            chain_length,
            chain_valid,
            mining_duration_seconds,
        })
    }

    /// Updates the chain gauges after a mutation.
    pub fn observe_chain(&self, length: usize, valid: bool) {
        self.chain_length.set(length as i64);
        self.chain_valid.set(i64::from(valid));
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
