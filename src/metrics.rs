//! Metrics (§10.4) — the counters named in §7's "user-visible behavior"
//! plus per-stage latency histograms, exposed over a minimal `axum`
//! `/metrics` endpoint. The teacher declares `prometheus` and `axum` but
//! never wires either together; this is the first real use of both.

use axum::{routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub struct Metrics {
    pub opportunities_found: IntCounter,
    pub opportunities_filtered: IntCounterVec,
    pub opportunities_attempted: IntCounter,
    pub opportunities_succeeded: IntCounter,
    pub opportunities_failed: IntCounter,
    pub total_borrowed_lamports: IntCounter,
    pub total_profit_lamports: IntCounter,
    pub total_loss_lamports: IntCounter,
    pub aggregator_failures: IntCounterVec,
    pub simulation_filtered: IntCounter,
    pub saved_gas_lamports: IntCounter,
    pub stage_latency_ms: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let opportunities_found =
            IntCounter::new("opportunities_found_total", "opportunities discovered by the finder")?;
        let opportunities_filtered = IntCounterVec::new(
            Opts::new("opportunities_filtered_total", "opportunities dropped before submission"),
            &["reason"],
        )?;
        let opportunities_attempted =
            IntCounter::new("opportunities_attempted_total", "opportunities submitted to the block-engine")?;
        let opportunities_succeeded =
            IntCounter::new("opportunities_succeeded_total", "opportunities that confirmed successfully")?;
        let opportunities_failed =
            IntCounter::new("opportunities_failed_total", "opportunities that confirmed with an error or timed out")?;
        let total_borrowed_lamports =
            IntCounter::new("total_borrowed_lamports", "cumulative flash-loan principal borrowed")?;
        let total_profit_lamports =
            IntCounter::new("total_profit_lamports", "cumulative realized profit")?;
        let total_loss_lamports =
            IntCounter::new("total_loss_lamports", "cumulative realized loss")?;
        let aggregator_failures = IntCounterVec::new(
            Opts::new("aggregator_failures_total", "aggregator request failures"),
            &["kind"],
        )?;
        let simulation_filtered = IntCounter::new(
            "simulation_filtered_total",
            "opportunities rejected by the simulation gate",
        )?;
        let saved_gas_lamports = IntCounter::new(
            "saved_gas_lamports_total",
            "estimated gas saved by filtering before submission",
        )?;
        let stage_latency_ms = HistogramVec::new(
            prometheus::HistogramOpts::new("stage_latency_ms", "per-stage latency in milliseconds"),
            &["stage"],
        )?;

        REGISTRY.register(Box::new(opportunities_found.clone()))?;
        REGISTRY.register(Box::new(opportunities_filtered.clone()))?;
        REGISTRY.register(Box::new(opportunities_attempted.clone()))?;
        REGISTRY.register(Box::new(opportunities_succeeded.clone()))?;
        REGISTRY.register(Box::new(opportunities_failed.clone()))?;
        REGISTRY.register(Box::new(total_borrowed_lamports.clone()))?;
        REGISTRY.register(Box::new(total_profit_lamports.clone()))?;
        REGISTRY.register(Box::new(total_loss_lamports.clone()))?;
        REGISTRY.register(Box::new(aggregator_failures.clone()))?;
        REGISTRY.register(Box::new(simulation_filtered.clone()))?;
        REGISTRY.register(Box::new(saved_gas_lamports.clone()))?;
        REGISTRY.register(Box::new(stage_latency_ms.clone()))?;

        Ok(Self {
            opportunities_found,
            opportunities_filtered,
            opportunities_attempted,
            opportunities_succeeded,
            opportunities_failed,
            total_borrowed_lamports,
            total_profit_lamports,
            total_loss_lamports,
            aggregator_failures,
            simulation_filtered,
            saved_gas_lamports,
            stage_latency_ms,
        })
    }

    pub fn record_filtered(&self, reason: &str) {
        self.opportunities_filtered.with_label_values(&[reason]).inc();
    }

    pub fn record_aggregator_failure(&self, kind: &str) {
        self.aggregator_failures.with_label_values(&[kind]).inc();
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Serve `/metrics` on `addr` until the process exits.
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
