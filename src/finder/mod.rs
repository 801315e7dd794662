//! Opportunity Finder (§4.1).
//!
//! A fixed pool of workers round-robins over the configured `(input,
//! bridge)` asset pairs, probing an outbound and return quote each tick and
//! emitting an `Opportunity` whenever the round trip clears
//! `min_profit_lamports`. Workers share no state but the aggregator client
//! and an atomic shutdown flag — grounded on the independent-task-per-pair
//! worker-pool shape of `rust-modules/src/strategies/mod.rs`, simplified to
//! a single stateless probe loop per worker instead of that module's
//! strategy-registry dispatch.

use crate::aggregator::{AggregatorClient, QuoteParams};
use crate::config::{AssetUniverseConfig, FinderConfig};
use crate::metrics::Metrics;
use crate::types::{Asset, Opportunity};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One `(input, bridge)` cycle the finder probes: `input -> bridge -> input`.
#[derive(Debug, Clone, Copy)]
struct AssetPair {
    input: Asset,
    bridge: Asset,
    query_amount: u64,
}

fn build_pairs(universe: &AssetUniverseConfig) -> Vec<AssetPair> {
    let mut pairs = Vec::new();
    for input_cfg in &universe.input_assets {
        let input_mint = match Pubkey::from_str(&input_cfg.mint) {
            Ok(m) => m,
            Err(_) => {
                warn!(mint = %input_cfg.mint, "skipping input asset with unparsable mint");
                continue;
            }
        };
        let input = Asset::new(input_mint, input_cfg.decimals);
        for bridge_cfg in &universe.bridge_assets {
            if bridge_cfg.mint == input_cfg.mint {
                continue;
            }
            let bridge_mint = match Pubkey::from_str(&bridge_cfg.mint) {
                Ok(m) => m,
                Err(_) => {
                    warn!(mint = %bridge_cfg.mint, "skipping bridge asset with unparsable mint");
                    continue;
                }
            };
            pairs.push(AssetPair {
                input,
                bridge: Asset::new(bridge_mint, bridge_cfg.decimals),
                query_amount: input_cfg.query_amount,
            });
        }
    }
    pairs
}

/// Probes `(input, bridge)` cycles on a fixed interval and hands any
/// profitable round trip to the pipeline via an unbounded channel.
pub struct Finder {
    aggregator: Arc<AggregatorClient>,
    pairs: Vec<AssetPair>,
    cfg: FinderConfig,
    slippage_bps: u16,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
}

impl Finder {
    pub fn new(
        aggregator: Arc<AggregatorClient>,
        universe: &AssetUniverseConfig,
        cfg: FinderConfig,
        slippage_bps: u16,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            aggregator,
            pairs: build_pairs(universe),
            cfg,
            slippage_bps,
            metrics,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spin up `worker_count` workers, each assigned a disjoint, round-robin
    /// slice of the pair set, and return their join handles. Opportunities
    /// are sent on `out`; the channel outliving the workers is the caller's
    /// responsibility.
    pub fn start(self: &Arc<Self>, out: mpsc::UnboundedSender<Opportunity>) -> Vec<JoinHandle<()>> {
        if self.pairs.is_empty() {
            warn!("finder has no asset pairs configured; no workers started");
            return Vec::new();
        }
        self.running.store(true, Ordering::SeqCst);

        let worker_count = self.cfg.worker_count.max(1).min(self.pairs.len());
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let finder = Arc::clone(self);
            let out = out.clone();
            handles.push(tokio::spawn(async move {
                finder.run_worker(worker_id, worker_count, out).await;
            }));
        }
        info!(worker_count, pairs = self.pairs.len(), "finder started");
        handles
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        worker_count: usize,
        out: mpsc::UnboundedSender<Opportunity>,
    ) {
        let mut cursor = worker_id;
        while self.running.load(Ordering::SeqCst) {
            let pair = self.pairs[cursor % self.pairs.len()];
            cursor += worker_count;

            match self.probe(pair).await {
                Ok(Some(opportunity)) => {
                    self.metrics.opportunities_found.inc();
                    debug!(
                        profit = %opportunity.profit(),
                        input = %pair.input,
                        bridge = %pair.bridge,
                        "opportunity found"
                    );
                    if out.send(opportunity).is_err() {
                        warn!("opportunity channel closed; stopping worker");
                        return;
                    }
                }
                Ok(None) => {}
                Err(kind) => {
                    self.metrics.record_aggregator_failure(kind);
                }
            }

            tokio::time::sleep(Duration::from_millis(self.cfg.query_interval_ms)).await;
        }
    }

    /// Quote `input -> bridge`, then `bridge -> input` on the returned
    /// amount, and return an `Opportunity` if the round trip clears the
    /// configured profit floor. Both quotes use the most liberal canonical
    /// strategy (§4.3) since the Finder only needs a profit estimate, not a
    /// submittable route.
    async fn probe(&self, pair: AssetPair) -> Result<Option<Opportunity>, &'static str> {
        let params = QuoteParams {
            slippage_bps: self.slippage_bps,
            only_direct_routes: false,
            max_accounts: crate::types::Strategy::CANONICAL[0].max_accounts,
            restrict_intermediate_tokens: true,
        };

        let outbound_start = Instant::now();
        let outbound = self
            .aggregator
            .quote(pair.input, pair.bridge, pair.query_amount, params, None)
            .await
            .map_err(|_| "outbound_quote")?;
        let latency_outbound_ms = outbound_start.elapsed().as_millis() as u64;

        let return_start = Instant::now();
        let return_quote = self
            .aggregator
            .quote(pair.bridge, pair.input, outbound.output_amount, params, None)
            .await
            .map_err(|_| "return_quote")?;
        let latency_return_ms = return_start.elapsed().as_millis() as u64;

        let profit = return_quote.output_amount as i128 - pair.query_amount as i128;
        if profit < self.cfg.min_profit_lamports as i128 {
            return Ok(None);
        }

        Ok(Some(Opportunity {
            input_asset: pair.input,
            bridge_asset: pair.bridge,
            output_asset: pair.input,
            input_amount: pair.query_amount,
            bridge_amount: outbound.output_amount,
            output_amount: return_quote.output_amount,
            outbound_quote: outbound,
            return_quote,
            discovered_at: Instant::now(),
            latency_outbound_ms,
            latency_return_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetConfig;

    fn universe() -> AssetUniverseConfig {
        AssetUniverseConfig {
            input_assets: vec![AssetConfig {
                mint: "So11111111111111111111111111111111111111112".to_string(),
                decimals: 9,
                query_amount: 1_000_000_000,
            }],
            bridge_assets: vec![
                AssetConfig {
                    mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                    decimals: 6,
                    query_amount: 1_000_000_000,
                },
                AssetConfig {
                    mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string(),
                    decimals: 6,
                    query_amount: 1_000_000_000,
                },
            ],
        }
    }

    #[test]
    fn builds_cartesian_product_of_input_and_bridge_assets() {
        let pairs = build_pairs(&universe());
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn skips_bridge_asset_identical_to_input() {
        let mut u = universe();
        u.bridge_assets.push(AssetConfig {
            mint: "So11111111111111111111111111111111111111112".to_string(),
            decimals: 9,
            query_amount: 1_000_000_000,
        });
        let pairs = build_pairs(&u);
        assert_eq!(pairs.len(), 2);
    }
}
