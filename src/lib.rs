//! Cyclic flash-loan arbitrage executor.
//!
//! Module layout mirrors the data flow (§5): [`finder`] discovers cyclic
//! quote round-trips, [`validator`] prices and gates them, [`assembly`]
//! turns a sized opportunity into compiled swap instructions,
//! [`flash_loan`] wraps the borrow/repay pair, [`alt_manager`] keeps
//! Address Lookup Tables warm, [`simulation`] replays the candidate
//! transaction before anything is signed for submission, [`bundler`] is the
//! two-transaction fallback when a single transaction won't fit, and
//! [`executor`] submits and confirms. [`pipeline`] wires all of the above
//! into one running system; [`config`], [`metrics`], [`notify`] and
//! [`persistence`] are the ambient stack around it.

pub mod aggregator;
pub mod alt_manager;
pub mod assembly;
pub mod bundler;
pub mod config;
pub mod error;
pub mod executor;
pub mod finder;
pub mod flash_loan;
pub mod metrics;
pub mod notify;
pub mod persistence;
pub mod pipeline;
pub mod rpc;
pub mod simulation;
pub mod txbuild;
pub mod types;
pub mod validator;
pub mod wallet;

use crate::alt_manager::AltManager;
use crate::assembly::{AssemblyEngine, RouteComplexityLimits};
use crate::bundler::BundleBuilder;
use crate::config::AppConfig;
use crate::error::StartupError;
use crate::executor::ExecutorAdapter;
use crate::finder::Finder;
use crate::flash_loan::FlashLoanAdapter;
use crate::metrics::Metrics;
use crate::notify::{NoopNotifier, Notifier, WebhookNotifier};
use crate::persistence::{NoopSink, PersistenceSink, PostgresSink};
use crate::pipeline::Pipeline;
use crate::rpc::RpcGateway;
use crate::simulation::SimulationGate;
use crate::validator::CircuitBreaker;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tracing::info;

/// Library version, surfaced over `/metrics` and in startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level facade: owns every long-lived collaborator and exposes the
/// `start`/`stop`/`health_check` lifecycle the binary entry point drives.
/// Grounded on `core/execution/src/lib.rs`'s `ExecutionEngine` facade and
/// `rust-modules/src/lib.rs`'s top-level `initialize`/`cleanup` surface.
pub struct Executor {
    pipeline: Arc<Pipeline>,
    rpc: Arc<RpcGateway>,
    wallet: Arc<Keypair>,
    alt_manager: Arc<AltManager>,
    metrics_addr: std::net::SocketAddr,
}

impl Executor {
    /// Build every collaborator from `cfg` and the process wallet. Does not
    /// start any background work; call `start` for that.
    pub fn build(cfg: AppConfig) -> Result<Self, StartupError> {
        let wallet = Arc::new(wallet::load_keypair(&cfg.wallet)?);
        info!(pubkey = %wallet.pubkey(), "wallet loaded");

        let rpc = Arc::new(RpcGateway::new(
            cfg.rpc.url.clone(),
            cfg.rpc.block_engine_url.clone(),
            &cfg.rpc.commitment,
            cfg.rpc.timeout_ms,
        ));

        let aggregator = Arc::new(crate::aggregator::AggregatorClient::new(
            cfg.aggregator.base_url.clone(),
            cfg.aggregator.max_retries,
            std::time::Duration::from_millis(cfg.rpc.timeout_ms),
        ));

        let metrics = Arc::new(
            Metrics::new().map_err(|e| StartupError::InvalidConfig(e.to_string()))?,
        );

        let alt_manager = Arc::new(AltManager::new(Arc::clone(&rpc), cfg.execution.dry_run));
        let flash_loan = Arc::new(FlashLoanAdapter::new(cfg.flash_loan.provider));
        let simulation = Arc::new(SimulationGate::new(Arc::clone(&rpc)));
        let bundler = Arc::new(BundleBuilder::new());
        let executor = Arc::new(ExecutorAdapter::new(Arc::clone(&rpc), cfg.execution.clone()));
        let circuit_breaker = Arc::new(CircuitBreaker::new(cfg.circuit_breaker));

        let limits = RouteComplexityLimits {
            max_dexes: 4,
            max_accounts_zero_fee: 20,
            max_accounts_fee: 16,
        };
        let assembly = Arc::new(AssemblyEngine::new(
            Arc::clone(&aggregator),
            Arc::clone(&alt_manager),
            Arc::clone(&flash_loan),
            limits,
        ));

        let finder = Arc::new(Finder::new(
            Arc::clone(&aggregator),
            &cfg.assets,
            cfg.finder,
            cfg.aggregator.slippage_bps,
            Arc::clone(&metrics),
        ));

        let notifier: Arc<dyn Notifier> = if cfg.notifications.enabled {
            match &cfg.notifications.webhook_url {
                Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
                None => Arc::new(NoopNotifier),
            }
        } else {
            Arc::new(NoopNotifier)
        };

        // `persistence.enabled` in config is honored in `attach_persistence`,
        // which connects asynchronously after `build` returns; construction
        // always starts from a no-op sink.
        let persistence: Arc<dyn PersistenceSink> = Arc::new(NoopSink);

        let metrics_addr: std::net::SocketAddr = "0.0.0.0:9090".parse().expect("valid socket addr");

        let pipeline = Arc::new(Pipeline::new(
            cfg,
            Arc::clone(&wallet),
            Arc::clone(&rpc),
            finder,
            assembly,
            alt_manager,
            flash_loan,
            simulation,
            bundler,
            executor,
            circuit_breaker,
            metrics,
            notifier,
            persistence,
        ));

        Ok(Self {
            pipeline,
            rpc,
            wallet,
            alt_manager,
            metrics_addr,
        })
    }

    /// ALT Manager lifecycle step (§4.6 Initialize/Preload), run once before
    /// `start`. Split out from `build` because it is async and `build` is
    /// not; a missing provider ALT here just means `ensure_contains` is a
    /// no-op on the hot path until a later run succeeds.
    pub async fn init_alt_manager(&self) -> anyhow::Result<()> {
        if let Err(e) = self.alt_manager.initialize(&self.wallet).await {
            tracing::warn!(error = %e, "ALT initialization failed; continuing without a managed ALT");
        }
        self.alt_manager.preload(&[]).await;
        Ok(())
    }

    /// Connect a `PostgresSink` and swap it into the running pipeline, when
    /// `persistence.enabled` and a reachable `database_url` are both
    /// present. Kept separate from `build` since connecting is async.
    pub async fn attach_persistence(&mut self, database_url: &str) -> anyhow::Result<()> {
        let sink: Arc<dyn PersistenceSink> = Arc::new(PostgresSink::connect(database_url).await?);
        self.pipeline.set_persistence(sink);
        Ok(())
    }

    /// Run the pipeline and the `/metrics` HTTP server until `stop` is
    /// called. The two run concurrently; either returning ends `start`.
    pub async fn start(&self) {
        info!(version = VERSION, wallet = %self.wallet.pubkey(), "executor starting");
        let pipeline = Arc::clone(&self.pipeline);
        tokio::select! {
            _ = pipeline.run() => {}
            res = metrics::serve(self.metrics_addr) => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "metrics server exited");
                }
            }
        }
    }

    pub fn stop(&self) {
        self.pipeline.stop();
    }

    /// Best-effort readiness probe: can we still talk to the RPC node.
    pub async fn health_check(&self) -> bool {
        self.rpc.get_slot().await.is_ok()
    }
}
