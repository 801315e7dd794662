//! Binary entry point: parse CLI flags, load layered configuration, wire up
//! tracing, and run the executor until Ctrl-C.

use clap::Parser;
use cyclic_arb_executor::config::{AppConfig, Cli};
use cyclic_arb_executor::Executor;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // held for the lifetime of `main`: dropping it stops the non-blocking
    // file writer and would silently truncate in-flight log lines.
    let _log_guard = init_tracing(&cli.log_level, cli.log_dir.as_deref());

    let cfg = AppConfig::load(&cli)?;
    let persistence_enabled = cfg.persistence.enabled;
    let configured_database_url = cfg.persistence.database_url.clone();
    let mut executor = Executor::build(cfg).map_err(|e| {
        tracing::error!(error = %e, "startup failed");
        e
    })?;

    if !executor.health_check().await {
        tracing::warn!("RPC health check failed at startup; continuing anyway");
    }

    // Environment variable takes precedence over config, matching the
    // wallet-loading precedence rule (§6).
    let database_url = std::env::var("ARB_EXECUTOR_DATABASE_URL")
        .ok()
        .or(configured_database_url);
    if persistence_enabled {
        match database_url {
            Some(url) => {
                if let Err(e) = executor.attach_persistence(&url).await {
                    tracing::warn!(error = %e, "failed to attach persistence sink");
                }
            }
            None => tracing::warn!("persistence enabled but no database_url configured"),
        }
    }

    if let Err(e) = executor.init_alt_manager().await {
        tracing::warn!(error = %e, "ALT manager initialization failed");
    }

    let executor = std::sync::Arc::new(executor);
    let run_handle = {
        let executor = std::sync::Arc::clone(&executor);
        tokio::spawn(async move { executor.start().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    executor.stop();
    let _ = run_handle.await;

    Ok(())
}

fn init_tracing(log_level: &str, log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "arb-executor.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(non_blocking)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
            None
        }
    }
}
