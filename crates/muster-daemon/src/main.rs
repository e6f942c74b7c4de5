//! Daemon entrypoint: loads configuration, opens the store, recovers any
//! sessions orphaned by a prior crash, then runs the command server until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use muster_cache::PayloadCache;
use muster_server::{RpcContext, ServerConfig};
use muster_settings::MusterConfig;
use muster_store::pool::ConnectionConfig;
use muster_supervisor::{ProcessSupervisor, SessionGraph};

#[derive(Debug, Parser)]
#[command(name = "muster-daemon", about = "Session orchestrator daemon")]
struct Cli {
    /// Path to `muster.toml`. Missing file falls back to defaults + env.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the `muster-worker` binary this daemon spawns per session.
    #[arg(long, default_value = "muster-worker")]
    worker_binary: PathBuf,
}

// Single-threaded runtime: commands are processed strictly in arrival
// order and no handler is preempted by another (see `muster-server::server`).
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    muster_core::logging::init();

    let cli = Cli::parse();
    let config = MusterConfig::load(cli.config.as_deref());
    tracing::info!(host = %config.host, port = config.port, db_path = %config.db_path, "loaded configuration");

    let pool_config = ConnectionConfig {
        pool_size: config.pool_size,
        ..ConnectionConfig::default()
    };
    let pool = muster_store::new_file(&config.db_path, &pool_config).context("opening store")?;

    let cache = Arc::new(PayloadCache::new());
    let supervisor = Arc::new(ProcessSupervisor::new(
        cli.worker_binary,
        config.db_path.clone(),
        config.stop_timeout,
    ));
    let graph = Arc::new(SessionGraph::new(pool, cache, supervisor));

    let recovered = graph.recover_orphans().await.context("recovering orphaned sessions")?;
    if recovered > 0 {
        tracing::warn!(recovered, "marked orphaned running sessions as failed on startup");
    }

    let ctx = Arc::new(RpcContext { graph });
    let handle = muster_server::server::start(
        ServerConfig {
            host: config.host.clone(),
            port: config.port,
            read_cap_bytes: config.read_cap_bytes,
        },
        ctx,
    )
    .await
    .context("starting command server")?;

    tracing::info!(port = handle.port, "muster-daemon ready");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");

    handle.shutdown();
    handle.drain().await;

    Ok(())
}
