//! The process spawned by `muster-supervisor` for a single session leaf.
//!
//! Hashes its two payload blobs in a loop until its deadline passes (or
//! forever if none was given), writing the session's terminal status
//! directly to the database before exiting. SIGTERM is treated as a stop
//! request rather than a failure.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use clap::Parser;
use muster_core::kinds::SessionStatus;
use muster_store::repositories::sessions::SessionRepo;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

#[derive(Debug, Parser)]
#[command(name = "muster-worker", about = "Session worker process")]
struct Args {
    #[arg(long)]
    session_id: i64,

    #[arg(long)]
    db_path: String,

    #[arg(long)]
    blob_a: String,

    #[arg(long)]
    blob_b: String,

    #[arg(long)]
    deadline: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let session_id = muster_core::SessionId::from(args.session_id);

    let blob_a = base64::engine::general_purpose::STANDARD
        .decode(&args.blob_a)
        .context("decoding blob-a")?;
    let blob_b = base64::engine::general_purpose::STANDARD
        .decode(&args.blob_b)
        .context("decoding blob-b")?;
    let deadline = args
        .deadline
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()
        .context("parsing deadline")?
        .map(|dt| dt.with_timezone(&Utc));

    tracing::info!(session_id = args.session_id, ?deadline, "worker starting");

    let status = run_until_stopped(&blob_a, &blob_b, deadline).await;

    tracing::info!(session_id = args.session_id, ?status, "worker finished");

    let conn = Connection::open(&args.db_path).context("opening database")?;
    if let Err(err) = SessionRepo::set_status(&conn, session_id, status) {
        tracing::error!(session_id = args.session_id, %err, "failed to record terminal status");
    }

    Ok(())
}

/// Hashes both blobs once per second until the deadline passes or a SIGTERM
/// arrives. Returns the terminal status to record.
async fn run_until_stopped(
    blob_a: &[u8],
    blob_b: &[u8],
    deadline: Option<DateTime<Utc>>,
) -> SessionStatus {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(%err, "failed to install SIGTERM handler");
            return SessionStatus::Failed;
        }
    };

    loop {
        if let Some(deadline) = deadline {
            if Utc::now() >= deadline {
                return SessionStatus::Completed;
            }
        }

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, stopping");
                return SessionStatus::Stopped;
            }
            () = hash_cycle(blob_a, blob_b) => {}
        }
    }
}

async fn hash_cycle(blob_a: &[u8], blob_b: &[u8]) {
    hash(blob_a);
    hash(blob_b);
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
