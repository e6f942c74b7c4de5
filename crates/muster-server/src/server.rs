//! Raw TCP command server. One JSON command per connection: read until a
//! complete JSON object is buffered (or the read cap is hit), dispatch
//! through the registry, write one JSON reply, close.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::registry::{self, Registry};
use crate::rpc::RpcContext;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_cap_bytes: usize,
}

pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    accept_loop: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        tracing::info!("command server shutdown initiated");
        self.shutdown.cancel();
    }

    pub async fn drain(self) {
        let _ = self.accept_loop.await;
    }
}

/// Binds the listener and spawns the accept loop. Returns once the bind
/// succeeds; the accept loop itself processes one connection fully before
/// accepting the next, so commands never run concurrently with each other.
pub async fn start(config: ServerConfig, ctx: Arc<RpcContext>) -> std::io::Result<ServerHandle> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(port = local_addr.port(), "muster command server listening");

    let registry = Arc::new(registry::build());
    let shutdown = CancellationToken::new();
    let shutdown_for_loop = shutdown.clone();
    let read_cap = config.read_cap_bytes;

    let accept_loop = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_for_loop.cancelled() => {
                    tracing::info!("command server accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            // Handled inline, not spawned: commands run strictly in
                            // arrival order and no handler is ever preempted by
                            // another connection's command.
                            if let Err(err) = handle_connection(stream, read_cap, &registry, &ctx).await {
                                tracing::warn!(%peer, %err, "command connection failed");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(%err, "failed to accept connection");
                        }
                    }
                }
            }
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        accept_loop,
    })
}

async fn handle_connection(
    mut stream: TcpStream,
    read_cap: usize,
    registry: &Registry,
    ctx: &RpcContext,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let parsed = loop {
        if buf.len() >= read_cap {
            write_reply(&mut stream, &json!({
                "status": "error",
                "message": format!("command exceeded {read_cap} byte read cap"),
            }))
            .await?;
            return Ok(());
        }

        match serde_json::from_slice::<Value>(&buf) {
            Ok(value) => break Some(value),
            Err(err) if err.is_eof() => {}
            Err(_) => break None,
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let Some(command) = parsed else {
        write_reply(&mut stream, &json!({
            "status": "error",
            "message": "malformed command: expected a single JSON object",
        }))
        .await?;
        return Ok(());
    };

    let action = command.get("action").and_then(Value::as_str).unwrap_or_default();
    let data = command.get("data").cloned().unwrap_or_else(|| json!({}));

    let reply = match registry.get(action) {
        Some(handler) => match handler.handle(data, ctx).await {
            Ok(reply) => reply,
            Err(err) => json!({ "status": "error", "message": err.message }),
        },
        None => json!({
            "status": "error",
            "message": format!("unknown action: {action}"),
        }),
    };

    write_reply(&mut stream, &reply).await
}

async fn write_reply(stream: &mut TcpStream, reply: &Value) -> std::io::Result<()> {
    let mut body = serde_json::to_vec(reply).unwrap_or_else(|_| b"{}".to_vec());
    body.push(b'\n');
    stream.write_all(&body).await?;
    stream.flush().await
}
