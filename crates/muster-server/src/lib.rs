pub mod handlers;
pub mod registry;
pub mod rpc;
pub mod server;

pub use rpc::RpcContext;
pub use server::{ServerConfig, ServerHandle};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use muster_cache::PayloadCache;
    use muster_store::pool::{self, ConnectionConfig};
    use muster_supervisor::{ProcessSupervisor, SessionGraph};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::{RpcContext, ServerConfig};

    async fn start_test_server() -> crate::ServerHandle {
        let db_pool = pool::new_in_memory(&ConnectionConfig::default()).unwrap();
        let cache = Arc::new(PayloadCache::new());
        let supervisor = Arc::new(ProcessSupervisor::new(
            "/usr/bin/true".into(),
            ":memory:".to_string(),
            Duration::from_millis(200),
        ));
        let graph = Arc::new(SessionGraph::new(db_pool, cache, supervisor));
        let ctx = Arc::new(RpcContext { graph });

        crate::server::start(
            ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                read_cap_bytes: 16 * 1024,
            },
            ctx,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn ping_round_trips() {
        let handle = start_test_server().await;
        let port = handle.port;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(br#"{"action":"ping","data":{}}"#)
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "pong");

        handle.shutdown();
        handle.drain().await;
    }

    #[tokio::test]
    async fn unknown_action_reports_error() {
        let handle = start_test_server().await;
        let port = handle.port;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(br#"{"action":"not_a_real_action","data":{}}"#)
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(value["status"], "error");

        handle.shutdown();
        handle.drain().await;
    }
}
