//! `ping` handler, used by health checks.

use async_trait::async_trait;
use serde_json::Value;

use crate::handlers::common::success;
use crate::rpc::{MethodHandler, RpcContext, RpcResult};

pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _data: Value, _ctx: &RpcContext) -> RpcResult {
        Ok(success("pong"))
    }
}
