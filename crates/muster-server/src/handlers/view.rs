//! `view_running_on` handler.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::rpc::{require_str, MethodHandler, RpcContext, RpcResult};

pub struct ViewRunningOnHandler;

#[async_trait]
impl MethodHandler for ViewRunningOnHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let identifier = require_str(&data, "avatar_identifier")?;
        let rows = ctx.graph.view_running_on(identifier).await?;
        let sessions: Vec<Value> = rows
            .iter()
            .map(|row| {
                json!({
                    "session_id": row.session_id.get(),
                    "kind": row.kind.as_str(),
                    "target": row.target,
                    "duration_minutes": row.duration_minutes,
                })
            })
            .collect();
        Ok(json!({
            "status": "success",
            "message": format!("{} running session(s)", sessions.len()),
            "sessions": sessions,
        }))
    }
}
