//! `stop_session` / `fail_sessions_on_target` / `fail_all_running` /
//! `redo_failed` handlers.

use async_trait::async_trait;
use muster_core::{ProfileId, SessionId};
use muster_supervisor::AvatarIdentifier;
use serde_json::Value;

use crate::handlers::common::success;
use crate::rpc::{optional_i64, optional_str, require_i64, MethodHandler, RpcContext, RpcError, RpcResult};

pub struct StopSessionHandler;

#[async_trait]
impl MethodHandler for StopSessionHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let session_id = SessionId(require_i64(&data, "session_id")?);
        ctx.graph.stop_session(session_id).await?;
        Ok(success(format!("session {session_id} stopped")))
    }
}

pub struct FailSessionsOnTargetHandler;

#[async_trait]
impl MethodHandler for FailSessionsOnTargetHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let target = parse_avatar_identifier(&data)?;
        let count = ctx.graph.fail_sessions_on_target(target).await?;
        Ok(success(format!("failed {count} session(s)")))
    }
}

pub struct FailAllRunningHandler;

#[async_trait]
impl MethodHandler for FailAllRunningHandler {
    async fn handle(&self, _data: Value, ctx: &RpcContext) -> RpcResult {
        let count = ctx.graph.fail_all_running().await?;
        Ok(success(format!("failed {count} session(s)")))
    }
}

pub struct RedoFailedHandler;

#[async_trait]
impl MethodHandler for RedoFailedHandler {
    async fn handle(&self, _data: Value, ctx: &RpcContext) -> RpcResult {
        let count = ctx.graph.redo_failed().await?;
        Ok(success(format!("redid {count} session(s)")))
    }
}

fn parse_avatar_identifier(data: &Value) -> Result<AvatarIdentifier, RpcError> {
    if let Some(id) = optional_i64(data, "avatar_id") {
        return Ok(AvatarIdentifier::Id(ProfileId(id)));
    }
    if let Some(name) = optional_str(data, "avatar_group") {
        return Ok(AvatarIdentifier::Group(name.to_string()));
    }
    Err(RpcError::invalid_arguments(
        "exactly one of avatar_id or avatar_group is required",
    ))
}
