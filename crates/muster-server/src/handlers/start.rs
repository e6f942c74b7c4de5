//! `start_ic` / `start_request` / `start_link` / `start_group` handlers.

use async_trait::async_trait;
use muster_core::InfoCopyId;
use serde_json::Value;

use crate::handlers::common::start_reply;
use crate::rpc::{optional_i64, optional_str, require_i64, require_str, MethodHandler, RpcContext, RpcResult};

pub struct StartIcHandler;

#[async_trait]
impl MethodHandler for StartIcHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let ic_id = InfoCopyId(require_i64(&data, "ic_id")?);
        let avatar_id = optional_i64(&data, "avatar_id");
        let avatar_group = optional_str(&data, "avatar_group");
        let duration = optional_i64(&data, "duration");
        let (parent, leaves) = ctx
            .graph
            .start_ic(avatar_id, avatar_group, ic_id, duration)
            .await?;
        Ok(start_reply(parent, leaves))
    }
}

pub struct StartRequestHandler;

#[async_trait]
impl MethodHandler for StartRequestHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let avatar_id = optional_i64(&data, "avatar_id");
        let avatar_group = optional_str(&data, "avatar_group");
        let request_id = optional_i64(&data, "request_id");
        let request_group = optional_str(&data, "request_group");
        let duration = optional_i64(&data, "duration");
        let (parent, leaves) = ctx
            .graph
            .start_request(avatar_id, avatar_group, request_id, request_group, duration)
            .await?;
        Ok(start_reply(parent, leaves))
    }
}

pub struct StartLinkHandler;

#[async_trait]
impl MethodHandler for StartLinkHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let source_id = muster_core::ProfileId(require_i64(&data, "source_id")?);
        let dest_id = optional_i64(&data, "dest_id");
        let dest_group = optional_str(&data, "dest_group");
        let duration = optional_i64(&data, "duration");
        let (parent, leaves) = ctx
            .graph
            .start_link(source_id, dest_id, dest_group, duration)
            .await?;
        Ok(start_reply(parent, leaves))
    }
}

pub struct StartGroupHandler;

#[async_trait]
impl MethodHandler for StartGroupHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let avatar_group = require_str(&data, "avatar_group")?;
        let ic_group = require_str(&data, "ic_group")?;
        let duration = optional_i64(&data, "duration");
        let (parent, leaves) = ctx.graph.start_group(avatar_group, ic_group, duration).await?;
        Ok(start_reply(parent, leaves))
    }
}
