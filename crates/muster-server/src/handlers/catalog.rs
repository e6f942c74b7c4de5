//! `update_entity` / `remove_entity` / group-membership handlers.

use async_trait::async_trait;
use base64::Engine;
use muster_core::{EntityKind, InfoCopyId, ProfileId, RequestId};
use serde_json::Value;
use std::str::FromStr;

use crate::handlers::common::success;
use crate::rpc::{require_i64, require_str, MethodHandler, RpcContext, RpcError, RpcResult};

fn entity_kind(data: &Value) -> Result<EntityKind, RpcError> {
    let raw = require_str(data, "entity_type")?;
    EntityKind::from_str(raw).map_err(|_| RpcError::invalid_arguments(format!("unknown entity_type: {raw}")))
}

fn group_kind(data: &Value) -> Result<EntityKind, RpcError> {
    let raw = require_str(data, "group_type")?;
    EntityKind::from_str(raw).map_err(|_| RpcError::invalid_arguments(format!("unknown group_type: {raw}")))
}

fn decode_b64(data: &Value, field: &str) -> Result<Option<Vec<u8>>, RpcError> {
    match data.get(field).and_then(Value::as_str) {
        Some(encoded) => Ok(Some(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|err| RpcError::invalid_arguments(format!("invalid base64 in {field}: {err}")))?,
        )),
        None => Ok(None),
    }
}

pub struct UpdateEntityHandler;

#[async_trait]
impl MethodHandler for UpdateEntityHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let kind = entity_kind(&data)?;
        let id = require_i64(&data, "id")?;
        let name = data.get("name").and_then(Value::as_str);

        let restarted = match kind {
            EntityKind::Profile => {
                let photo = decode_b64(&data, "photo_data_b64")?;
                let info = data.get("info_data").and_then(Value::as_str);
                ctx.graph
                    .update_profile(ProfileId(id), name, photo.as_deref(), info)
                    .await?
            }
            EntityKind::InfoCopy => {
                let payload = decode_b64(&data, "payload_b64")?;
                ctx.graph
                    .update_info_copy(InfoCopyId(id), name, payload.as_deref())
                    .await?
            }
            EntityKind::Request => {
                let text = data.get("text").and_then(Value::as_str);
                ctx.graph.update_request(RequestId(id), name, text).await?
            }
        };

        Ok(success(format!(
            "updated entity {id}, restarted {restarted} running session(s)"
        )))
    }
}

pub struct RemoveEntityHandler;

#[async_trait]
impl MethodHandler for RemoveEntityHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let kind = entity_kind(&data)?;
        let id = require_i64(&data, "id")?;
        ctx.graph.remove_entity(kind, id).await?;
        Ok(success(format!("removed entity {id}")))
    }
}

pub struct AddMemberToGroupHandler;

#[async_trait]
impl MethodHandler for AddMemberToGroupHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let kind = group_kind(&data)?;
        let group_name = require_str(&data, "group_name")?;
        let member_id = require_i64(&data, "member_id")?;
        let spawned = ctx
            .graph
            .add_member_to_group(kind, group_name, member_id)
            .await?;
        Ok(success(format!(
            "added member {member_id} to {group_name}, spawned {spawned} session(s)"
        )))
    }
}

pub struct RemoveMemberFromGroupHandler;

#[async_trait]
impl MethodHandler for RemoveMemberFromGroupHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let kind = group_kind(&data)?;
        let group_name = require_str(&data, "group_name")?;
        let member_id = require_i64(&data, "member_id")?;
        ctx.graph
            .remove_member_from_group(kind, group_name, member_id)
            .await?;
        Ok(success(format!("removed member {member_id} from {group_name}")))
    }
}

pub struct RemoveGroupHandler;

#[async_trait]
impl MethodHandler for RemoveGroupHandler {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult {
        let kind = group_kind(&data)?;
        let group_name = require_str(&data, "group_name")?;
        ctx.graph.remove_group(kind, group_name).await?;
        Ok(success(format!("removed group {group_name}")))
    }
}
