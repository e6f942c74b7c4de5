//! The `MethodHandler` trait every action implements, plus the context
//! handed to each call and the JSON error shape returned on failure.

use std::sync::Arc;

use async_trait::async_trait;
use muster_supervisor::SessionGraph;
use serde_json::Value;

/// Shared state every handler can reach.
pub struct RpcContext {
    pub graph: Arc<SessionGraph>,
}

/// A JSON-shaped error, one step removed from [`muster_core::Error`] so the
/// wire format doesn't have to mirror the internal error enum's variants.
#[derive(Debug)]
pub struct RpcError {
    pub message: String,
}

impl From<muster_core::Error> for RpcError {
    fn from(err: muster_core::Error) -> Self {
        Self { message: err.to_string() }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self { message: format!("malformed command: {err}") }
    }
}

impl RpcError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub type RpcResult = std::result::Result<Value, RpcError>;

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, data: Value, ctx: &RpcContext) -> RpcResult;
}

/// Pulls a required string field out of a params object.
pub fn require_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, RpcError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_arguments(format!("missing required field: {field}")))
}

pub fn require_i64(data: &Value, field: &str) -> Result<i64, RpcError> {
    data.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid_arguments(format!("missing required field: {field}")))
}

pub fn optional_str<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

pub fn optional_i64(data: &Value, field: &str) -> Option<i64> {
    data.get(field).and_then(Value::as_i64)
}
