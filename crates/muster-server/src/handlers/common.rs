//! Shared response-shaping helpers.

use muster_store::models::Session;
use serde_json::{json, Value};

pub fn session_json(session: &Session) -> Value {
    json!({
        "id": session.id.get(),
        "kind": session.kind.as_str(),
        "status": session.status.as_str(),
        "is_group": session.is_group,
        "parent_id": session.parent_id.map(|p| p.get()),
        "description": session.description,
        "worker_pid": session.worker_pid,
        "start_time": session.start_time,
        "end_time": session.end_time,
    })
}

pub fn start_reply(parent: Option<Session>, leaves: Vec<Session>) -> Value {
    json!({
        "status": "success",
        "message": format!("started {} session(s)", leaves.len()),
        "parent": parent.as_ref().map(session_json),
        "sessions": leaves.iter().map(session_json).collect::<Vec<_>>(),
    })
}

pub fn success(message: impl Into<String>) -> Value {
    json!({ "status": "success", "message": message.into() })
}
