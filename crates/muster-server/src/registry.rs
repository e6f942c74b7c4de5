//! Maps each wire action name to its handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::catalog::{
    AddMemberToGroupHandler, RemoveEntityHandler, RemoveGroupHandler, RemoveMemberFromGroupHandler,
    UpdateEntityHandler,
};
use crate::handlers::lifecycle::{
    FailAllRunningHandler, FailSessionsOnTargetHandler, RedoFailedHandler, StopSessionHandler,
};
use crate::handlers::ping::PingHandler;
use crate::handlers::start::{StartGroupHandler, StartIcHandler, StartLinkHandler, StartRequestHandler};
use crate::handlers::view::ViewRunningOnHandler;
use crate::rpc::MethodHandler;

pub type Registry = HashMap<&'static str, Arc<dyn MethodHandler>>;

/// Builds the full action registry. One entry per `[MODULE]` operation
/// exposed over the wire.
pub fn build() -> Registry {
    let mut registry: Registry = HashMap::new();
    registry.insert("ping", Arc::new(PingHandler));
    registry.insert("start_ic", Arc::new(StartIcHandler));
    registry.insert("start_request", Arc::new(StartRequestHandler));
    registry.insert("start_link", Arc::new(StartLinkHandler));
    registry.insert("start_group", Arc::new(StartGroupHandler));
    registry.insert("stop_session", Arc::new(StopSessionHandler));
    registry.insert("update_entity", Arc::new(UpdateEntityHandler));
    registry.insert("remove_entity", Arc::new(RemoveEntityHandler));
    registry.insert("add_member_to_group", Arc::new(AddMemberToGroupHandler));
    registry.insert("remove_member_from_group", Arc::new(RemoveMemberFromGroupHandler));
    registry.insert("remove_group", Arc::new(RemoveGroupHandler));
    registry.insert("fail_sessions_on_target", Arc::new(FailSessionsOnTargetHandler));
    registry.insert("fail_all_running", Arc::new(FailAllRunningHandler));
    registry.insert("redo_failed", Arc::new(RedoFailedHandler));
    registry.insert("view_running_on", Arc::new(ViewRunningOnHandler));
    registry
}
