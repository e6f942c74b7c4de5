//! Row types returned by the repositories.

use muster_core::{
    GroupId, InfoCopyId, ProfileId, RequestId, SessionId, SessionKind, SessionStatus,
};

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub photo: Vec<u8>,
    pub info: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct InfoCopy {
    pub id: InfoCopyId,
    pub name: String,
    pub payload: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub name: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

/// A fully materialized session row. Reference fields are `None` unless the
/// session's `kind` calls for them (see invariant 6 in the session-graph
/// design).
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub kind: SessionKind,
    pub parent_id: Option<SessionId>,
    pub is_group: bool,
    pub description: String,
    pub source_profile_id: Option<ProfileId>,
    pub dest_profile_id: Option<ProfileId>,
    pub info_copy_id: Option<InfoCopyId>,
    pub request_id: Option<RequestId>,
    pub profile_group_id: Option<GroupId>,
    pub info_copy_group_id: Option<GroupId>,
    pub request_group_id: Option<GroupId>,
    pub status: SessionStatus,
    pub start_time: String,
    pub end_time: Option<String>,
    pub worker_pid: Option<i64>,
    pub last_updated: String,
}

impl Session {
    #[must_use]
    pub fn duration_minutes(&self) -> Option<i64> {
        let start = chrono::DateTime::parse_from_rfc3339(&self.start_time).ok()?;
        let end = chrono::DateTime::parse_from_rfc3339(self.end_time.as_ref()?).ok()?;
        Some((end - start).num_minutes())
    }
}

/// Fields accepted by a new session insert. `status` is always
/// [`SessionStatus::Scheduled`] on creation; the supervisor promotes it to
/// `Running` after a successful spawn.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub kind: Option<muster_core::SessionKind>,
    pub parent_id: Option<SessionId>,
    pub is_group: bool,
    pub description: String,
    pub source_profile_id: Option<ProfileId>,
    pub dest_profile_id: Option<ProfileId>,
    pub info_copy_id: Option<InfoCopyId>,
    pub request_id: Option<RequestId>,
    pub profile_group_id: Option<GroupId>,
    pub info_copy_group_id: Option<GroupId>,
    pub request_group_id: Option<GroupId>,
    pub start_time: String,
    pub end_time: Option<String>,
}
