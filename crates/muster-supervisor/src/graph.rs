//! The session-graph operations: starting, stopping, and reconciling the
//! parent/child session tree against the live worker fleet. This is the
//! component every command handler in `muster-server` ultimately calls
//! into.

use std::sync::Arc;

use chrono::Utc;
use muster_cache::PayloadCache;
use muster_core::{
    EntityKind, Error, GroupId, InfoCopyId, ProfileId, RequestId, Result, SessionId, SessionKind,
    SessionStatus,
};
use muster_store::models::{NewSession, Session};
use muster_store::repositories::entities::{InfoCopyRepo, ProfileRepo, RequestRepo};
use muster_store::repositories::groups::{InfoCopyGroupRepo, ProfileGroupRepo, RequestGroupRepo};
use muster_store::repositories::sessions::SessionRepo;
use muster_store::ConnectionPool;
use rusqlite::Connection;

use crate::expander::{self, Target};
use crate::process::ProcessSupervisor;

/// A resolved avatar identifier from the wire protocol: a bare numeric id,
/// or a group name.
pub enum AvatarIdentifier {
    Id(ProfileId),
    Group(String),
}

#[derive(Debug, Clone)]
pub struct RunningView {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub target: String,
    pub duration_minutes: Option<i64>,
}

pub struct SessionGraph {
    pool: ConnectionPool,
    cache: Arc<PayloadCache>,
    supervisor: Arc<ProcessSupervisor>,
}

impl SessionGraph {
    #[must_use]
    pub fn new(pool: ConnectionPool, cache: Arc<PayloadCache>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self { pool, cache, supervisor }
    }

    fn conn(&self) -> Result<muster_store::PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn payloads_for(&self, conn: &Connection, session: &Session) -> Result<(Vec<u8>, Vec<u8>)> {
        match session.kind {
            SessionKind::IcSession | SessionKind::GroupIcSession => {
                let profile_id = session
                    .source_profile_id
                    .ok_or_else(|| Error::Internal("ic session missing source profile".to_string()))?;
                let ic_id = session
                    .info_copy_id
                    .ok_or_else(|| Error::Internal("ic session missing info copy".to_string()))?;
                Ok((
                    self.cache.profile_payload(conn, profile_id)?,
                    self.cache.info_copy_payload(conn, ic_id)?,
                ))
            }
            SessionKind::RequestSession => {
                let profile_id = session.source_profile_id.ok_or_else(|| {
                    Error::Internal("request session missing source profile".to_string())
                })?;
                let request_id = session
                    .request_id
                    .ok_or_else(|| Error::Internal("request session missing request".to_string()))?;
                Ok((
                    self.cache.profile_payload(conn, profile_id)?,
                    self.cache.request_payload(conn, request_id)?,
                ))
            }
            SessionKind::AvatarLink => {
                let source = session
                    .source_profile_id
                    .ok_or_else(|| Error::Internal("link missing source profile".to_string()))?;
                let dest = session
                    .dest_profile_id
                    .ok_or_else(|| Error::Internal("link missing dest profile".to_string()))?;
                Ok((
                    self.cache.profile_payload(conn, source)?,
                    self.cache.profile_payload(conn, dest)?,
                ))
            }
        }
    }

    fn deadline(session: &Session) -> Option<chrono::DateTime<chrono::Utc>> {
        session
            .end_time
            .as_ref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Persists a leaf as SCHEDULED, spawns its worker, and promotes it to
    /// RUNNING (or FAILED on spawn error).
    async fn spawn_leaf(&self, conn: &Connection, new: &NewSession) -> Result<Session> {
        let session = SessionRepo::create(conn, new)?;
        let (blob_a, blob_b) = self.payloads_for(conn, &session)?;
        match self
            .supervisor
            .spawn(session.id, &blob_a, &blob_b, Self::deadline(&session))
            .await
        {
            Ok(pid) => {
                SessionRepo::mark_running(conn, session.id, pid)?;
            }
            Err(err) => {
                SessionRepo::set_status(conn, session.id, SessionStatus::Failed)?;
                return Err(err);
            }
        }
        SessionRepo::get(conn, session.id)?.ok_or(Error::SessionNotFound(session.id.get()))
    }

    async fn persist_and_spawn(&self, conn: &Connection, plan: expander::Plan) -> Result<(Option<Session>, Vec<Session>)> {
        let parent = match plan.parent {
            Some(new_parent) => {
                let created = SessionRepo::create(conn, &new_parent)?;
                // Parents have no worker of their own; RUNNING with a NULL
                // pid marks "this group operation is active" without
                // implying a tracked process handle exists for it.
                SessionRepo::set_status(conn, created.id, SessionStatus::Running)?;
                Some(SessionRepo::get(conn, created.id)?.ok_or(Error::SessionNotFound(created.id.get()))?)
            }
            None => None,
        };
        let parent_id = parent.as_ref().map(|p| p.id);

        let mut leaves = Vec::with_capacity(plan.leaves.len());
        for mut leaf in plan.leaves {
            leaf.parent_id = parent_id;
            leaves.push(self.spawn_leaf(conn, &leaf).await?);
        }
        Ok((parent, leaves))
    }

    pub async fn start_ic(
        &self,
        avatar_id: Option<i64>,
        avatar_group: Option<&str>,
        ic_id: InfoCopyId,
        duration_minutes: Option<i64>,
    ) -> Result<(Option<Session>, Vec<Session>)> {
        let conn = self.conn()?;
        let target = expander::resolve_profile_target(&conn, avatar_id, avatar_group)?;
        let plan = expander::plan_start_ic(&target, ic_id, duration_minutes);
        self.persist_and_spawn(&conn, plan).await
    }

    pub async fn start_request(
        &self,
        avatar_id: Option<i64>,
        avatar_group: Option<&str>,
        request_id: Option<i64>,
        request_group: Option<&str>,
        duration_minutes: Option<i64>,
    ) -> Result<(Option<Session>, Vec<Session>)> {
        let conn = self.conn()?;
        let profile_target = expander::resolve_profile_target(&conn, avatar_id, avatar_group)?;
        let request_target = expander::resolve_request_target(&conn, request_id, request_group)?;
        let plan = expander::plan_start_request(&profile_target, &request_target, duration_minutes);
        self.persist_and_spawn(&conn, plan).await
    }

    pub async fn start_link(
        &self,
        source_id: ProfileId,
        dest_id: Option<i64>,
        dest_group: Option<&str>,
        duration_minutes: Option<i64>,
    ) -> Result<(Option<Session>, Vec<Session>)> {
        let conn = self.conn()?;
        let dest_target = expander::resolve_profile_target(&conn, dest_id, dest_group)?;
        let plan = expander::plan_start_link(source_id, &dest_target, duration_minutes);
        self.persist_and_spawn(&conn, plan).await
    }

    pub async fn start_group(
        &self,
        avatar_group: &str,
        ic_group: &str,
        duration_minutes: Option<i64>,
    ) -> Result<(Option<Session>, Vec<Session>)> {
        let conn = self.conn()?;
        let profile_target = expander::resolve_profile_target(&conn, None, Some(avatar_group))?;
        let ic_target = expander::resolve_info_copy_target(&conn, None, Some(ic_group))?;
        let plan = expander::plan_start_group(&profile_target, &ic_target, duration_minutes)?;
        self.persist_and_spawn(&conn, plan).await
    }

    /// Applies a partial profile update, then restarts every RUNNING
    /// session that referenced it. Returns the number restarted.
    pub async fn update_profile(
        &self,
        id: ProfileId,
        name: Option<&str>,
        photo: Option<&[u8]>,
        info: Option<&str>,
    ) -> Result<usize> {
        {
            let conn = self.conn()?;
            ProfileRepo::update(
                &conn,
                id,
                muster_store::repositories::entities::UpdateProfileOptions { name, photo, info },
            )?;
        }
        self.restart_sessions_for_profile(id).await
    }

    pub async fn update_info_copy(
        &self,
        id: InfoCopyId,
        name: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<usize> {
        {
            let conn = self.conn()?;
            InfoCopyRepo::update(
                &conn,
                id,
                muster_store::repositories::entities::UpdateInfoCopyOptions { name, payload },
            )?;
        }
        self.restart_sessions_for_info_copy(id).await
    }

    pub async fn update_request(
        &self,
        id: RequestId,
        name: Option<&str>,
        text: Option<&str>,
    ) -> Result<usize> {
        {
            let conn = self.conn()?;
            RequestRepo::update(
                &conn,
                id,
                muster_store::repositories::entities::UpdateRequestOptions { name, text },
            )?;
        }
        self.restart_sessions_for_request(id).await
    }

    /// Stops a session. If it's a parent, its running children are stopped
    /// first. Terminal sessions are a no-op success.
    pub async fn stop_session(&self, session_id: SessionId) -> Result<()> {
        let conn = self.conn()?;
        let session = SessionRepo::get(&conn, session_id)?.ok_or(Error::SessionNotFound(session_id.get()))?;
        if session.status.is_terminal() {
            return Ok(());
        }
        if session.is_group {
            for child in SessionRepo::running_children_of(&conn, session_id)? {
                self.supervisor.terminate(child.id).await;
                SessionRepo::set_status(&conn, child.id, SessionStatus::Stopped)?;
            }
        } else {
            self.supervisor.terminate(session_id).await;
        }
        SessionRepo::set_status(&conn, session_id, SessionStatus::Stopped)?;
        Ok(())
    }

    /// Stops then respawns every RUNNING session referencing `profile_id`,
    /// after the caller has already applied the entity mutation. Returns
    /// the number of sessions restarted.
    pub async fn restart_sessions_for_profile(&self, profile_id: ProfileId) -> Result<usize> {
        self.cache.invalidate_profile(profile_id);
        let conn = self.conn()?;
        let affected = SessionRepo::running_referencing_profile(&conn, profile_id)?;
        let mut restarted = 0;
        for session in affected {
            self.supervisor.terminate(session.id).await;
            SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
            let refreshed = SessionRepo::get(&conn, session.id)?.ok_or(Error::SessionNotFound(session.id.get()))?;
            let (blob_a, blob_b) = self.payloads_for(&conn, &refreshed)?;
            let pid = self
                .supervisor
                .spawn(session.id, &blob_a, &blob_b, Self::deadline(&refreshed))
                .await?;
            SessionRepo::mark_running(&conn, session.id, pid)?;
            restarted += 1;
        }
        Ok(restarted)
    }

    pub async fn restart_sessions_for_info_copy(&self, ic_id: InfoCopyId) -> Result<usize> {
        self.cache.invalidate_info_copy(ic_id);
        let conn = self.conn()?;
        let affected = SessionRepo::running_referencing_info_copy(&conn, ic_id)?;
        let mut restarted = 0;
        for session in affected {
            self.supervisor.terminate(session.id).await;
            SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
            let refreshed = SessionRepo::get(&conn, session.id)?.ok_or(Error::SessionNotFound(session.id.get()))?;
            let (blob_a, blob_b) = self.payloads_for(&conn, &refreshed)?;
            let pid = self
                .supervisor
                .spawn(session.id, &blob_a, &blob_b, Self::deadline(&refreshed))
                .await?;
            SessionRepo::mark_running(&conn, session.id, pid)?;
            restarted += 1;
        }
        Ok(restarted)
    }

    pub async fn restart_sessions_for_request(&self, request_id: RequestId) -> Result<usize> {
        self.cache.invalidate_request(request_id);
        let conn = self.conn()?;
        let affected = SessionRepo::running_referencing_request(&conn, request_id)?;
        let mut restarted = 0;
        for session in affected {
            self.supervisor.terminate(session.id).await;
            SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
            let refreshed = SessionRepo::get(&conn, session.id)?.ok_or(Error::SessionNotFound(session.id.get()))?;
            let (blob_a, blob_b) = self.payloads_for(&conn, &refreshed)?;
            let pid = self
                .supervisor
                .spawn(session.id, &blob_a, &blob_b, Self::deadline(&refreshed))
                .await?;
            SessionRepo::mark_running(&conn, session.id, pid)?;
            restarted += 1;
        }
        Ok(restarted)
    }

    /// Removes an entity, after stopping every running session that
    /// references it. The database foreign keys cascade the row deletes of
    /// those sessions once the entity row is gone.
    pub async fn remove_entity(&self, kind: EntityKind, id: i64) -> Result<()> {
        let conn = self.conn()?;
        match kind {
            EntityKind::Profile => {
                let profile_id = ProfileId(id);
                for session in SessionRepo::running_referencing_profile(&conn, profile_id)? {
                    self.supervisor.terminate(session.id).await;
                    SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
                }
                ProfileRepo::remove(&conn, profile_id)?;
                self.cache.invalidate_profile(profile_id);
            }
            EntityKind::InfoCopy => {
                let ic_id = InfoCopyId(id);
                for session in SessionRepo::running_referencing_info_copy(&conn, ic_id)? {
                    self.supervisor.terminate(session.id).await;
                    SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
                }
                InfoCopyRepo::remove(&conn, ic_id)?;
                self.cache.invalidate_info_copy(ic_id);
            }
            EntityKind::Request => {
                let request_id = RequestId(id);
                for session in SessionRepo::running_referencing_request(&conn, request_id)? {
                    self.supervisor.terminate(session.id).await;
                    SessionRepo::set_status(&conn, session.id, SessionStatus::Stopped)?;
                }
                RequestRepo::remove(&conn, request_id)?;
                self.cache.invalidate_request(request_id);
            }
        }
        Ok(())
    }

    /// Adds a member to a group, retroactively spawning new leaves under
    /// every RUNNING parent that uses the group. Request groups never
    /// retroactively spawn (matches the asymmetry in the original source,
    /// see DESIGN.md).
    pub async fn add_member_to_group(
        &self,
        kind: EntityKind,
        group_name: &str,
        member_id: i64,
    ) -> Result<usize> {
        let mut spawned = 0;
        match kind {
            EntityKind::Profile => {
                let group_id = {
                    let conn = self.conn()?;
                    let group = ProfileGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?;
                    ProfileGroupRepo::add_member(&conn, group.id, ProfileId(member_id))?;
                    group.id
                };
                spawned += self.spawn_for_new_profile_member(group_id, ProfileId(member_id)).await?;
            }
            EntityKind::InfoCopy => {
                let group_id = {
                    let conn = self.conn()?;
                    let group = InfoCopyGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?;
                    InfoCopyGroupRepo::add_member(&conn, group.id, InfoCopyId(member_id))?;
                    group.id
                };
                spawned += self.spawn_for_new_info_copy_member(group_id, InfoCopyId(member_id)).await?;
            }
            EntityKind::Request => {
                let conn = self.conn()?;
                let group = RequestGroupRepo::get_by_name(&conn, group_name)?
                    .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?;
                RequestGroupRepo::add_member(&conn, group.id, RequestId(member_id))?;
                // no retroactive spawn for request groups
            }
        }
        Ok(spawned)
    }

    async fn spawn_for_new_profile_member(&self, group_id: GroupId, new_profile: ProfileId) -> Result<usize> {
        let parents = {
            let conn = self.conn()?;
            SessionRepo::running_parents_by_profile_group(&conn, group_id)?
        };
        let mut spawned = 0;
        for parent in parents {
            let new_leaves = match parent.kind {
                SessionKind::GroupIcSession => {
                    let members = {
                        let conn = self.conn()?;
                        InfoCopyGroupRepo::list_members(
                            &conn,
                            parent.info_copy_group_id.ok_or_else(|| {
                                Error::Internal("group_ic_session parent missing ic group".to_string())
                            })?,
                        )?
                    };
                    members
                        .into_iter()
                        .map(|ic_id| NewSession {
                            kind: Some(SessionKind::IcSession),
                            parent_id: Some(parent.id),
                            description: format!("info-copy {ic_id} on profile {new_profile} (group)"),
                            source_profile_id: Some(new_profile),
                            info_copy_id: Some(ic_id),
                            start_time: parent.start_time.clone(),
                            end_time: parent.end_time.clone(),
                            ..Default::default()
                        })
                        .collect::<Vec<_>>()
                }
                SessionKind::IcSession => vec![NewSession {
                    kind: Some(SessionKind::IcSession),
                    parent_id: Some(parent.id),
                    description: format!("info-copy on profile {new_profile}"),
                    source_profile_id: Some(new_profile),
                    info_copy_id: parent.info_copy_id,
                    start_time: parent.start_time.clone(),
                    end_time: parent.end_time.clone(),
                    ..Default::default()
                }],
                SessionKind::RequestSession => vec![NewSession {
                    kind: Some(SessionKind::RequestSession),
                    parent_id: Some(parent.id),
                    description: format!("request on profile {new_profile}"),
                    source_profile_id: Some(new_profile),
                    request_id: parent.request_id,
                    start_time: parent.start_time.clone(),
                    end_time: parent.end_time.clone(),
                    ..Default::default()
                }],
                SessionKind::AvatarLink => vec![NewSession {
                    kind: Some(SessionKind::AvatarLink),
                    parent_id: Some(parent.id),
                    description: format!("link to profile {new_profile}"),
                    source_profile_id: parent.source_profile_id,
                    dest_profile_id: Some(new_profile),
                    start_time: parent.start_time.clone(),
                    end_time: parent.end_time.clone(),
                    ..Default::default()
                }],
            };
            let conn = self.conn()?;
            for leaf in new_leaves {
                self.spawn_leaf(&conn, &leaf).await?;
                spawned += 1;
            }
        }
        Ok(spawned)
    }

    async fn spawn_for_new_info_copy_member(&self, group_id: GroupId, new_ic: InfoCopyId) -> Result<usize> {
        let parents = {
            let conn = self.conn()?;
            SessionRepo::running_parents_by_info_copy_group(&conn, group_id)?
        };
        let mut spawned = 0;
        for parent in parents {
            let members = {
                let conn = self.conn()?;
                ProfileGroupRepo::list_members(
                    &conn,
                    parent.profile_group_id.ok_or_else(|| {
                        Error::Internal("group_ic_session parent missing profile group".to_string())
                    })?,
                )?
            };
            let conn = self.conn()?;
            for profile_id in members {
                let leaf = NewSession {
                    kind: Some(SessionKind::IcSession),
                    parent_id: Some(parent.id),
                    description: format!("info-copy {new_ic} on profile {profile_id} (group)"),
                    source_profile_id: Some(profile_id),
                    info_copy_id: Some(new_ic),
                    start_time: parent.start_time.clone(),
                    end_time: parent.end_time.clone(),
                    ..Default::default()
                };
                self.spawn_leaf(&conn, &leaf).await?;
                spawned += 1;
            }
        }
        Ok(spawned)
    }

    /// Removes a member from a group, stopping every RUNNING child leaf
    /// whose removed side matches, then deleting the membership row.
    pub async fn remove_member_from_group(
        &self,
        kind: EntityKind,
        group_name: &str,
        member_id: i64,
    ) -> Result<()> {
        match kind {
            EntityKind::Profile => {
                let profile_id = ProfileId(member_id);
                let group_id = {
                    let conn = self.conn()?;
                    ProfileGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                        .id
                };
                let parents = {
                    let conn = self.conn()?;
                    SessionRepo::running_parents_by_profile_group(&conn, group_id)?
                };
                for parent in parents {
                    let children = {
                        let conn = self.conn()?;
                        SessionRepo::running_children_of(&conn, parent.id)?
                    };
                    for child in children.into_iter().filter(|c| {
                        c.source_profile_id == Some(profile_id) || c.dest_profile_id == Some(profile_id)
                    }) {
                        self.supervisor.terminate(child.id).await;
                        let conn = self.conn()?;
                        SessionRepo::set_status(&conn, child.id, SessionStatus::Stopped)?;
                    }
                }
                let conn = self.conn()?;
                ProfileGroupRepo::remove_member(&conn, group_id, profile_id)?;
            }
            EntityKind::InfoCopy => {
                let ic_id = InfoCopyId(member_id);
                let group_id = {
                    let conn = self.conn()?;
                    InfoCopyGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                        .id
                };
                let parents = {
                    let conn = self.conn()?;
                    SessionRepo::running_parents_by_info_copy_group(&conn, group_id)?
                };
                for parent in parents {
                    let children = {
                        let conn = self.conn()?;
                        SessionRepo::running_children_of(&conn, parent.id)?
                    };
                    for child in children.into_iter().filter(|c| c.info_copy_id == Some(ic_id)) {
                        self.supervisor.terminate(child.id).await;
                        let conn = self.conn()?;
                        SessionRepo::set_status(&conn, child.id, SessionStatus::Stopped)?;
                    }
                }
                let conn = self.conn()?;
                InfoCopyGroupRepo::remove_member(&conn, group_id, ic_id)?;
            }
            EntityKind::Request => {
                let request_id = RequestId(member_id);
                let group_id = {
                    let conn = self.conn()?;
                    RequestGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                        .id
                };
                let parents = {
                    let conn = self.conn()?;
                    SessionRepo::running_parents_by_request_group(&conn, group_id)?
                };
                for parent in parents {
                    let children = {
                        let conn = self.conn()?;
                        SessionRepo::running_children_of(&conn, parent.id)?
                    };
                    for child in children.into_iter().filter(|c| c.request_id == Some(request_id)) {
                        self.supervisor.terminate(child.id).await;
                        let conn = self.conn()?;
                        SessionRepo::set_status(&conn, child.id, SessionStatus::Stopped)?;
                    }
                }
                let conn = self.conn()?;
                RequestGroupRepo::remove_member(&conn, group_id, request_id)?;
            }
        }
        Ok(())
    }

    /// Stops every running child of every parent bound to the named group,
    /// then deletes the group (the membership rows cascade).
    pub async fn remove_group(&self, kind: EntityKind, group_name: &str) -> Result<()> {
        match kind {
            EntityKind::Profile => {
                let group = {
                    let conn = self.conn()?;
                    ProfileGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                };
                self.stop_parents_by_profile_group(group.id).await?;
                let conn = self.conn()?;
                ProfileGroupRepo::remove(&conn, group_name)?;
            }
            EntityKind::InfoCopy => {
                let group = {
                    let conn = self.conn()?;
                    InfoCopyGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                };
                self.stop_parents_by_info_copy_group(group.id).await?;
                let conn = self.conn()?;
                InfoCopyGroupRepo::remove(&conn, group_name)?;
            }
            EntityKind::Request => {
                let group = {
                    let conn = self.conn()?;
                    RequestGroupRepo::get_by_name(&conn, group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.to_string()))?
                };
                self.stop_parents_by_request_group(group.id).await?;
                let conn = self.conn()?;
                RequestGroupRepo::remove(&conn, group_name)?;
            }
        }
        Ok(())
    }

    async fn stop_parents_by_profile_group(&self, group_id: GroupId) -> Result<()> {
        let parents = {
            let conn = self.conn()?;
            SessionRepo::parents_by_profile_group(&conn, group_id)?
        };
        for parent in parents {
            self.stop_session(parent.id).await?;
        }
        Ok(())
    }

    async fn stop_parents_by_info_copy_group(&self, group_id: GroupId) -> Result<()> {
        let parents = {
            let conn = self.conn()?;
            SessionRepo::parents_by_info_copy_group(&conn, group_id)?
        };
        for parent in parents {
            self.stop_session(parent.id).await?;
        }
        Ok(())
    }

    async fn stop_parents_by_request_group(&self, group_id: GroupId) -> Result<()> {
        let parents = {
            let conn = self.conn()?;
            SessionRepo::parents_by_request_group(&conn, group_id)?
        };
        for parent in parents {
            self.stop_session(parent.id).await?;
        }
        Ok(())
    }

    /// Fails every RUNNING session that targets a profile, directly or
    /// through a group the profile belongs to.
    pub async fn fail_sessions_on_target(&self, target: AvatarIdentifier) -> Result<usize> {
        let mut failed = 0;
        match target {
            AvatarIdentifier::Id(profile_id) => {
                let conn = self.conn()?;
                let sessions = SessionRepo::running_referencing_profile(&conn, profile_id)?;
                drop(conn);
                for session in sessions {
                    self.supervisor.terminate(session.id).await;
                    let conn = self.conn()?;
                    SessionRepo::set_status(&conn, session.id, SessionStatus::Failed)?;
                    failed += 1;
                }
            }
            AvatarIdentifier::Group(group_name) => {
                let group_id = {
                    let conn = self.conn()?;
                    ProfileGroupRepo::get_by_name(&conn, &group_name)?
                        .ok_or_else(|| Error::GroupNotFound(group_name.clone()))?
                        .id
                };
                let parents = {
                    let conn = self.conn()?;
                    SessionRepo::running_parents_by_profile_group(&conn, group_id)?
                };
                for parent in parents {
                    let children = {
                        let conn = self.conn()?;
                        SessionRepo::running_children_of(&conn, parent.id)?
                    };
                    for child in children {
                        self.supervisor.terminate(child.id).await;
                        let conn = self.conn()?;
                        SessionRepo::set_status(&conn, child.id, SessionStatus::Failed)?;
                        failed += 1;
                    }
                    self.supervisor.terminate(parent.id).await;
                    let conn = self.conn()?;
                    SessionRepo::set_status(&conn, parent.id, SessionStatus::Failed)?;
                    failed += 1;
                }
            }
        }
        Ok(failed)
    }

    pub async fn fail_all_running(&self) -> Result<usize> {
        let sessions = {
            let conn = self.conn()?;
            SessionRepo::all_running(&conn)?
        };
        let mut failed = 0;
        for session in sessions {
            self.supervisor.terminate(session.id).await;
            let conn = self.conn()?;
            SessionRepo::set_status(&conn, session.id, SessionStatus::Failed)?;
            failed += 1;
        }
        Ok(failed)
    }

    /// Recreates every non-parent FAILED session as a new SCHEDULED session
    /// and spawns it; the original is marked RESTARTED. Parent-group FAILED
    /// rows are only marked RESTARTED — their children are the unit of
    /// redo, and were already recreated individually in the loop above them
    /// (parents are iterated after their children in this implementation,
    /// so no parent ever gets copied as though it were a leaf).
    pub async fn redo_failed(&self) -> Result<usize> {
        let (leaves, parents) = {
            let conn = self.conn()?;
            (
                SessionRepo::all_failed_leaves(&conn)?,
                SessionRepo::all_failed_parents(&conn)?,
            )
        };

        let mut redone = 0;
        for leaf in leaves {
            let new_session = NewSession {
                kind: Some(leaf.kind),
                parent_id: None,
                is_group: false,
                description: format!("[REDO] {}", leaf.description),
                source_profile_id: leaf.source_profile_id,
                dest_profile_id: leaf.dest_profile_id,
                info_copy_id: leaf.info_copy_id,
                request_id: leaf.request_id,
                profile_group_id: leaf.profile_group_id,
                info_copy_group_id: leaf.info_copy_group_id,
                request_group_id: leaf.request_group_id,
                start_time: Utc::now().to_rfc3339(),
                end_time: leaf.end_time.clone(),
            };
            let conn = self.conn()?;
            self.spawn_leaf(&conn, &new_session).await?;
            SessionRepo::set_status(&conn, leaf.id, SessionStatus::Restarted)?;
            redone += 1;
        }

        for parent in parents {
            let conn = self.conn()?;
            SessionRepo::set_status(&conn, parent.id, SessionStatus::Restarted)?;
        }

        Ok(redone)
    }

    /// Every RUNNING leaf where the given profile is source or destination.
    /// `identifier` is a numeric profile id or a profile name — because
    /// group-valued starts always expand into one leaf per current member
    /// (see `muster-supervisor::expander`), a profile that is only a group
    /// member is always reachable this way too, with no separate
    /// group-membership traversal needed.
    ///
    /// The target string is the leaf's own description, unless the leaf was
    /// spawned under a group parent, in which case it is promoted to name
    /// the parent group session instead.
    pub async fn view_running_on(&self, identifier: &str) -> Result<Vec<RunningView>> {
        let conn = self.conn()?;
        let profile_id = match identifier.parse::<i64>() {
            Ok(id) => ProfileId(id),
            Err(_) => {
                ProfileRepo::get_by_name(&conn, identifier)?
                    .ok_or_else(|| Error::ProfileNotFound(-1))?
                    .id
            }
        };

        let mut rows = Vec::new();
        for session in SessionRepo::running_referencing_profile(&conn, profile_id)? {
            let target = match session.parent_id {
                Some(parent_id) => match SessionRepo::get(&conn, parent_id)? {
                    Some(parent) if parent.is_group => {
                        format!("Part of Group Session #{}: {}", parent.id, parent.description)
                    }
                    _ => session.description.clone(),
                },
                None => session.description.clone(),
            };
            rows.push(RunningView {
                session_id: session.id,
                kind: session.kind,
                target,
                duration_minutes: session.duration_minutes(),
            });
        }
        Ok(rows)
    }

    /// Forces every on-disk RUNNING session to FAILED. Called once at
    /// daemon startup since a restart means every tracked worker handle
    /// from the previous run is gone.
    pub async fn recover_orphans(&self) -> Result<usize> {
        let conn = self.conn()?;
        let orphans = SessionRepo::all_running(&conn)?;
        let count = orphans.len();
        for session in orphans {
            SessionRepo::set_status(&conn, session.id, SessionStatus::Failed)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_store::repositories::entities::{
        CreateInfoCopyOptions, CreateProfileOptions, InfoCopyRepo, ProfileRepo,
    };
    use muster_store::{new_in_memory, ConnectionConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_graph() -> SessionGraph {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let cache = Arc::new(PayloadCache::new());
        let supervisor = Arc::new(ProcessSupervisor::new(
            PathBuf::from("/usr/bin/true"),
            ":memory:".to_string(),
            Duration::from_millis(200),
        ));
        SessionGraph::new(pool, cache, supervisor)
    }

    fn make_profile(graph: &SessionGraph, name: &str) -> ProfileId {
        let conn = graph.pool.get().unwrap();
        ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name,
                photo: b"photo",
                info: "info",
            },
        )
        .unwrap()
        .id
    }

    fn make_ic(graph: &SessionGraph, name: &str) -> InfoCopyId {
        let conn = graph.pool.get().unwrap();
        InfoCopyRepo::create(&conn, CreateInfoCopyOptions { name, payload: b"audio" })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn single_ic_on_single_profile_has_no_parent() {
        let graph = test_graph();
        let profile_id = make_profile(&graph, "p1");
        let ic_id = make_ic(&graph, "ic1");

        let (parent, leaves) = graph
            .start_ic(Some(profile_id.get()), None, ic_id, None)
            .await
            .unwrap();

        assert!(parent.is_none());
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].status, SessionStatus::Running);
        assert!(leaves[0].end_time.is_none());
    }

    #[tokio::test]
    async fn ic_on_profile_group_creates_parent_and_leaves() {
        let graph = test_graph();
        let p1 = make_profile(&graph, "p1");
        let p2 = make_profile(&graph, "p2");
        let ic_id = make_ic(&graph, "ic1");
        {
            let conn = graph.pool.get().unwrap();
            let group = muster_store::repositories::groups::ProfileGroupRepo::create(&conn, "g").unwrap();
            muster_store::repositories::groups::ProfileGroupRepo::add_member(&conn, group.id, p1).unwrap();
            muster_store::repositories::groups::ProfileGroupRepo::add_member(&conn, group.id, p2).unwrap();
        }

        let (parent, leaves) = graph
            .start_ic(None, Some("g"), ic_id, Some(30))
            .await
            .unwrap();

        let parent = parent.unwrap();
        assert!(parent.is_group);
        assert_eq!(leaves.len(), 2);
        for leaf in &leaves {
            assert_eq!(leaf.end_time, parent.end_time);
        }
    }

    #[tokio::test]
    async fn stopping_parent_stops_children() {
        let graph = test_graph();
        let p1 = make_profile(&graph, "p1");
        let ic_id = make_ic(&graph, "ic1");
        {
            let conn = graph.pool.get().unwrap();
            let group = muster_store::repositories::groups::ProfileGroupRepo::create(&conn, "g").unwrap();
            muster_store::repositories::groups::ProfileGroupRepo::add_member(&conn, group.id, p1).unwrap();
        }
        let (parent, leaves) = graph.start_ic(None, Some("g"), ic_id, None).await.unwrap();
        let parent = parent.unwrap();

        graph.stop_session(parent.id).await.unwrap();

        let conn = graph.pool.get().unwrap();
        let parent_after = SessionRepo::get(&conn, parent.id).unwrap().unwrap();
        let leaf_after = SessionRepo::get(&conn, leaves[0].id).unwrap().unwrap();
        assert_eq!(parent_after.status, SessionStatus::Stopped);
        assert_eq!(leaf_after.status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn add_member_spawns_new_leaf_under_running_parent() {
        let graph = test_graph();
        let p1 = make_profile(&graph, "p1");
        let p2 = make_profile(&graph, "p2");
        let ic_id = make_ic(&graph, "ic1");
        let group_id = {
            let conn = graph.pool.get().unwrap();
            let group = muster_store::repositories::groups::ProfileGroupRepo::create(&conn, "g").unwrap();
            muster_store::repositories::groups::ProfileGroupRepo::add_member(&conn, group.id, p1).unwrap();
            group.id
        };
        let (parent, _leaves) = graph.start_ic(None, Some("g"), ic_id, None).await.unwrap();
        let parent = parent.unwrap();

        let spawned = graph
            .add_member_to_group(EntityKind::Profile, "g", p2.get())
            .await
            .unwrap();
        assert_eq!(spawned, 1);

        let conn = graph.pool.get().unwrap();
        let children = SessionRepo::children_of(&conn, parent.id).unwrap();
        assert_eq!(children.len(), 2);
        let _ = group_id;
    }

    #[tokio::test]
    async fn fail_all_running_then_redo_recreates_sessions() {
        let graph = test_graph();
        let profile_id = make_profile(&graph, "p1");
        let ic_id = make_ic(&graph, "ic1");
        graph.start_ic(Some(profile_id.get()), None, ic_id, None).await.unwrap();

        let failed = graph.fail_all_running().await.unwrap();
        assert_eq!(failed, 1);

        let redone = graph.redo_failed().await.unwrap();
        assert_eq!(redone, 1);

        let conn = graph.pool.get().unwrap();
        let running = SessionRepo::all_running(&conn).unwrap();
        assert_eq!(running.len(), 1);
        assert!(running[0].description.starts_with("[REDO] "));
    }
}
