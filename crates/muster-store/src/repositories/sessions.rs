//! Session persistence: creation, status transitions, and the lookup
//! queries the session-graph operations in `muster-supervisor` are built on
//! top of.

use chrono::Utc;
use muster_core::{
    Error, GroupId, InfoCopyId, ProfileId, RequestId, Result, SessionId, SessionKind,
    SessionStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{NewSession, Session};

pub struct SessionRepo;

impl SessionRepo {
    pub fn create(conn: &Connection, new: &NewSession) -> Result<Session> {
        let now = Utc::now().to_rfc3339();
        let kind = new
            .kind
            .ok_or_else(|| Error::Internal("session kind required".to_string()))?;
        conn.execute(
            "INSERT INTO sessions (
                kind, parent_id, is_group, description,
                source_profile_id, dest_profile_id, info_copy_id, request_id,
                profile_group_id, info_copy_group_id, request_group_id,
                status, start_time, end_time, worker_pid, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL, ?15)",
            params![
                kind.as_str(),
                new.parent_id.map(SessionId::get),
                new.is_group,
                new.description,
                new.source_profile_id.map(ProfileId::get),
                new.dest_profile_id.map(ProfileId::get),
                new.info_copy_id.map(InfoCopyId::get),
                new.request_id.map(RequestId::get),
                new.profile_group_id.map(GroupId::get),
                new.info_copy_group_id.map(GroupId::get),
                new.request_group_id.map(GroupId::get),
                SessionStatus::Scheduled.as_str(),
                new.start_time,
                new.end_time,
                now,
            ],
        )?;
        let id = SessionId(conn.last_insert_rowid());
        Self::get(conn, id)?.ok_or(Error::SessionNotFound(id.get()))
    }

    pub fn get(conn: &Connection, id: SessionId) -> Result<Option<Session>> {
        conn.query_row(&format!("{SELECT_SESSION} WHERE id = ?1"), [id.get()], row_to_session)
            .optional()
            .map_err(Error::from)
    }

    /// Sets a session RUNNING with the given worker pid.
    pub fn mark_running(conn: &Connection, id: SessionId, pid: i64) -> Result<()> {
        Self::touch(
            conn,
            id,
            SessionStatus::Running,
            Some(pid),
        )
    }

    /// Moves a session to a terminal (or scheduled) status, clearing the pid
    /// unless the new status is `Running`.
    pub fn set_status(conn: &Connection, id: SessionId, status: SessionStatus) -> Result<()> {
        Self::touch(conn, id, status, None)
    }

    fn touch(conn: &Connection, id: SessionId, status: SessionStatus, pid: Option<i64>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let pid = if status == SessionStatus::Running { pid } else { None };
        let affected = conn.execute(
            "UPDATE sessions SET status = ?1, worker_pid = ?2, last_updated = ?3 WHERE id = ?4",
            params![status.as_str(), pid, now, id.get()],
        )?;
        if affected == 0 {
            return Err(Error::SessionNotFound(id.get()));
        }
        Ok(())
    }

    pub fn children_of(conn: &Connection, parent_id: SessionId) -> Result<Vec<Session>> {
        query_sessions(conn, &format!("{SELECT_SESSION} WHERE parent_id = ?1"), [parent_id.get()])
    }

    pub fn running_children_of(conn: &Connection, parent_id: SessionId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE parent_id = ?1 AND status = 'running'"),
            [parent_id.get()],
        )
    }

    pub fn all_running(conn: &Connection) -> Result<Vec<Session>> {
        query_sessions(conn, &format!("{SELECT_SESSION} WHERE status = 'running'"), rusqlite::params![])
    }

    pub fn all_failed_leaves(conn: &Connection) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE status = 'failed' AND is_group = 0"),
            rusqlite::params![],
        )
    }

    pub fn all_failed_parents(conn: &Connection) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE status = 'failed' AND is_group = 1"),
            rusqlite::params![],
        )
    }

    /// RUNNING leaves where the profile appears as source or destination
    /// (used by `update_entity` and `remove_entity` on profiles).
    pub fn running_referencing_profile(conn: &Connection, profile_id: ProfileId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!(
                "{SELECT_SESSION} WHERE status = 'running' AND (source_profile_id = ?1 OR dest_profile_id = ?1)"
            ),
            [profile_id.get()],
        )
    }

    pub fn running_referencing_info_copy(conn: &Connection, ic_id: InfoCopyId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE status = 'running' AND info_copy_id = ?1"),
            [ic_id.get()],
        )
    }

    pub fn running_referencing_request(conn: &Connection, request_id: RequestId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE status = 'running' AND request_id = ?1"),
            [request_id.get()],
        )
    }

    /// RUNNING parents bound to a given profile group, of any kind
    /// (`ic_session`/`request_session`/`avatar_link`/`group_ic_session`).
    pub fn running_parents_by_profile_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!(
                "{SELECT_SESSION} WHERE status = 'running' AND is_group = 1 AND profile_group_id = ?1"
            ),
            [group_id.get()],
        )
    }

    pub fn running_parents_by_info_copy_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!(
                "{SELECT_SESSION} WHERE status = 'running' AND is_group = 1 AND info_copy_group_id = ?1"
            ),
            [group_id.get()],
        )
    }

    pub fn running_parents_by_request_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!(
                "{SELECT_SESSION} WHERE status = 'running' AND is_group = 1 AND request_group_id = ?1"
            ),
            [group_id.get()],
        )
    }

    /// All sessions (any status) bound to a profile group — used when the
    /// group itself is removed.
    pub fn parents_by_profile_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE is_group = 1 AND profile_group_id = ?1"),
            [group_id.get()],
        )
    }

    pub fn parents_by_info_copy_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE is_group = 1 AND info_copy_group_id = ?1"),
            [group_id.get()],
        )
    }

    pub fn parents_by_request_group(conn: &Connection, group_id: GroupId) -> Result<Vec<Session>> {
        query_sessions(
            conn,
            &format!("{SELECT_SESSION} WHERE is_group = 1 AND request_group_id = ?1"),
            [group_id.get()],
        )
    }
}

const SELECT_SESSION: &str = "SELECT id, kind, parent_id, is_group, description,
    source_profile_id, dest_profile_id, info_copy_id, request_id,
    profile_group_id, info_copy_group_id, request_group_id,
    status, start_time, end_time, worker_pid, last_updated
    FROM sessions";

fn query_sessions<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, row_to_session)?
        .collect::<std::result::Result<Vec<Session>, _>>()?;
    Ok(rows)
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let kind_str: String = row.get(1)?;
    let status_str: String = row.get(12)?;
    Ok(Session {
        id: SessionId(row.get(0)?),
        kind: kind_str.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "kind".to_string(), rusqlite::types::Type::Text)
        })?,
        parent_id: row.get::<_, Option<i64>>(2)?.map(SessionId),
        is_group: row.get(3)?,
        description: row.get(4)?,
        source_profile_id: row.get::<_, Option<i64>>(5)?.map(ProfileId),
        dest_profile_id: row.get::<_, Option<i64>>(6)?.map(ProfileId),
        info_copy_id: row.get::<_, Option<i64>>(7)?.map(InfoCopyId),
        request_id: row.get::<_, Option<i64>>(8)?.map(RequestId),
        profile_group_id: row.get::<_, Option<i64>>(9)?.map(GroupId),
        info_copy_group_id: row.get::<_, Option<i64>>(10)?.map(GroupId),
        request_group_id: row.get::<_, Option<i64>>(11)?.map(GroupId),
        status: status_str.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(12, "status".to_string(), rusqlite::types::Type::Text)
        })?,
        start_time: row.get(13)?,
        end_time: row.get(14)?,
        worker_pid: row.get(15)?,
        last_updated: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, ConnectionConfig};

    fn new_leaf(kind: SessionKind) -> NewSession {
        NewSession {
            kind: Some(kind),
            description: "test session".to_string(),
            start_time: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    #[test]
    fn create_and_get_round_trips() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let created = SessionRepo::create(&conn, &new_leaf(SessionKind::IcSession)).unwrap();
        assert_eq!(created.status, SessionStatus::Scheduled);
        let fetched = SessionRepo::get(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched.kind, SessionKind::IcSession);
    }

    #[test]
    fn mark_running_sets_pid() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let created = SessionRepo::create(&conn, &new_leaf(SessionKind::IcSession)).unwrap();
        SessionRepo::mark_running(&conn, created.id, 4242).unwrap();
        let fetched = SessionRepo::get(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Running);
        assert_eq!(fetched.worker_pid, Some(4242));
    }

    #[test]
    fn set_status_clears_pid_when_not_running() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let created = SessionRepo::create(&conn, &new_leaf(SessionKind::IcSession)).unwrap();
        SessionRepo::mark_running(&conn, created.id, 4242).unwrap();
        SessionRepo::set_status(&conn, created.id, SessionStatus::Stopped).unwrap();
        let fetched = SessionRepo::get(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Stopped);
        assert_eq!(fetched.worker_pid, None);
    }

    #[test]
    fn set_status_missing_session_errors() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let err = SessionRepo::set_status(&conn, SessionId(999), SessionStatus::Failed).unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(999)));
    }

    #[test]
    fn children_of_filters_by_parent() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let parent = SessionRepo::create(
            &conn,
            &NewSession {
                is_group: true,
                ..new_leaf(SessionKind::GroupIcSession)
            },
        )
        .unwrap();
        let child = SessionRepo::create(
            &conn,
            &NewSession {
                parent_id: Some(parent.id),
                ..new_leaf(SessionKind::GroupIcSession)
            },
        )
        .unwrap();
        let children = SessionRepo::children_of(&conn, parent.id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }
}
