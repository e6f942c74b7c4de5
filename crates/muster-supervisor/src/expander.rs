//! Resolves command arguments (a bare id, or a group name) into the
//! cartesian-product session tree a start command produces.

use chrono::Utc;
use muster_core::{Error, GroupId, InfoCopyId, ProfileId, RequestId, Result, SessionKind};
use muster_store::models::NewSession;
use muster_store::repositories::groups::{InfoCopyGroupRepo, ProfileGroupRepo, RequestGroupRepo};
use rusqlite::Connection;

/// Either a single entity id, or every current member of a named group.
pub enum Target<T> {
    Single(T),
    Group { id: GroupId, members: Vec<T> },
}

impl<T: Copy> Target<T> {
    pub fn members(&self) -> Vec<T> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Group { members, .. } => members.clone(),
        }
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Single(_) => None,
            Self::Group { id, .. } => Some(*id),
        }
    }
}

pub fn resolve_profile_target(
    conn: &Connection,
    id: Option<i64>,
    group_name: Option<&str>,
) -> Result<Target<ProfileId>> {
    match (id, group_name) {
        (Some(id), None) => Ok(Target::Single(ProfileId(id))),
        (None, Some(name)) => {
            let group = ProfileGroupRepo::get_by_name(conn, name)?
                .ok_or_else(|| Error::GroupNotFound(name.to_string()))?;
            let members = ProfileGroupRepo::list_members(conn, group.id)?;
            if members.is_empty() {
                return Err(Error::EmptyGroup(name.to_string()));
            }
            Ok(Target::Group { id: group.id, members })
        }
        _ => Err(Error::InvalidArguments(
            "exactly one of id or group must be set".to_string(),
        )),
    }
}

pub fn resolve_info_copy_target(
    conn: &Connection,
    id: Option<i64>,
    group_name: Option<&str>,
) -> Result<Target<InfoCopyId>> {
    match (id, group_name) {
        (Some(id), None) => Ok(Target::Single(InfoCopyId(id))),
        (None, Some(name)) => {
            let group = InfoCopyGroupRepo::get_by_name(conn, name)?
                .ok_or_else(|| Error::GroupNotFound(name.to_string()))?;
            let members = InfoCopyGroupRepo::list_members(conn, group.id)?;
            if members.is_empty() {
                return Err(Error::EmptyGroup(name.to_string()));
            }
            Ok(Target::Group { id: group.id, members })
        }
        _ => Err(Error::InvalidArguments(
            "exactly one of id or group must be set".to_string(),
        )),
    }
}

pub fn resolve_request_target(
    conn: &Connection,
    id: Option<i64>,
    group_name: Option<&str>,
) -> Result<Target<RequestId>> {
    match (id, group_name) {
        (Some(id), None) => Ok(Target::Single(RequestId(id))),
        (None, Some(name)) => {
            let group = RequestGroupRepo::get_by_name(conn, name)?
                .ok_or_else(|| Error::GroupNotFound(name.to_string()))?;
            let members = RequestGroupRepo::list_members(conn, group.id)?;
            if members.is_empty() {
                return Err(Error::EmptyGroup(name.to_string()));
            }
            Ok(Target::Group { id: group.id, members })
        }
        _ => Err(Error::InvalidArguments(
            "exactly one of id or group must be set".to_string(),
        )),
    }
}

/// A resolved but not-yet-persisted session tree: an optional parent plus
/// its leaves. `parent` is `None` when neither side of the command was
/// group-valued.
pub struct Plan {
    pub parent: Option<NewSession>,
    pub leaves: Vec<NewSession>,
}

fn timing(duration_minutes: Option<i64>) -> (String, Option<String>) {
    let start = Utc::now();
    let end = duration_minutes.map(|minutes| (start + chrono::Duration::minutes(minutes)).to_rfc3339());
    (start.to_rfc3339(), end)
}

pub fn plan_start_ic(
    profile: &Target<ProfileId>,
    ic_id: InfoCopyId,
    duration_minutes: Option<i64>,
) -> Plan {
    let (start_time, end_time) = timing(duration_minutes);
    let parent = profile.group_id().map(|group_id| NewSession {
        kind: Some(SessionKind::IcSession),
        is_group: true,
        description: format!("info-copy {ic_id} on profile group"),
        info_copy_id: Some(ic_id),
        profile_group_id: Some(group_id),
        start_time: start_time.clone(),
        end_time: end_time.clone(),
        ..Default::default()
    });
    let leaves = profile
        .members()
        .into_iter()
        .map(|profile_id| NewSession {
            kind: Some(SessionKind::IcSession),
            description: format!("info-copy {ic_id} on profile {profile_id}"),
            source_profile_id: Some(profile_id),
            info_copy_id: Some(ic_id),
            start_time: start_time.clone(),
            end_time: end_time.clone(),
            ..Default::default()
        })
        .collect();
    Plan { parent, leaves }
}

pub fn plan_start_request(
    profile: &Target<ProfileId>,
    request: &Target<RequestId>,
    duration_minutes: Option<i64>,
) -> Plan {
    let (start_time, end_time) = timing(duration_minutes);
    let needs_parent = profile.group_id().is_some() || request.group_id().is_some();
    let parent = needs_parent.then(|| NewSession {
        kind: Some(SessionKind::RequestSession),
        is_group: true,
        description: "request on profile group".to_string(),
        profile_group_id: profile.group_id(),
        request_group_id: request.group_id(),
        start_time: start_time.clone(),
        end_time: end_time.clone(),
        ..Default::default()
    });
    let mut leaves = Vec::new();
    for profile_id in profile.members() {
        for request_id in request.members() {
            leaves.push(NewSession {
                kind: Some(SessionKind::RequestSession),
                description: format!("request {request_id} on profile {profile_id}"),
                source_profile_id: Some(profile_id),
                request_id: Some(request_id),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
                ..Default::default()
            });
        }
    }
    Plan { parent, leaves }
}

pub fn plan_start_link(
    source: ProfileId,
    dest: &Target<ProfileId>,
    duration_minutes: Option<i64>,
) -> Plan {
    let (start_time, end_time) = timing(duration_minutes);
    let parent = dest.group_id().map(|group_id| NewSession {
        kind: Some(SessionKind::AvatarLink),
        is_group: true,
        description: format!("link from profile {source} to profile group"),
        source_profile_id: Some(source),
        profile_group_id: Some(group_id),
        start_time: start_time.clone(),
        end_time: end_time.clone(),
        ..Default::default()
    });
    let leaves = dest
        .members()
        .into_iter()
        .filter(|dest_id| *dest_id != source)
        .map(|dest_id| NewSession {
            kind: Some(SessionKind::AvatarLink),
            description: format!("link from profile {source} to profile {dest_id}"),
            source_profile_id: Some(source),
            dest_profile_id: Some(dest_id),
            start_time: start_time.clone(),
            end_time: end_time.clone(),
            ..Default::default()
        })
        .collect();
    Plan { parent, leaves }
}

pub fn plan_start_group(
    profile: &Target<ProfileId>,
    info_copy: &Target<InfoCopyId>,
    duration_minutes: Option<i64>,
) -> Result<Plan> {
    let (start_time, end_time) = timing(duration_minutes);
    let profile_group_id = profile
        .group_id()
        .ok_or_else(|| Error::InvalidArguments("avatar_group is required".to_string()))?;
    let info_copy_group_id = info_copy
        .group_id()
        .ok_or_else(|| Error::InvalidArguments("ic_group is required".to_string()))?;

    let parent = Some(NewSession {
        kind: Some(SessionKind::GroupIcSession),
        is_group: true,
        description: "group-to-group info-copy session".to_string(),
        profile_group_id: Some(profile_group_id),
        info_copy_group_id: Some(info_copy_group_id),
        start_time: start_time.clone(),
        end_time: end_time.clone(),
        ..Default::default()
    });

    let mut leaves = Vec::new();
    for profile_id in profile.members() {
        for ic_id in info_copy.members() {
            leaves.push(NewSession {
                kind: Some(SessionKind::IcSession),
                description: format!("info-copy {ic_id} on profile {profile_id} (group)"),
                source_profile_id: Some(profile_id),
                info_copy_id: Some(ic_id),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
                ..Default::default()
            });
        }
    }
    Ok(Plan { parent, leaves })
}
