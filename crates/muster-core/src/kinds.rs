//! Enumerations mirrored directly in the `sessions` table (stored as their
//! lowercase string form so the database stays human-readable).

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// What a session is doing, and therefore which reference columns are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    IcSession,
    RequestSession,
    AvatarLink,
    GroupIcSession,
}

impl SessionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IcSession => "ic_session",
            Self::RequestSession => "request_session",
            Self::AvatarLink => "avatar_link",
            Self::GroupIcSession => "group_ic_session",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ic_session" => Ok(Self::IcSession),
            "request_session" => Ok(Self::RequestSession),
            "avatar_link" => Ok(Self::AvatarLink),
            "group_ic_session" => Ok(Self::GroupIcSession),
            other => Err(Error::Internal(format!("unknown session kind: {other}"))),
        }
    }
}

/// Lifecycle of a session row. Terminal variants are never transitioned out
/// of, with the single exception of `redo_failed` moving `Failed` to
/// `Restarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Running,
    Completed,
    Stopped,
    Failed,
    Restarted,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Restarted => "restarted",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Failed | Self::Restarted
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "restarted" => Ok(Self::Restarted),
            other => Err(Error::Internal(format!("unknown session status: {other}"))),
        }
    }
}

/// The three catalog entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    InfoCopy,
    Request,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "avatar",
            Self::InfoCopy => "ic",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(Self::Profile),
            "ic" => Ok(Self::InfoCopy),
            "request" => Ok(Self::Request),
            other => Err(Error::Internal(format!("unknown entity type: {other}"))),
        }
    }
}

/// Which kind of group a `group_type` wire field refers to. Shares the wire
/// vocabulary with [`EntityKind`] (`avatar`/`ic`/`request`).
pub type GroupKind = EntityKind;
