//! The daemon's single error type. Every layer (store, cache, supervisor,
//! server) converts its failures into this enum before it crosses a crate
//! boundary, so the command server has one thing to translate into a wire
//! reply.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("migration error: {message}")]
    Migration { message: String },

    #[error("profile not found: {0}")]
    ProfileNotFound(i64),

    #[error("info copy not found: {0}")]
    InfoCopyNotFound(i64),

    #[error("request not found: {0}")]
    RequestNotFound(i64),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(i64),

    #[error("name already in use: {0}")]
    DuplicateName(String),

    #[error("argument shape invalid: {0}")]
    InvalidArguments(String),

    #[error("group is empty: {0}")]
    EmptyGroup(String),

    #[error("failed to spawn worker: {0}")]
    SpawnFailure(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = Error::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn migration_error_display() {
        let err = Error::Migration {
            message: "v002 failed".into(),
        };
        assert_eq!(err.to_string(), "migration error: v002 failed");
    }

    #[test]
    fn session_not_found_display() {
        let err = Error::SessionNotFound(42);
        assert_eq!(err.to_string(), "session not found: 42");
    }

    #[test]
    fn duplicate_name_display() {
        let err = Error::DuplicateName("alice".into());
        assert_eq!(err.to_string(), "name already in use: alice");
    }

    #[test]
    fn from_rusqlite_error() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Sqlite(_)));
    }

    #[test]
    fn result_alias() {
        fn example() -> Result<&'static str> {
            Ok("ok")
        }
        assert_eq!(example().unwrap(), "ok");
    }
}
