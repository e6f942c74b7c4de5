//! Profile / info-copy / request catalog repositories.
//!
//! Each repo is a stateless struct of `pub fn` static methods over a
//! borrowed [`rusqlite::Connection`] — no connection pooling concern lives
//! here, that's the caller's job via [`crate::pool`].

use chrono::Utc;
use muster_core::{Error, InfoCopyId, ProfileId, Result, RequestId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{InfoCopy, Profile, Request};

#[derive(Debug, Clone, Default)]
pub struct CreateProfileOptions<'a> {
    pub name: &'a str,
    pub photo: &'a [u8],
    pub info: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileOptions<'a> {
    pub name: Option<&'a str>,
    pub photo: Option<&'a [u8]>,
    pub info: Option<&'a str>,
}

pub struct ProfileRepo;

impl ProfileRepo {
    pub fn create(conn: &Connection, opts: CreateProfileOptions<'_>) -> Result<Profile> {
        if Self::get_by_name(conn, opts.name)?.is_some() {
            return Err(Error::DuplicateName(opts.name.to_string()));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO profiles (name, photo, info, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![opts.name, opts.photo, opts.info, now],
        )?;
        let id = ProfileId(conn.last_insert_rowid());
        Ok(Profile {
            id,
            name: opts.name.to_string(),
            photo: opts.photo.to_vec(),
            info: opts.info.to_string(),
            created_at: now,
        })
    }

    pub fn get_by_id(conn: &Connection, id: ProfileId) -> Result<Option<Profile>> {
        conn.query_row(
            "SELECT id, name, photo, info, created_at FROM profiles WHERE id = ?1",
            [id.get()],
            row_to_profile,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Profile>> {
        conn.query_row(
            "SELECT id, name, photo, info, created_at FROM profiles WHERE name = ?1",
            [name],
            row_to_profile,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Applies a partial update and returns the new row. Does not touch
    /// sessions or cache — callers (the supervisor) are responsible for
    /// restarting affected running sessions and evicting the cache entry.
    pub fn update(
        conn: &Connection,
        id: ProfileId,
        opts: UpdateProfileOptions<'_>,
    ) -> Result<Profile> {
        let existing = Self::get_by_id(conn, id)?.ok_or(Error::ProfileNotFound(id.get()))?;
        if let Some(name) = opts.name {
            if name != existing.name && Self::get_by_name(conn, name)?.is_some() {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }
        let name = opts.name.unwrap_or(&existing.name);
        let photo = opts.photo.unwrap_or(&existing.photo);
        let info = opts.info.unwrap_or(&existing.info);
        conn.execute(
            "UPDATE profiles SET name = ?1, photo = ?2, info = ?3 WHERE id = ?4",
            params![name, photo, info, id.get()],
        )?;
        Self::get_by_id(conn, id)?.ok_or(Error::ProfileNotFound(id.get()))
    }

    pub fn remove(conn: &Connection, id: ProfileId) -> Result<()> {
        let affected = conn.execute("DELETE FROM profiles WHERE id = ?1", [id.get()])?;
        if affected == 0 {
            return Err(Error::ProfileNotFound(id.get()));
        }
        Ok(())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: ProfileId(row.get(0)?),
        name: row.get(1)?,
        photo: row.get(2)?,
        info: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CreateInfoCopyOptions<'a> {
    pub name: &'a str,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Default)]
pub struct UpdateInfoCopyOptions<'a> {
    pub name: Option<&'a str>,
    pub payload: Option<&'a [u8]>,
}

pub struct InfoCopyRepo;

impl InfoCopyRepo {
    pub fn create(conn: &Connection, opts: CreateInfoCopyOptions<'_>) -> Result<InfoCopy> {
        if Self::get_by_name(conn, opts.name)?.is_some() {
            return Err(Error::DuplicateName(opts.name.to_string()));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO info_copies (name, payload, created_at) VALUES (?1, ?2, ?3)",
            params![opts.name, opts.payload, now],
        )?;
        Ok(InfoCopy {
            id: InfoCopyId(conn.last_insert_rowid()),
            name: opts.name.to_string(),
            payload: opts.payload.to_vec(),
            created_at: now,
        })
    }

    pub fn get_by_id(conn: &Connection, id: InfoCopyId) -> Result<Option<InfoCopy>> {
        conn.query_row(
            "SELECT id, name, payload, created_at FROM info_copies WHERE id = ?1",
            [id.get()],
            row_to_info_copy,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<InfoCopy>> {
        conn.query_row(
            "SELECT id, name, payload, created_at FROM info_copies WHERE name = ?1",
            [name],
            row_to_info_copy,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn update(
        conn: &Connection,
        id: InfoCopyId,
        opts: UpdateInfoCopyOptions<'_>,
    ) -> Result<InfoCopy> {
        let existing = Self::get_by_id(conn, id)?.ok_or(Error::InfoCopyNotFound(id.get()))?;
        if let Some(name) = opts.name {
            if name != existing.name && Self::get_by_name(conn, name)?.is_some() {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }
        let name = opts.name.unwrap_or(&existing.name);
        let payload = opts.payload.unwrap_or(&existing.payload);
        conn.execute(
            "UPDATE info_copies SET name = ?1, payload = ?2 WHERE id = ?3",
            params![name, payload, id.get()],
        )?;
        Self::get_by_id(conn, id)?.ok_or(Error::InfoCopyNotFound(id.get()))
    }

    pub fn remove(conn: &Connection, id: InfoCopyId) -> Result<()> {
        let affected = conn.execute("DELETE FROM info_copies WHERE id = ?1", [id.get()])?;
        if affected == 0 {
            return Err(Error::InfoCopyNotFound(id.get()));
        }
        Ok(())
    }
}

fn row_to_info_copy(row: &rusqlite::Row<'_>) -> rusqlite::Result<InfoCopy> {
    Ok(InfoCopy {
        id: InfoCopyId(row.get(0)?),
        name: row.get(1)?,
        payload: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CreateRequestOptions<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequestOptions<'a> {
    pub name: Option<&'a str>,
    pub text: Option<&'a str>,
}

pub struct RequestRepo;

impl RequestRepo {
    pub fn create(conn: &Connection, opts: CreateRequestOptions<'_>) -> Result<Request> {
        if Self::get_by_name(conn, opts.name)?.is_some() {
            return Err(Error::DuplicateName(opts.name.to_string()));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO requests (name, text, created_at) VALUES (?1, ?2, ?3)",
            params![opts.name, opts.text, now],
        )?;
        Ok(Request {
            id: RequestId(conn.last_insert_rowid()),
            name: opts.name.to_string(),
            text: opts.text.to_string(),
            created_at: now,
        })
    }

    pub fn get_by_id(conn: &Connection, id: RequestId) -> Result<Option<Request>> {
        conn.query_row(
            "SELECT id, name, text, created_at FROM requests WHERE id = ?1",
            [id.get()],
            row_to_request,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Request>> {
        conn.query_row(
            "SELECT id, name, text, created_at FROM requests WHERE name = ?1",
            [name],
            row_to_request,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn update(
        conn: &Connection,
        id: RequestId,
        opts: UpdateRequestOptions<'_>,
    ) -> Result<Request> {
        let existing = Self::get_by_id(conn, id)?.ok_or(Error::RequestNotFound(id.get()))?;
        if let Some(name) = opts.name {
            if name != existing.name && Self::get_by_name(conn, name)?.is_some() {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }
        let name = opts.name.unwrap_or(&existing.name);
        let text = opts.text.unwrap_or(&existing.text);
        conn.execute(
            "UPDATE requests SET name = ?1, text = ?2 WHERE id = ?3",
            params![name, text, id.get()],
        )?;
        Self::get_by_id(conn, id)?.ok_or(Error::RequestNotFound(id.get()))
    }

    pub fn remove(conn: &Connection, id: RequestId) -> Result<()> {
        let affected = conn.execute("DELETE FROM requests WHERE id = ?1", [id.get()])?;
        if affected == 0 {
            return Err(Error::RequestNotFound(id.get()));
        }
        Ok(())
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: RequestId(row.get(0)?),
        name: row.get(1)?,
        text: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, ConnectionConfig};

    #[test]
    fn create_and_get_profile_round_trips() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let profile = ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"jpeg-bytes",
                info: "bio text",
            },
        )
        .unwrap();
        let fetched = ProfileRepo::get_by_id(&conn, profile.id).unwrap().unwrap();
        assert_eq!(fetched.name, "alice");
        assert_eq!(fetched.photo, b"jpeg-bytes");
    }

    #[test]
    fn duplicate_name_rejected() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"x",
                info: "y",
            },
        )
        .unwrap();
        let err = ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"x",
                info: "y",
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
    }

    #[test]
    fn remove_missing_profile_errors() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let err = ProfileRepo::remove(&conn, ProfileId(999)).unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(999)));
    }

    #[test]
    fn update_info_copy_partial_fields() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let ic = InfoCopyRepo::create(
            &conn,
            CreateInfoCopyOptions {
                name: "clip-1",
                payload: b"audio",
            },
        )
        .unwrap();
        let updated = InfoCopyRepo::update(
            &conn,
            ic.id,
            UpdateInfoCopyOptions {
                name: None,
                payload: Some(b"new-audio"),
            },
        )
        .unwrap();
        assert_eq!(updated.name, "clip-1");
        assert_eq!(updated.payload, b"new-audio");
    }
}
