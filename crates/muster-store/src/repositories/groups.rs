//! Group CRUD and membership, for each of the three group kinds.
//!
//! The three kinds (profile groups, info-copy groups, request groups) are
//! structurally identical — a name-unique group table plus a membership
//! join table — so the shared logic lives in a handful of table-name
//! generic helpers, with thin typed wrappers on top giving each kind its
//! own id newtype in the public signature.

use muster_core::{Error, GroupId, InfoCopyId, ProfileId, RequestId, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::Group;

fn create_group(conn: &Connection, table: &str, name: &str) -> Result<Group> {
    if get_group_by_name(conn, table, name)?.is_some() {
        return Err(Error::DuplicateName(name.to_string()));
    }
    conn.execute(&format!("INSERT INTO {table} (name) VALUES (?1)"), [name])?;
    Ok(Group {
        id: GroupId(conn.last_insert_rowid()),
        name: name.to_string(),
    })
}

fn get_group_by_name(conn: &Connection, table: &str, name: &str) -> Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT id, name FROM {table} WHERE name = ?1"),
        [name],
        |row| {
            Ok(Group {
                id: GroupId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn get_group_by_id(conn: &Connection, table: &str, id: GroupId) -> Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT id, name FROM {table} WHERE id = ?1"),
        [id.get()],
        |row| {
            Ok(Group {
                id: GroupId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn remove_group(conn: &Connection, table: &str, name: &str) -> Result<()> {
    let affected = conn.execute(&format!("DELETE FROM {table} WHERE name = ?1"), [name])?;
    if affected == 0 {
        return Err(Error::GroupNotFound(name.to_string()));
    }
    Ok(())
}

fn add_member(
    conn: &Connection,
    membership_table: &str,
    member_col: &str,
    group_id: GroupId,
    member_id: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {membership_table} (group_id, {member_col}) VALUES (?1, ?2)"
        ),
        params![group_id.get(), member_id],
    )?;
    Ok(())
}

fn remove_member(
    conn: &Connection,
    membership_table: &str,
    member_col: &str,
    group_id: GroupId,
    member_id: i64,
) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {membership_table} WHERE group_id = ?1 AND {member_col} = ?2"),
        params![group_id.get(), member_id],
    )?;
    Ok(())
}

fn list_members(
    conn: &Connection,
    membership_table: &str,
    member_col: &str,
    group_id: GroupId,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {member_col} FROM {membership_table} WHERE group_id = ?1"
    ))?;
    let rows = stmt
        .query_map([group_id.get()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(rows)
}

macro_rules! group_repo {
    ($repo:ident, $group_table:literal, $membership_table:literal, $member_col:literal, $member_id:ty) => {
        pub struct $repo;

        impl $repo {
            pub fn create(conn: &Connection, name: &str) -> Result<Group> {
                create_group(conn, $group_table, name)
            }

            pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Group>> {
                get_group_by_name(conn, $group_table, name)
            }

            pub fn get_by_id(conn: &Connection, id: GroupId) -> Result<Option<Group>> {
                get_group_by_id(conn, $group_table, id)
            }

            pub fn remove(conn: &Connection, name: &str) -> Result<()> {
                remove_group(conn, $group_table, name)
            }

            pub fn add_member(conn: &Connection, group_id: GroupId, member_id: $member_id) -> Result<()> {
                add_member(conn, $membership_table, $member_col, group_id, member_id.get())
            }

            pub fn remove_member(conn: &Connection, group_id: GroupId, member_id: $member_id) -> Result<()> {
                remove_member(conn, $membership_table, $member_col, group_id, member_id.get())
            }

            pub fn list_members(conn: &Connection, group_id: GroupId) -> Result<Vec<$member_id>> {
                Ok(list_members(conn, $membership_table, $member_col, group_id)?
                    .into_iter()
                    .map(<$member_id>::from)
                    .collect())
            }
        }
    };
}

group_repo!(
    ProfileGroupRepo,
    "profile_groups",
    "profile_group_members",
    "profile_id",
    ProfileId
);
group_repo!(
    InfoCopyGroupRepo,
    "info_copy_groups",
    "info_copy_group_members",
    "info_copy_id",
    InfoCopyId
);
group_repo!(
    RequestGroupRepo,
    "request_groups",
    "request_group_members",
    "request_id",
    RequestId
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, ConnectionConfig};
    use crate::repositories::entities::{CreateProfileOptions, ProfileRepo};

    #[test]
    fn add_member_then_list() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let profile = ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"x",
                info: "y",
            },
        )
        .unwrap();
        let group = ProfileGroupRepo::create(&conn, "friends").unwrap();
        ProfileGroupRepo::add_member(&conn, group.id, profile.id).unwrap();
        let members = ProfileGroupRepo::list_members(&conn, group.id).unwrap();
        assert_eq!(members, vec![profile.id]);
    }

    #[test]
    fn add_member_twice_is_noop() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let profile = ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"x",
                info: "y",
            },
        )
        .unwrap();
        let group = ProfileGroupRepo::create(&conn, "friends").unwrap();
        ProfileGroupRepo::add_member(&conn, group.id, profile.id).unwrap();
        ProfileGroupRepo::add_member(&conn, group.id, profile.id).unwrap();
        assert_eq!(ProfileGroupRepo::list_members(&conn, group.id).unwrap().len(), 1);
    }

    #[test]
    fn remove_absent_member_is_noop() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let group = ProfileGroupRepo::create(&conn, "friends").unwrap();
        ProfileGroupRepo::remove_member(&conn, group.id, ProfileId(42)).unwrap();
    }

    #[test]
    fn remove_missing_group_errors() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let err = ProfileGroupRepo::remove(&conn, "nonexistent").unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(_)));
    }
}
