//! Per-entity payload cache.
//!
//! Workers need the same profile photo/info or info-copy payload over and
//! over as sessions under a shared group spawn; this memoizes the byte blob
//! each worker is handed so the store only has to produce it once per
//! entity per daemon lifetime. Invalidation is explicit — callers evict on
//! every `update_entity`/`remove_entity`.

use std::collections::HashMap;

use muster_core::{InfoCopyId, ProfileId, RequestId};
use parking_lot::Mutex;
use muster_store::repositories::entities::{InfoCopyRepo, ProfileRepo, RequestRepo};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
enum Key {
    Profile(ProfileId),
    InfoCopy(InfoCopyId),
    Request(RequestId),
}

/// Process-local payload cache, safe to share behind an `Arc`.
#[derive(Default)]
pub struct PayloadCache {
    entries: Mutex<HashMap<Key, Vec<u8>>>,
}

impl PayloadCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile_payload(
        &self,
        conn: &Connection,
        id: ProfileId,
    ) -> muster_core::Result<Vec<u8>> {
        self.get_or_load(Key::Profile(id), || {
            let profile = ProfileRepo::get_by_id(conn, id)?
                .ok_or(muster_core::Error::ProfileNotFound(id.get()))?;
            let mut bytes = profile.photo;
            bytes.extend_from_slice(profile.info.as_bytes());
            Ok(bytes)
        })
    }

    pub fn info_copy_payload(
        &self,
        conn: &Connection,
        id: InfoCopyId,
    ) -> muster_core::Result<Vec<u8>> {
        self.get_or_load(Key::InfoCopy(id), || {
            let ic = InfoCopyRepo::get_by_id(conn, id)?
                .ok_or(muster_core::Error::InfoCopyNotFound(id.get()))?;
            Ok(ic.payload)
        })
    }

    pub fn request_payload(
        &self,
        conn: &Connection,
        id: RequestId,
    ) -> muster_core::Result<Vec<u8>> {
        self.get_or_load(Key::Request(id), || {
            let request = RequestRepo::get_by_id(conn, id)?
                .ok_or(muster_core::Error::RequestNotFound(id.get()))?;
            Ok(request.text.into_bytes())
        })
    }

    pub fn invalidate_profile(&self, id: ProfileId) {
        self.entries.lock().remove(&Key::Profile(id));
    }

    pub fn invalidate_info_copy(&self, id: InfoCopyId) {
        self.entries.lock().remove(&Key::InfoCopy(id));
    }

    pub fn invalidate_request(&self, id: RequestId) {
        self.entries.lock().remove(&Key::Request(id));
    }

    fn get_or_load(
        &self,
        key: Key,
        load: impl FnOnce() -> muster_core::Result<Vec<u8>>,
    ) -> muster_core::Result<Vec<u8>> {
        if let Some(bytes) = self.entries.lock().get(&key) {
            return Ok(bytes.clone());
        }
        let bytes = load()?;
        self.entries.lock().insert(key, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_store::repositories::entities::{CreateProfileOptions, ProfileRepo};
    use muster_store::{new_in_memory, ConnectionConfig};

    #[test]
    fn caches_profile_payload_across_calls() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let profile = ProfileRepo::create(
            &conn,
            CreateProfileOptions {
                name: "alice",
                photo: b"jpeg",
                info: "bio",
            },
        )
        .unwrap();

        let cache = PayloadCache::new();
        let first = cache.profile_payload(&conn, profile.id).unwrap();
        assert_eq!(first, b"jpegbio");

        // mutate the row directly; cached value should still be served
        conn.execute("UPDATE profiles SET info = 'changed' WHERE id = ?1", [profile.id.get()])
            .unwrap();
        let second = cache.profile_payload(&conn, profile.id).unwrap();
        assert_eq!(second, first);

        cache.invalidate_profile(profile.id);
        let third = cache.profile_payload(&conn, profile.id).unwrap();
        assert_eq!(third, b"jpegchanged");
    }

    #[test]
    fn missing_profile_errors() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let cache = PayloadCache::new();
        let err = cache.profile_payload(&conn, ProfileId(999)).unwrap_err();
        assert!(matches!(err, muster_core::Error::ProfileNotFound(999)));
    }
}
