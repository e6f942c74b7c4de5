//! Connection pool construction and pragma tuning.

use muster_core::Result;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Tunables for the pool; `pool_size`/`busy_timeout_ms`/`cache_size_kib` are
/// the knobs most worth adjusting under load.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
    pub cache_size_kib: i32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = {};
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -{};
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))
    }
}

/// Opens a pool backed by an on-disk database at `path`, running migrations
/// against the first connection before handing the pool back.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::file(path);
    build(manager, config)
}

/// Opens a pool backed by a private in-memory database. Useful for tests;
/// each pooled connection shares the same in-memory database via a shared
/// cache so the pool behaves like a real multi-connection deployment.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory();
    build(manager, config)
}

fn build(manager: SqliteConnectionManager, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;

    {
        let mut conn = pool.get()?;
        crate::migrations::run_migrations(&mut conn)?;
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_runs_migrations() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let version = crate::migrations::current_version(&conn).unwrap();
        assert_eq!(version, crate::migrations::latest_version());
    }

    #[test]
    fn file_pool_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("muster.db");
        let path_str = path.to_str().unwrap();

        {
            let pool = new_file(path_str, &ConnectionConfig::default()).unwrap();
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO profiles (name, photo, info, created_at) VALUES ('a', x'00', 'x', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }

        let pool = new_file(path_str, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
