//! SQLite-backed storage: connection pool, schema migrations, and the
//! repository layer for entities, groups, and sessions.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod repositories;

pub use pool::{new_file, new_in_memory, ConnectionConfig, ConnectionPool, PooledConnection};
