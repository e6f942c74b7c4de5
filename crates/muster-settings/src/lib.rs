//! Layered configuration for the daemon: compiled defaults, overridden by an
//! optional `muster.toml` file, overridden by environment variables.
//!
//! Unlike the request-scoped settings singleton this pattern is usually
//! paired with, nothing here hot-reloads at runtime — the daemon loads
//! config once at startup and hands an `Arc<MusterConfig>` down through
//! construction, so no global `RwLock` is needed.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct MusterConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub read_cap_bytes: usize,
    pub pool_size: u32,
    pub stop_timeout: Duration,
}

impl Default for MusterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            db_path: "./muster.db".to_string(),
            read_cap_bytes: 16 * 1024,
            pool_size: 8,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Deserialized shape of `muster.toml`; every field optional so the file can
/// override just what it wants.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
    read_cap_bytes: Option<usize>,
    pool_size: Option<u32>,
    stop_timeout_ms: Option<u64>,
}

impl MusterConfig {
    /// Loads configuration, deep-merging file then environment over
    /// compiled defaults. Missing or unreadable `config_path` is not an
    /// error — there's simply no file layer. Malformed file contents are
    /// logged and otherwise ignored so a typo doesn't take the daemon down
    /// before it can report it.
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(path) = config_path {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<FileConfig>(&contents) {
                    Ok(file) => config.merge_file(file),
                    Err(err) => {
                        tracing::warn!(?path, %err, "failed to parse config file, using defaults");
                    }
                },
                Err(err) => {
                    tracing::debug!(?path, %err, "no config file found, using defaults");
                }
            }
        }

        config.merge_env();
        config
    }

    fn merge_file(&mut self, file: FileConfig) {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(db_path) = file.db_path {
            self.db_path = db_path;
        }
        if let Some(cap) = file.read_cap_bytes {
            self.read_cap_bytes = cap;
        }
        if let Some(pool_size) = file.pool_size {
            self.pool_size = pool_size;
        }
        if let Some(ms) = file.stop_timeout_ms {
            self.stop_timeout = Duration::from_millis(ms);
        }
    }

    fn merge_env(&mut self) {
        if let Ok(host) = std::env::var("MUSTER_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parsed::<u16>("MUSTER_PORT") {
            self.port = port;
        }
        if let Ok(db_path) = std::env::var("MUSTER_DB_PATH") {
            self.db_path = db_path;
        }
        if let Some(cap) = env_parsed::<usize>("MUSTER_READ_CAP_BYTES") {
            self.read_cap_bytes = cap;
        }
        if let Some(pool_size) = env_parsed::<u32>("MUSTER_POOL_SIZE") {
            self.pool_size = pool_size;
        }
        if let Some(ms) = env_parsed::<u64>("MUSTER_STOP_TIMEOUT_MS") {
            self.stop_timeout = Duration::from_millis(ms);
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_path_given() {
        let config = MusterConfig::load(None);
        assert_eq!(config.port, 9999);
        assert_eq!(config.db_path, "./muster.db");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "port = 4242\nhost = \"127.0.0.1\"\n").unwrap();
        let config = MusterConfig::load(Some(file.path()));
        assert_eq!(config.port, 4242);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.db_path, "./muster.db");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = MusterConfig::load(Some(Path::new("/nonexistent/muster.toml")));
        assert_eq!(config.port, 9999);
    }
}
