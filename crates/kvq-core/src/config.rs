//! TOML configuration.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. Path resolution: explicit path, then `$KVQ_CONFIG`,
//! then `kvq.toml` in the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::queue::{DEFAULT_WAKE_CAPACITY, DrainPolicy};

pub const CONFIG_ENV: &str = "KVQ_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "kvq.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub migrations: MigrationsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:` for a throwaway store.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("kvq.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub poll_delay_ms: u64,
    pub drain: DrainPolicy,
    pub wake_capacity: usize,
}

impl QueueConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 1000,
            drain: DrainPolicy::default(),
            wake_capacity: DEFAULT_WAKE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Key holding the applied-migrations record.
    pub key: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            key: "kvq:applied_migrations".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `explicit`, else `$KVQ_CONFIG`, else `kvq.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.queue.poll_delay(), Duration::from_secs(1));
        assert_eq!(config.queue.wake_capacity, 25);
        assert_eq!(config.queue.drain, DrainPolicy::OneTask);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            path = ":memory:"

            [queue]
            poll_delay_ms = 250
            drain = "one_per_name"

            [log]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.store.path, PathBuf::from(":memory:"));
        assert_eq!(config.queue.poll_delay(), Duration::from_millis(250));
        assert_eq!(config.queue.drain, DrainPolicy::OnePerName);
        assert_eq!(config.queue.wake_capacity, 25);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.migrations.key, "kvq:applied_migrations");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());

        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\npoll_delay_ms = \"soon\"").unwrap();

        let err = Config::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_path_wins() {
        let explicit = Path::new("/etc/kvq/custom.toml");
        assert_eq!(Config::resolve_path(Some(explicit)), explicit);
    }
}
