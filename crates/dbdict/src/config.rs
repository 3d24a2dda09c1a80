//! SQLite connection settings loaded from environment variables.
//!
//! Every setting has a default, so `from_env` never fails.
//!
//! | Variable                         | Default    | Description                                 |
//! |----------------------------------|------------|---------------------------------------------|
//! | `DBDICT_SQLITE_PATH`             | `:memory:` | Database file (`:memory:` = in-memory)      |
//! | `DBDICT_SQLITE_WAL`              | `false`    | Switch the journal to `journal_mode=WAL`    |
//! | `DBDICT_SQLITE_FOREIGN_KEYS`     | `true`     | Enforce `PRAGMA foreign_keys`               |
//! | `DBDICT_SQLITE_BUSY_TIMEOUT_MS`  | `5000`     | How long to wait on a locked database       |

use std::time::Duration;

pub const MEMORY_PATH: &str = ":memory:";

/// Settings applied when opening a [`SqliteConnection`](crate::SqliteConnection).
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`.
    pub path: String,

    /// Use write-ahead logging. Ignored for in-memory databases.
    pub wal: bool,

    pub foreign_keys: bool,

    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            wal: false,
            foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Config for a database file with default pragmas.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, applying defaults where
    /// a variable is absent or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path:            env_str("DBDICT_SQLITE_PATH", &defaults.path),
            wal:             env_bool("DBDICT_SQLITE_WAL", defaults.wal),
            foreign_keys:    env_bool("DBDICT_SQLITE_FOREIGN_KEYS", defaults.foreign_keys),
            busy_timeout_ms: env_parse("DBDICT_SQLITE_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = SqliteConfig::default();
        assert!(cfg.is_memory());
        assert!(cfg.foreign_keys);
        assert!(!cfg.wal);
        assert_eq!(cfg.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn env_override_applied() {
        std::env::set_var("DBDICT_SQLITE_BUSY_TIMEOUT_MS", "250");
        std::env::set_var("DBDICT_SQLITE_WAL", "true");
        let cfg = SqliteConfig::from_env();
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert!(cfg.wal);

        // Unparseable values fall back to the default.
        std::env::set_var("DBDICT_SQLITE_BUSY_TIMEOUT_MS", "soon");
        assert_eq!(SqliteConfig::from_env().busy_timeout_ms, 5000);

        std::env::remove_var("DBDICT_SQLITE_BUSY_TIMEOUT_MS");
        std::env::remove_var("DBDICT_SQLITE_WAL");
    }
}
