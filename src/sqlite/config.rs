use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::driver::SqliteDriver;
use crate::error::QueryHelperError;

/// Options for the bundled `SQLite` driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Switch file databases to WAL journaling on open.
    #[serde(default = "default_wal")]
    pub wal: bool,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_wal() -> bool {
    true
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: default_wal(),
        }
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// # Errors
    /// Returns `QueryHelperError::ConfigError` for an empty path.
    pub fn validate(&self) -> Result<(), QueryHelperError> {
        if self.db_path.trim().is_empty() {
            return Err(QueryHelperError::ConfigError(
                "sqlite db_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`SqliteOptions`].
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.opts.busy_timeout_ms = millis;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// # Errors
    /// Returns `QueryHelperError::ConfigError` if the options do not validate.
    pub fn build(self) -> Result<SqliteDriver, QueryHelperError> {
        SqliteDriver::new(self.finish())
    }
}
