use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryHelperError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    /// Misuse of the transaction span state machine or of the call surface.
    #[error("Usage error: {0}")]
    UsageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Any failure reported by a driver during open/execute/commit/rollback/close.
    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Cannot coerce scalar {value} into {target}")]
    CoercionError { value: String, target: &'static str },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl QueryHelperError {
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::UsageError(_))
    }

    #[must_use]
    pub fn is_driver_error(&self) -> bool {
        match self {
            Self::DriverError(_) => true,
            #[cfg(feature = "sqlite")]
            Self::SqliteError(_) => true,
            _ => false,
        }
    }
}
