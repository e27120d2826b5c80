//! Command logging side channel.
//!
//! Every command is reported through `tracing` at debug level. Callers can
//! additionally install a callback that receives a formatted line and a
//! severity; it only fires while debug logging is enabled, and a panicking
//! callback never affects the query outcome.

use std::fmt::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::{Parameters, QueryKind};

/// Severity passed to the log callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Information,
    Warning,
    Error,
}

pub type LogCallback = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

#[derive(Clone, Default)]
pub struct QueryLogger {
    callback: Option<LogCallback>,
    debug_enabled: bool,
}

impl std::fmt::Debug for QueryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLogger")
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .field("debug_enabled", &self.debug_enabled)
            .finish()
    }
}

impl QueryLogger {
    #[must_use]
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            callback: None,
            debug_enabled,
        }
    }

    pub fn set_callback(&mut self, callback: LogCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn set_debug_enabled(&mut self, enabled: bool) {
        self.debug_enabled = enabled;
    }

    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    /// Report a command that is about to run.
    pub fn log_command(&self, kind: QueryKind, sql: &str, parameters: &Parameters) {
        tracing::debug!(?kind, sql, parameters = parameters.len(), "executing command");
        if !self.debug_enabled {
            return;
        }
        if let Some(callback) = &self.callback {
            let message = format_command(kind, sql, parameters);
            Self::invoke(callback, &message, LogLevel::Verbose);
        }
    }

    /// Report a non-command event (rollback failures and the like).
    pub fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Information => tracing::info!("{message}"),
            LogLevel::Verbose => tracing::debug!("{message}"),
        }
        let Some(callback) = &self.callback else {
            return;
        };
        if level == LogLevel::Verbose && !self.debug_enabled {
            return;
        }
        Self::invoke(callback, message, level);
    }

    fn invoke(callback: &LogCallback, message: &str, level: LogLevel) {
        if catch_unwind(AssertUnwindSafe(|| callback(message, level))).is_err() {
            tracing::warn!("log callback panicked; ignoring");
        }
    }
}

/// `Executing RowSet: <sql> | a=1, b='x'`
#[must_use]
pub fn format_command(kind: QueryKind, sql: &str, parameters: &Parameters) -> String {
    let mut message = format!("Executing {kind:?}: {sql}");
    if !parameters.is_empty() {
        message.push_str(" | ");
        for (i, (name, value)) in parameters.iter().enumerate() {
            if i > 0 {
                message.push_str(", ");
            }
            let _ = match value.as_text() {
                Some(text) => write!(message, "{name}='{text}'"),
                None => write!(message, "{name}={value}"),
            };
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::RowValues;

    fn capture() -> (LogCallback, Arc<Mutex<Vec<(String, LogLevel)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: LogCallback = Arc::new(move |msg: &str, level: LogLevel| {
            sink.lock().unwrap().push((msg.to_string(), level));
        });
        (callback, seen)
    }

    #[test]
    fn callback_gated_by_debug_flag() {
        let (callback, seen) = capture();
        let mut logger = QueryLogger::new(false);
        logger.set_callback(callback);
        logger.log_command(QueryKind::Scalar, "select 1", &Parameters::new());
        assert!(seen.lock().unwrap().is_empty());

        logger.set_debug_enabled(true);
        logger.log_command(QueryKind::Scalar, "select 1", &Parameters::new());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("select 1"));
        assert_eq!(seen[0].1, LogLevel::Verbose);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let mut logger = QueryLogger::new(true);
        logger.set_callback(Arc::new(|_: &str, _: LogLevel| panic!("boom")));
        logger.log_command(QueryKind::NonQuery, "delete from t", &Parameters::new());
        logger.log("still alive", LogLevel::Warning);
    }

    #[test]
    fn formats_parameters() {
        let params: Parameters = [
            ("a", RowValues::Int(1)),
            ("b", RowValues::Text("x".into())),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            format_command(QueryKind::RowSet, "select @a, @b", &params),
            "Executing RowSet: select @a, @b | a=1, b='x'"
        );
    }
}
