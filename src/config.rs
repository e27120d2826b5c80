use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::helper::QueryHelper;

/// What a call-owned transaction does when a post-execute hook stops the batch.
///
/// `Commit` keeps whatever the finished groups wrote, which is how the
/// helper has always behaved. `Rollback` discards it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AbortAction {
    #[default]
    Commit,
    Rollback,
}

/// Options for a [`QueryHelper`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryHelperOptions {
    /// Forward each command to the log callback before it runs.
    pub debug_logging: bool,
    /// Placeholder prefix used for `IN` list expansion.
    pub parameter_prefix: char,
    pub abort_action: AbortAction,
    /// Statement used to read back generated keys, bypassing family detection.
    pub identity_statement: Option<String>,
}

impl Default for QueryHelperOptions {
    fn default() -> Self {
        Self {
            debug_logging: false,
            parameter_prefix: '@',
            abort_action: AbortAction::Commit,
            identity_statement: None,
        }
    }
}

impl QueryHelperOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns `QueryHelperError::JsonError` on malformed input and
    /// `QueryHelperError::ConfigError` if the values do not validate.
    pub fn from_json(json: &str) -> Result<Self, QueryHelperError> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    #[must_use]
    pub fn with_debug_logging(mut self, debug_logging: bool) -> Self {
        self.debug_logging = debug_logging;
        self
    }

    #[must_use]
    pub fn with_abort_action(mut self, abort_action: AbortAction) -> Self {
        self.abort_action = abort_action;
        self
    }

    /// # Errors
    /// Returns `QueryHelperError::ConfigError` when the prefix is not ASCII
    /// punctuation or the identity statement is blank.
    pub fn validate(&self) -> Result<(), QueryHelperError> {
        if !self.parameter_prefix.is_ascii_punctuation() {
            return Err(QueryHelperError::ConfigError(format!(
                "parameter prefix must be ASCII punctuation, got {:?}",
                self.parameter_prefix
            )));
        }
        if self
            .identity_statement
            .as_deref()
            .is_some_and(|stmt| stmt.trim().is_empty())
        {
            return Err(QueryHelperError::ConfigError(
                "identity statement override is empty".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`QueryHelperOptions`].
#[derive(Debug, Clone, Default)]
pub struct QueryHelperOptionsBuilder {
    opts: QueryHelperOptions,
}

impl QueryHelperOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn debug_logging(mut self, debug_logging: bool) -> Self {
        self.opts.debug_logging = debug_logging;
        self
    }

    #[must_use]
    pub fn parameter_prefix(mut self, prefix: char) -> Self {
        self.opts.parameter_prefix = prefix;
        self
    }

    #[must_use]
    pub fn abort_action(mut self, abort_action: AbortAction) -> Self {
        self.opts.abort_action = abort_action;
        self
    }

    #[must_use]
    pub fn identity_statement(mut self, statement: impl Into<String>) -> Self {
        self.opts.identity_statement = Some(statement.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> QueryHelperOptions {
        self.opts
    }

    /// Build a [`QueryHelper`] around `driver`.
    ///
    /// # Errors
    /// Returns `QueryHelperError::ConfigError` if the options do not validate.
    pub fn build<D: Driver>(self, driver: D) -> Result<QueryHelper<D>, QueryHelperError> {
        QueryHelper::with_options(driver, self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_historic_behaviour() {
        let opts = QueryHelperOptions::default();
        assert_eq!(opts.parameter_prefix, '@');
        assert_eq!(opts.abort_action, AbortAction::Commit);
        assert!(!opts.debug_logging);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn parses_partial_json() -> Result<(), QueryHelperError> {
        let opts = QueryHelperOptions::from_json(
            r#"{"debug_logging": true, "abort_action": "rollback"}"#,
        )?;
        assert!(opts.debug_logging);
        assert_eq!(opts.abort_action, AbortAction::Rollback);
        assert_eq!(opts.parameter_prefix, '@');
        Ok(())
    }

    #[test]
    fn rejects_bad_prefix_and_blank_identity() {
        let bad_prefix = QueryHelperOptionsBuilder::new()
            .parameter_prefix('x')
            .finish();
        assert!(matches!(
            bad_prefix.validate(),
            Err(QueryHelperError::ConfigError(_))
        ));
        let blank = QueryHelperOptionsBuilder::new()
            .identity_statement("  ")
            .finish();
        assert!(blank.validate().is_err());
        assert!(QueryHelperOptions::from_json("{ not json").is_err());
    }

    #[test]
    fn abort_action_parses_from_cli_value() {
        assert_eq!(
            AbortAction::from_str("rollback", true),
            Ok(AbortAction::Rollback)
        );
    }
}
