use std::fmt;

use serde_json::Value as JsonValue;

use crate::driver::RowCursor;
use crate::error::QueryHelperError;
use crate::scalar::{ScalarKind, ScalarTarget, coerce_scalar};
use crate::types::RowValues;

/// Ordered name→value map with unique names.
///
/// Inserting an existing name replaces the value in place and keeps its
/// original position, so binding order is stable across re-runs.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValues<V> {
    entries: Vec<(String, V)>,
}

/// Scalar parameters bound to a command.
pub type Parameters = NamedValues<RowValues>;

/// List parameters expanded into `IN (...)` placeholders before binding.
pub type InParameters = NamedValues<Vec<RowValues>>;

impl<V> Default for NamedValues<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> NamedValues<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<V>) -> Option<V> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl<N: Into<String>, V> FromIterator<(N, V)> for NamedValues<V> {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// The shape of result a descriptor expects from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Rows streamed through the row handler.
    RowSet,
    /// A single value.
    Scalar,
    /// Rows affected by INSERT/UPDATE/DELETE.
    NonQuery,
}

pub type PreExecuteHook = Box<dyn FnMut(&mut Query) + Send>;
pub type RowHook = Box<dyn FnMut(&dyn RowCursor) -> bool + Send>;
pub type PostExecuteHook = Box<dyn FnMut(&Query) -> bool + Send>;
pub type IdentityHook = Box<dyn FnMut(i64, &mut Query) + Send>;

fn noop_pre_execute() -> PreExecuteHook {
    Box::new(|_| {})
}

fn noop_row() -> RowHook {
    Box::new(|_| true)
}

fn noop_post_execute() -> PostExecuteHook {
    Box::new(|_| true)
}

/// One unit of SQL work: text, parameters, scheduling metadata and hooks.
///
/// Descriptors sharing a `group` run concurrently; groups run in ascending
/// order. `order` only decides dispatch and post-processing order inside a
/// group.
///
/// ```rust
/// use sql_query_helper::prelude::*;
///
/// let query = Query::row_set("SELECT PK, Name FROM Customer WHERE PK IN (@pks)")
///     .with_in_parameter("pks", vec![RowValues::Int(1), RowValues::Int(2)])
///     .with_row_handler(|row| {
///         let _name = row.get("Name");
///         true
///     });
/// assert_eq!(query.kind(), QueryKind::RowSet);
/// ```
pub struct Query {
    original_sql: String,
    pub(crate) modified_sql: String,
    pub parameters: Parameters,
    pub in_parameters: InParameters,
    /// Parameters added by the last list expansion.
    pub(crate) expanded_names: Vec<String>,
    kind: QueryKind,
    pub group: i32,
    pub order: i32,
    /// Opaque caller payload, never read by the engine.
    pub tag: Option<JsonValue>,
    pub(crate) row_count: usize,
    pub(crate) executed: bool,
    pub(crate) caused_abort: bool,
    pub(crate) scalar_value: Option<RowValues>,
    scalar_kind: Option<ScalarKind>,
    pub(crate) identity: Option<i64>,
    pre_execute: PreExecuteHook,
    on_row: RowHook,
    post_execute: PostExecuteHook,
    on_identity: Option<IdentityHook>,
}

impl Query {
    fn new(sql: impl Into<String>, kind: QueryKind) -> Self {
        let sql = sql.into();
        Self {
            modified_sql: sql.clone(),
            original_sql: sql,
            parameters: Parameters::new(),
            in_parameters: InParameters::new(),
            expanded_names: Vec::new(),
            kind,
            group: 0,
            order: 0,
            tag: None,
            row_count: 0,
            executed: false,
            caused_abort: false,
            scalar_value: None,
            scalar_kind: None,
            identity: None,
            pre_execute: noop_pre_execute(),
            on_row: noop_row(),
            post_execute: noop_post_execute(),
            on_identity: None,
        }
    }

    /// A query whose rows are streamed through [`Query::with_row_handler`].
    #[must_use]
    pub fn row_set(sql: impl Into<String>) -> Self {
        Self::new(sql, QueryKind::RowSet)
    }

    /// A query returning one untyped value.
    #[must_use]
    pub fn scalar(sql: impl Into<String>) -> Self {
        Self::new(sql, QueryKind::Scalar)
    }

    /// A scalar query whose result is coerced into `T` as part of execution.
    #[must_use]
    pub fn scalar_of<T: ScalarTarget>(sql: impl Into<String>) -> Self {
        let mut query = Self::new(sql, QueryKind::Scalar);
        query.scalar_kind = Some(T::KIND);
        query
    }

    /// An INSERT/UPDATE/DELETE style statement.
    #[must_use]
    pub fn non_query(sql: impl Into<String>) -> Self {
        Self::new(sql, QueryKind::NonQuery)
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.parameters.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_in_parameter(mut self, name: impl Into<String>, values: Vec<RowValues>) -> Self {
        self.in_parameters.insert(name, values);
        self
    }

    #[must_use]
    pub fn in_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: JsonValue) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Hook run right before parameters are expanded and bound.
    #[must_use]
    pub fn with_pre_execute<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut Query) + Send + 'static,
    {
        self.pre_execute = Box::new(hook);
        self
    }

    /// Hook run once per fetched row; returning `false` stops reading.
    #[must_use]
    pub fn with_row_handler<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&dyn RowCursor) -> bool + Send + 'static,
    {
        self.on_row = Box::new(hook);
        self
    }

    /// Hook run once the result is known; returning `false` stops later groups.
    #[must_use]
    pub fn with_post_execute<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Query) -> bool + Send + 'static,
    {
        self.post_execute = Box::new(hook);
        self
    }

    /// Capture the generated key after this statement runs.
    #[must_use]
    pub fn with_identity<F>(mut self, hook: F) -> Self
    where
        F: FnMut(i64, &mut Query) + Send + 'static,
    {
        self.on_identity = Some(Box::new(hook));
        self
    }

    /// The SQL exactly as supplied.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.original_sql
    }

    /// The SQL after `IN` list expansion.
    #[must_use]
    pub fn modified_sql(&self) -> &str {
        &self.modified_sql
    }

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Rows consumed, rows affected, or 1 for a fetched scalar.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn executed(&self) -> bool {
        self.executed
    }

    #[must_use]
    pub fn caused_abort(&self) -> bool {
        self.caused_abort
    }

    /// Raw scalar result (normalized when declared with [`Query::scalar_of`]).
    #[must_use]
    pub fn scalar_value(&self) -> Option<&RowValues> {
        self.scalar_value.as_ref()
    }

    #[must_use]
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        self.scalar_kind
    }

    /// Generated key captured after execution, if an identity hook was set.
    #[must_use]
    pub fn identity(&self) -> Option<i64> {
        self.identity
    }

    #[must_use]
    pub fn wants_identity(&self) -> bool {
        self.kind == QueryKind::NonQuery && self.on_identity.is_some()
    }

    /// Typed scalar result.
    ///
    /// # Errors
    /// Returns [`QueryHelperError::CoercionError`] when the stored value cannot
    /// be represented as `T`.
    pub fn return_value<T: ScalarTarget>(&self) -> Result<T, QueryHelperError> {
        coerce_scalar(self.scalar_value.clone().unwrap_or(RowValues::Null))
    }

    pub(crate) fn reset_for_execution(&mut self) {
        self.modified_sql.clone_from(&self.original_sql);
        for name in std::mem::take(&mut self.expanded_names) {
            self.parameters.remove(&name);
        }
        self.row_count = 0;
        self.caused_abort = false;
        self.scalar_value = None;
        self.identity = None;
    }

    pub(crate) fn run_pre_execute(&mut self) {
        let mut hook = std::mem::replace(&mut self.pre_execute, noop_pre_execute());
        hook(self);
        self.pre_execute = hook;
    }

    pub(crate) fn run_on_row(&mut self, cursor: &dyn RowCursor) -> bool {
        (self.on_row)(cursor)
    }

    pub(crate) fn run_post_execute(&mut self) -> bool {
        let mut hook = std::mem::replace(&mut self.post_execute, noop_post_execute());
        let keep_going = hook(self);
        self.post_execute = hook;
        keep_going
    }

    pub(crate) fn run_identity(&mut self, identity: i64) {
        if let Some(mut hook) = self.on_identity.take() {
            hook(identity, self);
            self.on_identity = Some(hook);
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.original_sql)
            .field("modified_sql", &self.modified_sql)
            .field("kind", &self.kind)
            .field("group", &self.group)
            .field("order", &self.order)
            .field("parameters", &self.parameters)
            .field("in_parameters", &self.in_parameters)
            .field("row_count", &self.row_count)
            .field("executed", &self.executed)
            .field("caused_abort", &self.caused_abort)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut params = Parameters::new();
        params.insert("a", 1_i64);
        params.insert("b", "two");
        let previous = params.insert("a", 3_i64);
        assert_eq!(previous, Some(RowValues::Int(1)));
        let names: Vec<&str> = params.names().collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(params.get("a"), Some(&RowValues::Int(3)));
    }

    #[test]
    fn hooks_default_to_noop() {
        let mut query = Query::non_query("DELETE FROM t");
        query.run_pre_execute();
        assert!(query.run_post_execute());
        assert!(!query.wants_identity());
        assert_eq!(query.kind(), QueryKind::NonQuery);
    }

    #[test]
    fn pre_execute_can_add_parameters() {
        let mut query = Query::non_query("INSERT INTO t (a) VALUES (@a)")
            .with_pre_execute(|q| {
                q.parameters.insert("a", 7_i64);
            });
        query.run_pre_execute();
        query.run_pre_execute();
        assert_eq!(query.parameters.len(), 1);
        assert_eq!(query.parameters.get("a"), Some(&RowValues::Int(7)));
    }

    #[test]
    fn identity_hook_only_counts_for_non_query() {
        let non_query = Query::non_query("INSERT INTO t DEFAULT VALUES").with_identity(|_, _| {});
        assert!(non_query.wants_identity());
        let scalar = Query::scalar("SELECT 1").with_identity(|_, _| {});
        assert!(!scalar.wants_identity());
    }

    #[test]
    fn return_value_of_unexecuted_scalar_is_default() -> Result<(), QueryHelperError> {
        let query = Query::scalar_of::<String>("SELECT name FROM t");
        assert_eq!(query.scalar_kind(), Some(ScalarKind::Text));
        assert_eq!(query.return_value::<String>()?, "");
        Ok(())
    }
}
