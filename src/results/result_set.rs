use std::collections::HashMap;
use std::sync::Arc;

use super::row::{CustomDbRow, column_index};
use crate::types::RowValues;

/// A fully materialized result set.
///
/// Drivers that buffer rows (the bundled `SQLite` adapter, the mock driver)
/// build one of these and hand it to the engine wrapped in a
/// [`ResultSetCursor`](super::ResultSetCursor).
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// Column names shared by all rows (to avoid duplicating in each row)
    column_names: Arc<Vec<String>>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set for the given columns.
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self::with_capacity(column_names, 0)
    }

    /// Create a new result set with a known row capacity
    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> Self {
        let cache = Arc::new(column_index(&column_names));
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names: Arc::new(column_names),
            column_index_cache: cache,
        }
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Append a row; the values must line up with the column names.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        self.results.push(CustomDbRow {
            column_names: Arc::clone(&self.column_names),
            rows: row_values,
            column_index_cache: Arc::clone(&self.column_index_cache),
        });
    }

    /// Builder-style variant of [`ResultSet::add_row_values`].
    #[must_use]
    pub fn with_row(mut self, row_values: Vec<RowValues>) -> Self {
        self.add_row_values(row_values);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
