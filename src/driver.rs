//! The pluggable driver seam.
//!
//! The engine never talks to a database directly. Everything that touches I/O
//! goes through a [`Driver`]: opening and closing connections, transaction
//! boundaries, building commands and executing them in one of three shapes.
//!
//! Commands of one group are executed concurrently over a single shared
//! `&Connection`. A driver whose native connection cannot run overlapping
//! statements is expected to serialize internally (the bundled `SQLite`
//! adapter does this with a mutex); the engine only promises that every
//! command in a group is dispatched before any result is awaited.

use async_trait::async_trait;

use crate::error::QueryHelperError;
use crate::query::Parameters;
use crate::types::RowValues;

/// Forward-only access to the rows produced by a row-set command.
#[async_trait]
pub trait RowCursor: Send {
    /// Move to the next row. Returns `false` once the rows are exhausted.
    async fn advance(&mut self) -> Result<bool, QueryHelperError>;

    /// Value of the named column in the current row.
    fn get(&self, column: &str) -> Option<&RowValues>;

    /// Value at a column position in the current row.
    fn get_by_index(&self, index: usize) -> Option<&RowValues>;

    fn column_names(&self) -> &[String];

    /// Release the cursor. Called by the engine whether or not every row was read.
    async fn close(&mut self) -> Result<(), QueryHelperError>;
}

/// Adapter over a concrete database client.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;
    type Transaction: Send + Sync + 'static;
    type Command: Send + Sync;
    type Cursor: RowCursor + 'static;

    /// Documented family string (e.g. `"SQLite"`, `"SqlServer"`).
    ///
    /// Only used to select the statement that reads back a generated identity.
    fn family(&self) -> &str;

    async fn open_connection(&self) -> Result<Self::Connection, QueryHelperError>;

    async fn begin_transaction(
        &self,
        conn: &Self::Connection,
    ) -> Result<Self::Transaction, QueryHelperError>;

    /// Bind `sql` and its named `parameters` into a command on `conn`.
    ///
    /// Parameter names are given without their placeholder prefix.
    fn create_command(
        &self,
        conn: &Self::Connection,
        sql: &str,
        parameters: &Parameters,
        tx: Option<&Self::Transaction>,
    ) -> Result<Self::Command, QueryHelperError>;

    /// Execute an INSERT/UPDATE/DELETE style command, returning rows affected.
    async fn execute_non_query(&self, command: &Self::Command) -> Result<usize, QueryHelperError>;

    /// Execute `command`, then read back the key it generated with `identity_sql`.
    ///
    /// The lookup must observe this command's insert and not one issued by a
    /// sibling in the same group. The default issues the two statements back to
    /// back; drivers whose commands can interleave on one connection override
    /// it to run both without letting anything in between.
    async fn execute_non_query_with_identity(
        &self,
        conn: &Self::Connection,
        command: &Self::Command,
        identity_sql: &str,
        tx: Option<&Self::Transaction>,
    ) -> Result<(usize, RowValues), QueryHelperError> {
        let rows = self.execute_non_query(command).await?;
        let lookup = self.create_command(conn, identity_sql, &Parameters::new(), tx)?;
        let identity = self.execute_scalar(&lookup).await?;
        Ok((rows, identity))
    }

    async fn execute_row_set(&self, command: &Self::Command)
    -> Result<Self::Cursor, QueryHelperError>;

    /// First column of the first row, or [`RowValues::Null`] when there is none.
    async fn execute_scalar(&self, command: &Self::Command) -> Result<RowValues, QueryHelperError>;

    async fn commit(&self, tx: Self::Transaction) -> Result<(), QueryHelperError>;

    async fn rollback(&self, tx: Self::Transaction) -> Result<(), QueryHelperError>;

    async fn close(&self, conn: Self::Connection) -> Result<(), QueryHelperError>;
}
