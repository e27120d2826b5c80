use std::sync::Arc;

use async_trait::async_trait;

use super::config::SqliteOptions;
use super::connection::{SqliteCommand, SqliteConnection, SqliteTransaction, run_blocking};
use super::params::{bind_named, convert_params};
use super::query::{build_result_set, first_value};
use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::query::Parameters;
use crate::results::ResultSetCursor;
use crate::types::RowValues;

/// [`Driver`] over a file (or `:memory:`) `SQLite` database.
///
/// Every `open_connection` opens a fresh rusqlite connection; note that each
/// `:memory:` connection therefore sees its own empty database.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    options: SqliteOptions,
}

impl SqliteDriver {
    /// # Errors
    /// Returns `QueryHelperError::ConfigError` if the options do not validate.
    pub fn new(options: SqliteOptions) -> Result<Self, QueryHelperError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Driver for `db_path` with default options.
    ///
    /// # Errors
    /// Returns `QueryHelperError::ConfigError` for an empty path.
    pub fn open(db_path: impl Into<String>) -> Result<Self, QueryHelperError> {
        Self::new(SqliteOptions::new(db_path))
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteConnection;
    type Transaction = SqliteTransaction;
    type Command = SqliteCommand;
    type Cursor = ResultSetCursor;

    fn family(&self) -> &str {
        "SQLite"
    }

    async fn open_connection(&self) -> Result<SqliteConnection, QueryHelperError> {
        let opts = self.options.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<_, QueryHelperError> {
            let conn = rusqlite::Connection::open(&opts.db_path)?;
            conn.busy_timeout(opts.busy_timeout())?;
            if opts.wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| {
            QueryHelperError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
        })??;
        tracing::debug!(db_path = %self.options.db_path, "sqlite connection opened");
        Ok(SqliteConnection::new(conn))
    }

    async fn begin_transaction(
        &self,
        conn: &SqliteConnection,
    ) -> Result<SqliteTransaction, QueryHelperError> {
        let handle = Arc::clone(&conn.handle);
        run_blocking(Arc::clone(&handle), |c| {
            c.execute_batch("BEGIN")?;
            Ok(())
        })
        .await?;
        Ok(SqliteTransaction { handle })
    }

    fn create_command(
        &self,
        conn: &SqliteConnection,
        sql: &str,
        parameters: &Parameters,
        tx: Option<&SqliteTransaction>,
    ) -> Result<SqliteCommand, QueryHelperError> {
        if let Some(tx) = tx
            && !Arc::ptr_eq(&tx.handle, &conn.handle)
        {
            return Err(QueryHelperError::DriverError(
                "transaction belongs to a different connection".into(),
            ));
        }
        Ok(SqliteCommand {
            handle: Arc::clone(&conn.handle),
            sql: sql.to_string(),
            params: convert_params(parameters),
        })
    }

    async fn execute_non_query(&self, command: &SqliteCommand) -> Result<usize, QueryHelperError> {
        let sql = command.sql.clone();
        let params = command.params.clone();
        run_blocking(Arc::clone(&command.handle), move |c| {
            let mut stmt = c.prepare(&sql)?;
            bind_named(&mut stmt, &params)?;
            Ok(stmt.raw_execute()?)
        })
        .await
    }

    async fn execute_non_query_with_identity(
        &self,
        _conn: &SqliteConnection,
        command: &SqliteCommand,
        identity_sql: &str,
        _tx: Option<&SqliteTransaction>,
    ) -> Result<(usize, RowValues), QueryHelperError> {
        let sql = command.sql.clone();
        let params = command.params.clone();
        let identity_sql = identity_sql.to_string();
        // Both statements run under one lock so no sibling insert lands in between.
        run_blocking(Arc::clone(&command.handle), move |c| {
            let rows = {
                let mut stmt = c.prepare(&sql)?;
                bind_named(&mut stmt, &params)?;
                stmt.raw_execute()?
            };
            let mut lookup = c.prepare(&identity_sql)?;
            let identity = first_value(&mut lookup)?;
            Ok((rows, identity))
        })
        .await
    }

    async fn execute_row_set(
        &self,
        command: &SqliteCommand,
    ) -> Result<ResultSetCursor, QueryHelperError> {
        let sql = command.sql.clone();
        let params = command.params.clone();
        let result_set = run_blocking(Arc::clone(&command.handle), move |c| {
            let mut stmt = c.prepare(&sql)?;
            bind_named(&mut stmt, &params)?;
            build_result_set(&mut stmt)
        })
        .await?;
        Ok(ResultSetCursor::new(result_set))
    }

    async fn execute_scalar(&self, command: &SqliteCommand) -> Result<RowValues, QueryHelperError> {
        let sql = command.sql.clone();
        let params = command.params.clone();
        run_blocking(Arc::clone(&command.handle), move |c| {
            let mut stmt = c.prepare(&sql)?;
            bind_named(&mut stmt, &params)?;
            first_value(&mut stmt)
        })
        .await
    }

    async fn commit(&self, tx: SqliteTransaction) -> Result<(), QueryHelperError> {
        run_blocking(tx.handle, |c| {
            c.execute_batch("COMMIT")?;
            Ok(())
        })
        .await
    }

    async fn rollback(&self, tx: SqliteTransaction) -> Result<(), QueryHelperError> {
        run_blocking(tx.handle, |c| {
            c.execute_batch("ROLLBACK")?;
            Ok(())
        })
        .await
    }

    async fn close(&self, conn: SqliteConnection) -> Result<(), QueryHelperError> {
        // Commands or a transaction may still hold the handle; the last drop closes it.
        let Ok(mutex) = Arc::try_unwrap(conn.handle) else {
            return Ok(());
        };
        let raw = mutex.into_inner();
        tokio::task::spawn_blocking(move || {
            raw.close()
                .map_err(|(_, err)| QueryHelperError::SqliteError(err))
        })
        .await
        .map_err(|e| {
            QueryHelperError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
        })?
    }
}
