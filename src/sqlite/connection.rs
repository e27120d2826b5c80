use std::fmt;
use std::sync::Arc;

use rusqlite::types::Value;
use tokio::sync::Mutex;

use crate::error::QueryHelperError;

/// One rusqlite connection shared by every command of a call.
///
/// Blocking work takes the mutex inside `spawn_blocking`, so concurrently
/// dispatched commands on the same connection run one after another.
pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

pub struct SqliteConnection {
    pub(crate) handle: SharedSqliteConnection,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self {
            handle: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `func` against the raw connection on the blocking pool.
    ///
    /// Handy for schema setup in tests and tools.
    ///
    /// # Errors
    /// Whatever `func` returns, or `ExecutionError` if the blocking task fails.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, QueryHelperError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, QueryHelperError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.handle), func).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("handles", &Arc::strong_count(&self.handle))
            .finish()
    }
}

/// An open `BEGIN` on a [`SqliteConnection`].
#[derive(Debug)]
pub struct SqliteTransaction {
    pub(crate) handle: SharedSqliteConnection,
}

/// SQL plus converted named parameters, bound when executed.
#[derive(Debug)]
pub struct SqliteCommand {
    pub(crate) handle: SharedSqliteConnection,
    pub(crate) sql: String,
    pub(crate) params: Vec<(String, Value)>,
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, QueryHelperError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, QueryHelperError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| QueryHelperError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
