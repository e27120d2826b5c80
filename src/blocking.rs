//! Synchronous facade over [`crate::QueryHelper`].
//!
//! Owns a current-thread tokio runtime and drives every call to completion
//! with `block_on`. Must not be used from inside another tokio runtime.

use tokio::runtime::{Builder, Runtime};

use crate::config::QueryHelperOptions;
use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::helper::QueryHelper as AsyncQueryHelper;
use crate::logging::LogLevel;
use crate::query::{Parameters, Query};
use crate::scalar::ScalarTarget;

pub struct QueryHelper<D: Driver> {
    inner: AsyncQueryHelper<D>,
    runtime: Runtime,
}

impl<D: Driver> std::fmt::Debug for QueryHelper<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("blocking::QueryHelper")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn build_runtime() -> Result<Runtime, QueryHelperError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| QueryHelperError::ExecutionError(format!("failed to build runtime: {err}")))
}

impl<D: Driver> QueryHelper<D> {
    /// # Errors
    /// `ExecutionError` if the runtime cannot be created.
    pub fn new(driver: D) -> Result<Self, QueryHelperError> {
        Ok(Self {
            inner: AsyncQueryHelper::new(driver),
            runtime: build_runtime()?,
        })
    }

    /// # Errors
    /// `ConfigError` for invalid options, `ExecutionError` if the runtime
    /// cannot be created.
    pub fn with_options(driver: D, options: QueryHelperOptions) -> Result<Self, QueryHelperError> {
        Ok(Self {
            inner: AsyncQueryHelper::with_options(driver, options)?,
            runtime: build_runtime()?,
        })
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        self.inner.driver()
    }

    #[must_use]
    pub fn options(&self) -> &QueryHelperOptions {
        self.inner.options()
    }

    pub fn set_log_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        self.inner.set_log_callback(callback);
    }

    pub fn clear_log_callback(&mut self) {
        self.inner.clear_log_callback();
    }

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.inner.set_debug_logging(enabled);
    }

    #[must_use]
    pub fn is_transaction_open(&self) -> bool {
        self.inner.is_transaction_open()
    }

    /// # Errors
    /// See [`crate::QueryHelper::execute`].
    pub fn execute(
        &mut self,
        queries: &mut [Query],
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        self.runtime
            .block_on(self.inner.execute(queries, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::execute`].
    pub fn execute_one(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        self.runtime
            .block_on(self.inner.execute_one(query, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::execute`].
    pub fn execute_sequential(
        &mut self,
        queries: &mut [Query],
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        self.runtime
            .block_on(self.inner.execute_sequential(queries, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::non_query_with_transaction`].
    pub fn non_query_with_transaction(
        &mut self,
        queries: &mut [Query],
    ) -> Result<(), QueryHelperError> {
        self.runtime
            .block_on(self.inner.non_query_with_transaction(queries))
    }

    /// # Errors
    /// See [`crate::QueryHelper::read_rows`].
    pub fn read_rows(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<usize, QueryHelperError> {
        self.runtime
            .block_on(self.inner.read_rows(query, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::non_query`].
    pub fn non_query(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<usize, QueryHelperError> {
        self.runtime
            .block_on(self.inner.non_query(query, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::read_scalar`].
    pub fn read_scalar<T: ScalarTarget>(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<T, QueryHelperError> {
        self.runtime
            .block_on(self.inner.read_scalar::<T>(query, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::read_scalar_sql`].
    pub fn read_scalar_sql<T: ScalarTarget>(
        &mut self,
        sql: &str,
        parameters: Parameters,
        use_transaction: bool,
    ) -> Result<T, QueryHelperError> {
        self.runtime
            .block_on(self.inner.read_scalar_sql::<T>(sql, parameters, use_transaction))
    }

    /// # Errors
    /// See [`crate::QueryHelper::start_transaction`].
    pub fn start_transaction(&mut self) -> Result<(), QueryHelperError> {
        self.runtime.block_on(self.inner.start_transaction())
    }

    /// # Errors
    /// See [`crate::QueryHelper::commit_transaction`].
    pub fn commit_transaction(&mut self) -> Result<(), QueryHelperError> {
        self.runtime.block_on(self.inner.commit_transaction())
    }

    /// # Errors
    /// See [`crate::QueryHelper::rollback_transaction`].
    pub fn rollback_transaction(&mut self) -> Result<(), QueryHelperError> {
        self.runtime.block_on(self.inner.rollback_transaction())
    }
}

impl<D: Driver> Drop for QueryHelper<D> {
    fn drop(&mut self) {
        if self.inner.is_transaction_open()
            && let Err(err) = self.runtime.block_on(self.inner.rollback_transaction())
        {
            tracing::warn!(%err, "rollback of abandoned transaction span failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_utils::MockDriver;

    #[test]
    fn cleared_callback_stops_receiving_commands() -> Result<(), QueryHelperError> {
        let mut helper = QueryHelper::new(MockDriver::new())?;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        helper.set_log_callback(move |msg: &str, _level: LogLevel| {
            sink.lock().unwrap().push(msg.to_string());
        });
        helper.set_debug_logging(true);

        let mut query = Query::non_query("UPDATE t SET x = 1");
        helper.execute_one(&mut query, false)?;
        assert_eq!(seen.lock().unwrap().len(), 1);

        helper.clear_log_callback();
        helper.execute_one(&mut query, false)?;
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(helper.driver().executes(), 2);
        Ok(())
    }
}
