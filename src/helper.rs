//! The public entry point: [`QueryHelper`].
//!
//! A helper owns a driver, its options and the state of at most one
//! caller-controlled transaction span. Without a span every call opens its
//! own connection, optionally wraps the work in a transaction, and tears both
//! down before returning. With a span open, calls reuse the span's connection
//! and transaction and never commit it themselves.

use std::sync::Arc;

use crate::config::{AbortAction, QueryHelperOptions};
use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::executor::{CallContext, RunOutcome, run_groups};
use crate::identity::identity_statement;
use crate::logging::{LogLevel, QueryLogger};
use crate::query::{Parameters, Query, QueryKind};
use crate::scalar::ScalarTarget;

/// Connection and transaction kept open between calls.
struct Span<D: Driver> {
    conn: D::Connection,
    tx: D::Transaction,
}

pub struct QueryHelper<D: Driver> {
    driver: Arc<D>,
    options: QueryHelperOptions,
    logger: QueryLogger,
    span: Option<Span<D>>,
}

impl<D: Driver> std::fmt::Debug for QueryHelper<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHelper")
            .field("family", &self.driver.family())
            .field("options", &self.options)
            .field("transaction_open", &self.span.is_some())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> QueryHelper<D> {
    /// Helper with default options.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::from_parts(driver, QueryHelperOptions::default())
    }

    /// # Errors
    /// Returns `QueryHelperError::ConfigError` if `options` do not validate.
    pub fn with_options(driver: D, options: QueryHelperOptions) -> Result<Self, QueryHelperError> {
        options.validate()?;
        Ok(Self::from_parts(driver, options))
    }

    fn from_parts(driver: D, options: QueryHelperOptions) -> Self {
        Self {
            driver: Arc::new(driver),
            logger: QueryLogger::new(options.debug_logging),
            options,
            span: None,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub fn options(&self) -> &QueryHelperOptions {
        &self.options
    }

    /// Install the callback that receives one line per command.
    pub fn set_log_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        self.logger.set_callback(Arc::new(callback));
    }

    pub fn clear_log_callback(&mut self) {
        self.logger.clear_callback();
    }

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.options.debug_logging = enabled;
        self.logger.set_debug_enabled(enabled);
    }

    #[must_use]
    pub fn is_transaction_open(&self) -> bool {
        self.span.is_some()
    }

    /// Run `queries` group by group.
    ///
    /// Descriptors sharing a group are dispatched together over one
    /// connection; groups run in ascending order. A post-execute hook
    /// returning `false` stops later groups without raising an error.
    ///
    /// # Errors
    /// - `UsageError` if a span is open and `use_transaction` is `false`.
    /// - `ConfigError` if a descriptor wants an identity and the driver family
    ///   is unknown.
    /// - Any driver or coercion error; a transaction begun by this call is
    ///   rolled back first.
    pub async fn execute(
        &mut self,
        queries: &mut [Query],
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        if self.span.is_some() && !use_transaction {
            return Err(QueryHelperError::UsageError(
                "a transaction span is open; calls must run inside it".into(),
            ));
        }
        let identity = self.resolve_identity(queries)?;

        if let Some(span) = &self.span {
            let ctx = CallContext {
                driver: &*self.driver,
                conn: &span.conn,
                tx: Some(&span.tx),
                logger: &self.logger,
                identity_statement: identity.as_deref(),
                prefix: self.options.parameter_prefix,
            };
            run_groups(&ctx, queries).await?;
            return Ok(());
        }

        let driver = &*self.driver;
        let conn = driver.open_connection().await?;
        let tx = if use_transaction {
            match driver.begin_transaction(&conn).await {
                Ok(tx) => Some(tx),
                Err(err) => {
                    close_quietly(driver, conn).await;
                    return Err(err);
                }
            }
        } else {
            None
        };

        let run = {
            let ctx = CallContext {
                driver,
                conn: &conn,
                tx: tx.as_ref(),
                logger: &self.logger,
                identity_statement: identity.as_deref(),
                prefix: self.options.parameter_prefix,
            };
            run_groups(&ctx, queries).await
        };

        match run {
            Ok(outcome) => {
                if let Some(tx) = tx {
                    let finished = if outcome == RunOutcome::Aborted
                        && self.options.abort_action == AbortAction::Rollback
                    {
                        driver.rollback(tx).await
                    } else {
                        driver.commit(tx).await
                    };
                    if let Err(err) = finished {
                        close_quietly(driver, conn).await;
                        return Err(err);
                    }
                }
                driver.close(conn).await
            }
            Err(err) => {
                if let Some(tx) = tx
                    && let Err(rollback_err) = driver.rollback(tx).await
                {
                    self.logger.log(
                        &format!("rollback after failed batch also failed: {rollback_err}"),
                        LogLevel::Warning,
                    );
                }
                close_quietly(driver, conn).await;
                Err(err)
            }
        }
    }

    /// [`execute`](Self::execute) for a single descriptor.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute).
    pub async fn execute_one(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        self.execute(std::slice::from_mut(query), use_transaction)
            .await
    }

    /// Run descriptors strictly one after another, in input order.
    ///
    /// Overwrites each descriptor's `group` with its input position.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute).
    pub async fn execute_sequential(
        &mut self,
        queries: &mut [Query],
        use_transaction: bool,
    ) -> Result<(), QueryHelperError> {
        for (position, query) in queries.iter_mut().enumerate() {
            query.group = group_number(position)?;
        }
        self.execute(queries, use_transaction).await
    }

    /// Run a write batch in one transaction, one statement at a time by `order`.
    ///
    /// # Errors
    /// `UsageError` if any descriptor is not a non-query; otherwise as
    /// [`execute`](Self::execute).
    pub async fn non_query_with_transaction(
        &mut self,
        queries: &mut [Query],
    ) -> Result<(), QueryHelperError> {
        if let Some(query) = queries.iter().find(|q| q.kind() != QueryKind::NonQuery) {
            return Err(QueryHelperError::UsageError(format!(
                "transactional write batch only accepts non-queries, got {:?} for {:?}",
                query.kind(),
                query.sql()
            )));
        }
        let mut ranked: Vec<usize> = (0..queries.len()).collect();
        ranked.sort_by_key(|&idx| queries[idx].order);
        for (rank, idx) in ranked.into_iter().enumerate() {
            queries[idx].group = group_number(rank)?;
        }
        self.execute(queries, true).await
    }

    /// Stream a row-set descriptor through its row handler; returns rows consumed.
    ///
    /// # Errors
    /// `UsageError` on a kind mismatch; otherwise as [`execute`](Self::execute).
    pub async fn read_rows(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<usize, QueryHelperError> {
        expect_kind(query, QueryKind::RowSet)?;
        self.execute_one(query, use_transaction).await?;
        Ok(query.row_count())
    }

    /// Run a non-query descriptor; returns rows affected.
    ///
    /// # Errors
    /// `UsageError` on a kind mismatch; otherwise as [`execute`](Self::execute).
    pub async fn non_query(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<usize, QueryHelperError> {
        expect_kind(query, QueryKind::NonQuery)?;
        self.execute_one(query, use_transaction).await?;
        Ok(query.row_count())
    }

    /// Run a scalar descriptor and coerce its value into `T`.
    ///
    /// # Errors
    /// `UsageError` on a kind mismatch, `CoercionError` if the value does not
    /// fit `T`; otherwise as [`execute`](Self::execute).
    pub async fn read_scalar<T: ScalarTarget>(
        &mut self,
        query: &mut Query,
        use_transaction: bool,
    ) -> Result<T, QueryHelperError> {
        expect_kind(query, QueryKind::Scalar)?;
        self.execute_one(query, use_transaction).await?;
        query.return_value::<T>()
    }

    /// One-shot scalar lookup from SQL text.
    ///
    /// # Errors
    /// Same as [`read_scalar`](Self::read_scalar).
    pub async fn read_scalar_sql<T: ScalarTarget>(
        &mut self,
        sql: &str,
        parameters: Parameters,
        use_transaction: bool,
    ) -> Result<T, QueryHelperError> {
        let mut query = Query::scalar_of::<T>(sql);
        query.parameters = parameters;
        self.read_scalar::<T>(&mut query, use_transaction).await
    }

    /// Open a connection and transaction that later calls will share.
    ///
    /// # Errors
    /// `UsageError` if a span is already open, or the driver error from
    /// opening or beginning.
    pub async fn start_transaction(&mut self) -> Result<(), QueryHelperError> {
        if self.span.is_some() {
            return Err(QueryHelperError::UsageError(
                "a transaction span is already open".into(),
            ));
        }
        let conn = self.driver.open_connection().await?;
        let tx = match self.driver.begin_transaction(&conn).await {
            Ok(tx) => tx,
            Err(err) => {
                close_quietly(&*self.driver, conn).await;
                return Err(err);
            }
        };
        self.span = Some(Span { conn, tx });
        tracing::info!(family = self.driver.family(), "transaction span opened");
        Ok(())
    }

    /// Commit the span and release its connection.
    ///
    /// # Errors
    /// `UsageError` if no span is open, or the driver error from committing
    /// or closing.
    pub async fn commit_transaction(&mut self) -> Result<(), QueryHelperError> {
        let span = self.take_span("commit")?;
        if let Err(err) = self.driver.commit(span.tx).await {
            close_quietly(&*self.driver, span.conn).await;
            return Err(err);
        }
        tracing::info!("transaction span committed");
        self.driver.close(span.conn).await
    }

    /// Roll the span back and release its connection.
    ///
    /// # Errors
    /// `UsageError` if no span is open, or the driver error from rolling back
    /// or closing.
    pub async fn rollback_transaction(&mut self) -> Result<(), QueryHelperError> {
        let span = self.take_span("roll back")?;
        if let Err(err) = self.driver.rollback(span.tx).await {
            close_quietly(&*self.driver, span.conn).await;
            return Err(err);
        }
        tracing::info!("transaction span rolled back");
        self.driver.close(span.conn).await
    }

    fn take_span(&mut self, action: &str) -> Result<Span<D>, QueryHelperError> {
        self.span.take().ok_or_else(|| {
            QueryHelperError::UsageError(format!("cannot {action}: no transaction span is open"))
        })
    }

    /// Identity lookups are resolved before any I/O so an unknown family
    /// fails the call without touching the database.
    fn resolve_identity(&self, queries: &[Query]) -> Result<Option<String>, QueryHelperError> {
        if queries.iter().any(Query::wants_identity) {
            identity_statement(&self.options, self.driver.family()).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<D: Driver> Drop for QueryHelper<D> {
    fn drop(&mut self) {
        let Some(span) = self.span.take() else {
            return;
        };
        let driver = Arc::clone(&self.driver);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = driver.rollback(span.tx).await {
                        tracing::warn!(%err, "rollback of abandoned transaction span failed");
                    }
                    close_quietly(&*driver, span.conn).await;
                });
            }
            Err(_) => {
                tracing::warn!("helper dropped outside a tokio runtime; open transaction span leaked");
            }
        }
    }
}

async fn close_quietly<D: Driver>(driver: &D, conn: D::Connection) {
    if let Err(err) = driver.close(conn).await {
        tracing::warn!(%err, "failed to close connection");
    }
}

fn group_number(position: usize) -> Result<i32, QueryHelperError> {
    i32::try_from(position)
        .map_err(|_| QueryHelperError::UsageError(format!("too many descriptors ({position})")))
}

fn expect_kind(query: &Query, kind: QueryKind) -> Result<(), QueryHelperError> {
    if query.kind() == kind {
        Ok(())
    } else {
        Err(QueryHelperError::UsageError(format!(
            "expected a {kind:?} descriptor, got {:?}",
            query.kind()
        )))
    }
}
