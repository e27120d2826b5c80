//! A scripted, recording [`Driver`] for tests.
//!
//! `MockDriver` never touches a database. Row sets, scalars and affected-row
//! counts are scripted per SQL text; every driver call is appended to an
//! event log that tests inspect afterwards through [`QueryHelper::driver`].
//! Non-queries starting with `INSERT` bump a last-insert counter that the
//! family's identity statement reads back.
//!
//! [`QueryHelper::driver`]: crate::QueryHelper::driver

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::query::Parameters;
use crate::results::{ResultSet, ResultSetCursor};
use crate::types::{DriverFamily, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteKind {
    NonQuery,
    RowSet,
    Scalar,
}

/// One driver call, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Open { conn: u64 },
    Begin { conn: u64 },
    Command { conn: u64, sql: String, in_transaction: bool },
    Execute { kind: ExecuteKind, sql: String },
    Commit { conn: u64 },
    Rollback { conn: u64 },
    Close { conn: u64 },
}

#[derive(Debug)]
pub struct MockConnection {
    id: u64,
}

impl MockConnection {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    conn: u64,
}

#[derive(Debug, Clone)]
pub struct MockCommand {
    pub conn: u64,
    pub sql: String,
    pub parameters: Parameters,
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<MockEvent>,
    commands: Vec<MockCommand>,
    next_conn: u64,
    executes: usize,
    last_insert_id: i64,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Debug, Clone, Default)]
struct Script {
    row_sets: HashMap<String, ResultSet>,
    scalars: HashMap<String, RowValues>,
    affected: HashMap<String, usize>,
    fail_on_execute: Option<usize>,
    fail_command: Option<String>,
    fail_open: bool,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MockDriver {
    family: String,
    script: Arc<Script>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// A driver reporting the `SQLite` family.
    #[must_use]
    pub fn new() -> Self {
        Self::with_family("SQLite")
    }

    #[must_use]
    pub fn with_family(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            script: Arc::new(Script::default()),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    /// Answer `sql` row-set commands with `rows`.
    #[must_use]
    pub fn with_rows(mut self, sql: impl Into<String>, rows: ResultSet) -> Self {
        self.script_mut().row_sets.insert(sql.into(), rows);
        self
    }

    #[must_use]
    pub fn with_scalar(mut self, sql: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.script_mut().scalars.insert(sql.into(), value.into());
        self
    }

    /// Rows reported as affected by `sql` (default 1).
    #[must_use]
    pub fn with_affected(mut self, sql: impl Into<String>, rows: usize) -> Self {
        self.script_mut().affected.insert(sql.into(), rows);
        self
    }

    /// Fail the `nth` execute call (1-based, counting every execute kind).
    #[must_use]
    pub fn fail_on_execute(mut self, nth: usize) -> Self {
        self.script_mut().fail_on_execute = Some(nth);
        self
    }

    /// Refuse to build a command for `sql`.
    #[must_use]
    pub fn fail_on_command(mut self, sql: impl Into<String>) -> Self {
        self.script_mut().fail_command = Some(sql.into());
        self
    }

    #[must_use]
    pub fn fail_open(mut self) -> Self {
        self.script_mut().fail_open = true;
        self
    }

    #[must_use]
    pub fn fail_begin(mut self) -> Self {
        self.script_mut().fail_begin = true;
        self
    }

    #[must_use]
    pub fn fail_commit(mut self) -> Self {
        self.script_mut().fail_commit = true;
        self
    }

    #[must_use]
    pub fn fail_rollback(mut self) -> Self {
        self.script_mut().fail_rollback = true;
        self
    }

    /// Sleep inside every execute call, so overlapping commands are observable.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script_mut().delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Every command built so far, with its bound parameters.
    #[must_use]
    pub fn commands(&self) -> Vec<MockCommand> {
        self.state().commands.clone()
    }

    /// SQL of every executed command, in execution order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Open { .. }))
    }

    #[must_use]
    pub fn begins(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Begin { .. }))
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Commit { .. }))
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Rollback { .. }))
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Close { .. }))
    }

    /// Execute calls attempted, including the failing one.
    #[must_use]
    pub fn executes(&self) -> usize {
        self.state().executes
    }

    /// Most execute calls that were in progress at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    fn record(&self, event: MockEvent) {
        self.state().events.push(event);
    }

    fn is_identity_statement(&self, sql: &str) -> bool {
        DriverFamily::detect(&self.family)
            .is_some_and(|family| family.identity_statement() == sql)
    }

    fn record_execute(state: &mut MockState, kind: ExecuteKind, sql: &str) -> usize {
        state.executes += 1;
        state.events.push(MockEvent::Execute {
            kind,
            sql: sql.to_string(),
        });
        state.executes
    }

    fn check_failure(&self, nth: usize, sql: &str) -> Result<(), QueryHelperError> {
        if self.script.fail_on_execute == Some(nth) {
            return Err(QueryHelperError::DriverError(format!(
                "injected failure on execute #{nth}: {sql}"
            )));
        }
        Ok(())
    }

    /// Bookkeeping shared by all execute kinds, plus injected failures.
    async fn begin_execute(&self, kind: ExecuteKind, sql: &str) -> Result<(), QueryHelperError> {
        let nth = {
            let mut state = self.state();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            Self::record_execute(&mut state, kind, sql)
        };
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        self.state().in_flight -= 1;
        self.check_failure(nth, sql)
    }

    fn affected(&self, sql: &str) -> usize {
        self.script.affected.get(sql).copied().unwrap_or(1)
    }

    fn scalar_for(&self, sql: &str, last_insert_id: i64) -> RowValues {
        if let Some(value) = self.script.scalars.get(sql) {
            return value.clone();
        }
        if self.is_identity_statement(sql) {
            return RowValues::Int(last_insert_id);
        }
        RowValues::Null
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;
    type Transaction = MockTransaction;
    type Command = MockCommand;
    type Cursor = ResultSetCursor;

    fn family(&self) -> &str {
        &self.family
    }

    async fn open_connection(&self) -> Result<MockConnection, QueryHelperError> {
        if self.script.fail_open {
            return Err(QueryHelperError::DriverError("injected open failure".into()));
        }
        let mut state = self.state();
        state.next_conn += 1;
        let id = state.next_conn;
        state.events.push(MockEvent::Open { conn: id });
        Ok(MockConnection { id })
    }

    async fn begin_transaction(
        &self,
        conn: &MockConnection,
    ) -> Result<MockTransaction, QueryHelperError> {
        if self.script.fail_begin {
            return Err(QueryHelperError::DriverError("injected begin failure".into()));
        }
        self.record(MockEvent::Begin { conn: conn.id });
        Ok(MockTransaction { conn: conn.id })
    }

    fn create_command(
        &self,
        conn: &MockConnection,
        sql: &str,
        parameters: &Parameters,
        tx: Option<&MockTransaction>,
    ) -> Result<MockCommand, QueryHelperError> {
        if let Some(tx) = tx
            && tx.conn != conn.id
        {
            return Err(QueryHelperError::DriverError(
                "transaction belongs to a different connection".into(),
            ));
        }
        if self.script.fail_command.as_deref() == Some(sql) {
            return Err(QueryHelperError::DriverError(format!(
                "injected failure building command: {sql}"
            )));
        }
        let command = MockCommand {
            conn: conn.id,
            sql: sql.to_string(),
            parameters: parameters.clone(),
            in_transaction: tx.is_some(),
        };
        let mut state = self.state();
        state.events.push(MockEvent::Command {
            conn: conn.id,
            sql: command.sql.clone(),
            in_transaction: command.in_transaction,
        });
        state.commands.push(command.clone());
        Ok(command)
    }

    async fn execute_non_query(&self, command: &MockCommand) -> Result<usize, QueryHelperError> {
        self.begin_execute(ExecuteKind::NonQuery, &command.sql)
            .await?;
        if is_insert(&command.sql) {
            self.state().last_insert_id += 1;
        }
        Ok(self.affected(&command.sql))
    }

    /// The insert's key bump and its lookup happen under one lock, so an
    /// overlapping sibling cannot change the key in between.
    async fn execute_non_query_with_identity(
        &self,
        conn: &MockConnection,
        command: &MockCommand,
        identity_sql: &str,
        tx: Option<&MockTransaction>,
    ) -> Result<(usize, RowValues), QueryHelperError> {
        let lookup = self.create_command(conn, identity_sql, &Parameters::new(), tx)?;
        self.begin_execute(ExecuteKind::NonQuery, &command.sql)
            .await?;
        let (nth, last_insert_id) = {
            let mut state = self.state();
            if is_insert(&command.sql) {
                state.last_insert_id += 1;
            }
            let nth = Self::record_execute(&mut state, ExecuteKind::Scalar, &lookup.sql);
            (nth, state.last_insert_id)
        };
        self.check_failure(nth, &lookup.sql)?;
        Ok((
            self.affected(&command.sql),
            self.scalar_for(&lookup.sql, last_insert_id),
        ))
    }

    async fn execute_row_set(
        &self,
        command: &MockCommand,
    ) -> Result<ResultSetCursor, QueryHelperError> {
        self.begin_execute(ExecuteKind::RowSet, &command.sql)
            .await?;
        let rows = self
            .script
            .row_sets
            .get(&command.sql)
            .cloned()
            .unwrap_or_default();
        Ok(ResultSetCursor::new(rows))
    }

    async fn execute_scalar(&self, command: &MockCommand) -> Result<RowValues, QueryHelperError> {
        self.begin_execute(ExecuteKind::Scalar, &command.sql)
            .await?;
        let last_insert_id = self.state().last_insert_id;
        Ok(self.scalar_for(&command.sql, last_insert_id))
    }

    async fn commit(&self, tx: MockTransaction) -> Result<(), QueryHelperError> {
        if self.script.fail_commit {
            return Err(QueryHelperError::DriverError("injected commit failure".into()));
        }
        self.record(MockEvent::Commit { conn: tx.conn });
        Ok(())
    }

    async fn rollback(&self, tx: MockTransaction) -> Result<(), QueryHelperError> {
        self.record(MockEvent::Rollback { conn: tx.conn });
        if self.script.fail_rollback {
            return Err(QueryHelperError::DriverError("injected rollback failure".into()));
        }
        Ok(())
    }

    async fn close(&self, conn: MockConnection) -> Result<(), QueryHelperError> {
        self.record(MockEvent::Close { conn: conn.id });
        Ok(())
    }
}
