use crate::driver::{Driver, RowCursor};
use crate::error::QueryHelperError;
use crate::expansion::expand_in_parameters;
use crate::identity::execute_with_identity;
use crate::query::{Parameters, Query, QueryKind};
use crate::scalar::coerce_to_kind;
use crate::types::RowValues;

use super::CallContext;

/// A bound command plus what the dispatcher needs to know about it.
pub(crate) struct Prepared<D: Driver> {
    command: D::Command,
    kind: QueryKind,
    sql: String,
    parameters: Parameters,
    wants_identity: bool,
}

pub(crate) enum Outcome<C> {
    Rows(C),
    Affected { rows: usize, identity: Option<i64> },
    Scalar(RowValues),
}

/// Run the pre-hook, expand list parameters and bind the command.
pub(crate) fn prepare<D: Driver>(
    ctx: &CallContext<'_, D>,
    query: &mut Query,
) -> Result<Prepared<D>, QueryHelperError> {
    query.reset_for_execution();
    query.run_pre_execute();
    expand_in_parameters(query, ctx.prefix);

    let command =
        ctx.driver
            .create_command(ctx.conn, query.modified_sql(), &query.parameters, ctx.tx)?;

    Ok(Prepared {
        command,
        kind: query.kind(),
        sql: query.modified_sql().to_string(),
        parameters: query.parameters.clone(),
        wants_identity: query.wants_identity(),
    })
}

pub(crate) async fn dispatch<D: Driver>(
    ctx: &CallContext<'_, D>,
    prepared: &Prepared<D>,
) -> Result<Outcome<D::Cursor>, QueryHelperError> {
    ctx.logger
        .log_command(prepared.kind, &prepared.sql, &prepared.parameters);

    match prepared.kind {
        QueryKind::RowSet => {
            let cursor = ctx.driver.execute_row_set(&prepared.command).await?;
            Ok(Outcome::Rows(cursor))
        }
        QueryKind::Scalar => {
            let value = ctx.driver.execute_scalar(&prepared.command).await?;
            Ok(Outcome::Scalar(value))
        }
        QueryKind::NonQuery => {
            let (rows, identity) = if prepared.wants_identity {
                let statement = ctx.identity_statement.ok_or_else(|| {
                    QueryHelperError::ConfigError("identity statement was not resolved".into())
                })?;
                let (rows, identity) =
                    execute_with_identity(ctx, &prepared.command, statement).await?;
                (rows, Some(identity))
            } else {
                (ctx.driver.execute_non_query(&prepared.command).await?, None)
            };
            Ok(Outcome::Affected { rows, identity })
        }
    }
}

/// Turn the group's results into outcomes, or the first error in group order.
///
/// Cursors opened by successful siblings are closed before the error is returned.
pub(crate) async fn collect_group<C: RowCursor>(
    results: Vec<Result<Outcome<C>, QueryHelperError>>,
) -> Result<Vec<Outcome<C>>, QueryHelperError> {
    let mut outcomes = Vec::with_capacity(results.len());
    let mut first_err = None;
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    match first_err {
        None => Ok(outcomes),
        Some(err) => {
            close_outcomes(outcomes).await;
            Err(err)
        }
    }
}

pub(crate) async fn close_outcomes<C: RowCursor>(outcomes: impl IntoIterator<Item = Outcome<C>>) {
    for outcome in outcomes {
        if let Outcome::Rows(mut cursor) = outcome
            && let Err(err) = cursor.close().await
        {
            tracing::warn!(%err, "failed to close cursor after a failed group");
        }
    }
}

/// Record the result on the descriptor and run its row/identity/post hooks.
pub(crate) async fn post_process<C: RowCursor>(
    query: &mut Query,
    outcome: Outcome<C>,
) -> Result<(), QueryHelperError> {
    match outcome {
        Outcome::Rows(mut cursor) => {
            let streamed = stream_rows(query, &mut cursor).await;
            let closed = cursor.close().await;
            query.row_count = streamed?;
            closed?;
        }
        Outcome::Affected { rows, identity } => {
            query.row_count = rows;
            if let Some(identity) = identity {
                query.identity = Some(identity);
                query.run_identity(identity);
            }
        }
        Outcome::Scalar(value) => {
            query.row_count = 1;
            let value = match query.scalar_kind() {
                Some(kind) => coerce_to_kind(value, kind)?,
                None => value,
            };
            query.scalar_value = Some(value);
        }
    }

    let keep_going = query.run_post_execute();
    query.caused_abort = !keep_going;
    Ok(())
}

/// Feed rows to the row hook until it declines or the cursor runs dry.
///
/// The row that made the hook return `false` still counts as consumed.
async fn stream_rows<C: RowCursor>(
    query: &mut Query,
    cursor: &mut C,
) -> Result<usize, QueryHelperError> {
    let mut consumed = 0;
    while cursor.advance().await? {
        consumed += 1;
        if !query.run_on_row(&*cursor) {
            break;
        }
    }
    Ok(consumed)
}
