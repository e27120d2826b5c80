//! Grouped execution over a single connection.
//!
//! Descriptors are partitioned by `group` and the groups run in ascending
//! order. Inside a group every command is prepared (pre-hook, list expansion,
//! binding) in `order` order, then all of them are dispatched together and
//! awaited as a set. Post-processing walks the group in the same order it was
//! prepared, independent of completion order.

mod dispatch;

use futures_util::future::join_all;

use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::logging::QueryLogger;
use crate::query::Query;

/// Everything one top-level call needs to reach the database.
pub(crate) struct CallContext<'a, D: Driver> {
    pub(crate) driver: &'a D,
    pub(crate) conn: &'a D::Connection,
    pub(crate) tx: Option<&'a D::Transaction>,
    pub(crate) logger: &'a QueryLogger,
    pub(crate) identity_statement: Option<&'a str>,
    pub(crate) prefix: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    /// A post-execute hook asked to stop; later groups were not dispatched.
    Aborted,
}

/// Indices of `queries` per group, groups ascending, members by `order`.
///
/// The sort is stable, so descriptors with equal `order` keep input order.
pub(crate) fn partition_groups(queries: &[Query]) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..queries.len()).collect();
    indices.sort_by_key(|&idx| (queries[idx].group, queries[idx].order));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current = None;
    for idx in indices {
        let group = queries[idx].group;
        if current != Some(group) {
            groups.push(Vec::new());
            current = Some(group);
        }
        if let Some(members) = groups.last_mut() {
            members.push(idx);
        }
    }
    groups
}

pub(crate) async fn run_groups<D: Driver>(
    ctx: &CallContext<'_, D>,
    queries: &mut [Query],
) -> Result<RunOutcome, QueryHelperError> {
    for members in partition_groups(queries) {
        let mut prepared = Vec::with_capacity(members.len());
        for &idx in &members {
            prepared.push(dispatch::prepare(ctx, &mut queries[idx])?);
        }
        // Only once the whole group is bound does anything reach the driver.
        for &idx in &members {
            queries[idx].executed = true;
        }

        let results = join_all(prepared.iter().map(|p| dispatch::dispatch(ctx, p))).await;
        let outcomes = dispatch::collect_group(results).await?;

        let mut aborted = false;
        let mut pending = members.iter().zip(outcomes);
        while let Some((&idx, outcome)) = pending.next() {
            let query = &mut queries[idx];
            if let Err(err) = dispatch::post_process(query, outcome).await {
                dispatch::close_outcomes(pending.map(|(_, outcome)| outcome)).await;
                return Err(err);
            }
            aborted |= query.caused_abort();
        }

        if aborted {
            let group = members.first().map(|&idx| queries[idx].group);
            tracing::debug!(?group, "post-execute hook stopped the batch");
            return Ok(RunOutcome::Aborted);
        }
    }
    Ok(RunOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_sorted_and_members_ordered() {
        let queries = vec![
            Query::non_query("a").in_group(5).with_order(2),
            Query::non_query("b").in_group(1),
            Query::non_query("c").in_group(5).with_order(1),
            Query::non_query("d").in_group(-3),
            Query::non_query("e").in_group(5).with_order(1),
        ];
        assert_eq!(
            partition_groups(&queries),
            vec![vec![3], vec![1], vec![2, 4, 0]]
        );
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(partition_groups(&[]).is_empty());
    }
}
