use std::error::Error;
use std::time::Duration;

use sql_query_helper::prelude::*;
use sql_query_helper::test_utils::{MockDriver, MockEvent};
use tokio::runtime::Runtime;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn inserts(n: usize) -> Vec<Query> {
    (0..n)
        .map(|i| {
            Query::non_query("INSERT INTO Audit (Step) VALUES (@step)")
                .with_parameter("step", i64::try_from(i).unwrap_or_default())
        })
        .collect()
}

#[test]
fn failure_on_fifth_of_ten_rolls_back_once() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new().fail_on_execute(5));

    let mut queries = inserts(10);
    let err = rt
        .block_on(helper.execute_sequential(&mut queries, true))
        .expect_err("fifth command fails");
    assert!(err.is_driver_error());

    let driver = helper.driver();
    assert_eq!(driver.executes(), 5);
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.closes(), 1);
    assert!(queries[4].executed());
    assert!(queries[5..].iter().all(|q| !q.executed()));
    Ok(())
}

#[test]
fn span_shares_one_connection_and_transaction() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new());

    rt.block_on(async {
        helper.start_transaction().await?;
        assert!(helper.is_transaction_open());

        let mut first = inserts(2);
        helper.execute(&mut first, true).await?;
        let mut second = vec![Query::scalar_of::<i64>("SELECT COUNT(*) FROM Audit")];
        helper.execute(&mut second, true).await?;

        helper.commit_transaction().await
    })?;

    let driver = helper.driver();
    assert!(!helper.is_transaction_open());
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.begins(), 1);
    assert_eq!(driver.commits(), 1);
    assert_eq!(driver.closes(), 1);
    assert!(driver.commands().iter().all(|c| c.in_transaction && c.conn == 1));
    Ok(())
}

#[test]
fn span_misuse_is_a_usage_error() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new());

    let err = rt
        .block_on(helper.commit_transaction())
        .expect_err("nothing to commit");
    assert!(err.is_usage_error());
    let err = rt
        .block_on(helper.rollback_transaction())
        .expect_err("nothing to roll back");
    assert!(err.is_usage_error());

    rt.block_on(helper.start_transaction())?;
    let err = rt
        .block_on(helper.start_transaction())
        .expect_err("span already open");
    assert!(err.is_usage_error());

    let mut queries = inserts(1);
    let err = rt
        .block_on(helper.execute(&mut queries, false))
        .expect_err("span requires transactional calls");
    assert!(err.is_usage_error());
    assert!(!queries[0].executed());

    rt.block_on(helper.rollback_transaction())?;
    let driver = helper.driver();
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.executes(), 0);
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.closes(), 1);
    Ok(())
}

#[test]
fn errors_inside_a_span_leave_it_open() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new().fail_on_execute(1));

    rt.block_on(helper.start_transaction())?;
    let mut queries = inserts(1);
    assert!(rt.block_on(helper.execute(&mut queries, true)).is_err());
    assert!(helper.is_transaction_open());
    assert_eq!(helper.driver().rollbacks(), 0);
    assert_eq!(helper.driver().closes(), 0);

    rt.block_on(helper.rollback_transaction())?;
    assert_eq!(helper.driver().rollbacks(), 1);
    Ok(())
}

#[test]
fn abort_action_rollback_discards_finished_groups() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let options = QueryHelperOptionsBuilder::new()
        .abort_action(AbortAction::Rollback)
        .finish();
    let mut helper = QueryHelper::with_options(MockDriver::new(), options)?;

    let mut queries = vec![
        Query::non_query("INSERT INTO Audit (Step) VALUES (1)").with_post_execute(|_| false),
        Query::non_query("INSERT INTO Audit (Step) VALUES (2)").in_group(1),
    ];
    rt.block_on(helper.execute(&mut queries, true))?;

    assert!(!queries[1].executed());
    assert_eq!(helper.driver().rollbacks(), 1);
    assert_eq!(helper.driver().commits(), 0);
    Ok(())
}

#[test]
fn begin_failure_closes_the_connection() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new().fail_begin());

    let mut queries = inserts(1);
    let err = rt
        .block_on(helper.execute(&mut queries, true))
        .expect_err("begin fails");
    assert!(err.is_driver_error());
    assert_eq!(helper.driver().executes(), 0);
    assert_eq!(helper.driver().closes(), 1);

    assert!(rt.block_on(helper.start_transaction()).is_err());
    assert!(!helper.is_transaction_open());
    assert_eq!(helper.driver().closes(), 2);
    Ok(())
}

#[test]
fn rollback_failure_does_not_mask_the_original_error() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new().fail_on_execute(2).fail_rollback());

    let mut queries = inserts(3);
    let err = rt
        .block_on(helper.execute_sequential(&mut queries, true))
        .expect_err("second command fails");
    assert!(err.to_string().contains("injected failure on execute #2"));
    assert_eq!(helper.driver().rollbacks(), 1);
    assert_eq!(helper.driver().closes(), 1);
    Ok(())
}

#[test]
fn bind_failure_leaves_the_whole_group_unexecuted() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper =
        QueryHelper::new(MockDriver::new().fail_on_command("UPDATE b SET y = @y"));

    let mut queries = vec![
        Query::non_query("UPDATE a SET x = 1"),
        Query::non_query("UPDATE b SET y = @y").with_parameter("y", 2_i64),
    ];
    let err = rt
        .block_on(helper.execute(&mut queries, true))
        .expect_err("second member cannot be bound");
    assert!(err.is_driver_error());
    assert!(queries.iter().all(|q| !q.executed()));
    assert_eq!(helper.driver().executes(), 0);
    assert_eq!(helper.driver().rollbacks(), 1);
    Ok(())
}

#[test]
fn failing_sibling_still_lets_the_group_finish() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(
        MockDriver::new()
            .fail_on_execute(1)
            .with_delay(Duration::from_millis(5)),
    );

    let mut queries = vec![
        Query::non_query("UPDATE a SET x = 1"),
        Query::row_set("SELECT x FROM b"),
        Query::scalar("SELECT COUNT(*) FROM c"),
    ];
    let err = rt
        .block_on(helper.execute(&mut queries, true))
        .expect_err("first member fails");
    assert!(err.to_string().contains("UPDATE a"));
    assert_eq!(helper.driver().executes(), 3);
    assert_eq!(helper.driver().rollbacks(), 1);
    Ok(())
}

#[test]
fn write_batch_runs_by_order_in_one_transaction() -> Result<(), Box<dyn Error>> {
    let rt = Runtime::new()?;
    let mut helper = QueryHelper::new(MockDriver::new());

    let mut batch = vec![
        Query::non_query("INSERT INTO t (a) VALUES (3)").with_order(30),
        Query::non_query("INSERT INTO t (a) VALUES (1)").with_order(10),
        Query::non_query("INSERT INTO t (a) VALUES (2)").with_order(20),
    ];
    rt.block_on(helper.non_query_with_transaction(&mut batch))?;

    let driver = helper.driver();
    assert_eq!(
        driver.executed_sql(),
        vec![
            "INSERT INTO t (a) VALUES (1)",
            "INSERT INTO t (a) VALUES (2)",
            "INSERT INTO t (a) VALUES (3)",
        ]
    );
    assert_eq!(driver.begins(), 1);
    assert_eq!(driver.commits(), 1);
    Ok(())
}

#[test]
fn dropping_helper_with_open_span_rolls_back() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let rt = Runtime::new()?;
    let probe = MockDriver::new();
    let driver = probe.clone();

    rt.block_on(async move {
        let mut helper = QueryHelper::new(driver);
        helper.start_transaction().await?;
        drop(helper);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, QueryHelperError>(())
    })?;

    assert_eq!(probe.rollbacks(), 1);
    assert_eq!(probe.closes(), 1);
    assert!(matches!(probe.events().last(), Some(MockEvent::Close { conn: 1 })));
    Ok(())
}
