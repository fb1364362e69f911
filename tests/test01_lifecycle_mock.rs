mod common;

use std::time::Duration;

use common::{IDENTITY_SQL, MockConnector};
use sql_command_middleware::prelude::*;
use sql_command_middleware::RETURN_VALUE_NAME;

fn engine() -> (Engine<MockConnector>, std::sync::Arc<common::MockState>) {
    let connector = MockConnector::default();
    let state = connector.state.clone();
    (Engine::with_defaults(connector), state)
}

#[tokio::test]
async fn owned_call_opens_and_closes_exactly_once() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    let rows = session.statement_non_query("UPDATE t SET a = 1", None).await?;
    assert_eq!(rows, 1);
    let table = session.statement_table("SELECT a FROM t", None).await?;
    assert_eq!(table.len(), 1);

    assert_eq!(state.opened(), 2);
    assert_eq!(state.closed(), 2);
    assert_eq!(state.begun(), 0);
    Ok(())
}

#[tokio::test]
async fn failure_outside_transaction_closes_and_returns_error_unchanged() {
    let (engine, state) = engine();
    let mut session = engine.session();

    let err = session
        .statement_non_query("UPDATE FAIL", None)
        .await
        .unwrap_err();
    assert!(matches!(&err, SqlCommandError::ExecutionError(m) if m.contains("UPDATE FAIL")));
    assert_eq!(state.opened(), 1);
    assert_eq!(state.closed(), 1);
    assert_eq!(state.rolled_back(), 0);
}

#[tokio::test]
async fn parameters_are_cleared_after_success_and_failure() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.add_input("@id", 1).add_input("@name", "ann");
    session.statement_non_query("UPDATE t SET name = @name WHERE id = @id", None).await?;
    assert!(session.parameters().is_empty());
    let log = state.log();
    assert_eq!(log[0].1.parameters().len(), 2);

    session.add_input("@id", 2);
    assert!(session.statement_non_query("FAIL", None).await.is_err());
    assert!(session.parameters().is_empty());

    // Nothing leaks into the next command.
    session.statement_non_query("UPDATE t SET a = 1", None).await?;
    assert!(state.log()[1].1.parameters().is_empty());
    Ok(())
}

#[tokio::test]
async fn transaction_reuses_one_connection_until_commit() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    assert_eq!(session.transaction_name(), Some("tx1"));
    for i in 0..3 {
        session.add_input("@i", i);
        session.statement_non_query("INSERT INTO t VALUES (@i)", None).await?;
    }
    assert_eq!(state.closed(), 0);
    session.commit().await?;

    assert!(!session.in_transaction());
    assert_eq!(state.opened(), 1);
    assert_eq!(state.begun(), 1);
    assert_eq!(state.committed(), 1);
    assert_eq!(state.closed(), 1);
    assert!(state.log().iter().all(|(conn, _)| *conn == 1));
    Ok(())
}

#[tokio::test]
async fn failure_in_transaction_rolls_back_and_returns_original_error() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    session.statement_non_query("INSERT INTO t VALUES (1)", None).await?;
    let err = session
        .statement_non_query("INSERT FAIL", None)
        .await
        .unwrap_err();

    assert!(matches!(&err, SqlCommandError::ExecutionError(m) if m.contains("INSERT FAIL")));
    assert!(!session.in_transaction());
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.committed(), 0);
    assert_eq!(state.closed(), 1);

    // Commit after the automatic rollback is a no-op.
    session.commit().await?;
    assert_eq!(state.committed(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_compensating_rollback_replaces_the_original_error() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    state.set(&state.fail_rollback, true);
    let err = session.statement_table("SELECT FAIL", None).await.unwrap_err();

    assert!(matches!(&err, SqlCommandError::TransactionError(m) if m.contains("rollback")));
    assert!(!session.in_transaction());
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn close_failure_after_rollback_keeps_the_original_error() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    state.set(&state.fail_close, true);
    let err = session.statement_scalar("SELECT FAIL", None).await.unwrap_err();

    assert!(matches!(err, SqlCommandError::ExecutionError(_)));
    assert_eq!(state.rolled_back(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_commit_rolls_back_and_reports_commit_error() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    session.statement_non_query("INSERT INTO t VALUES (1)", None).await?;
    state.set(&state.fail_commit, true);
    let err = session.commit().await.unwrap_err();

    assert!(matches!(&err, SqlCommandError::TransactionError(m) if m.contains("commit")));
    assert!(!session.in_transaction());
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn commit_and_rollback_while_idle_are_noops() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.add_input("@x", 1);
    session.commit().await?;
    session.rollback().await?;

    assert!(session.parameters().is_empty());
    assert_eq!(state.opened(), 0);
    assert_eq!(state.committed(), 0);
    assert_eq!(state.rolled_back(), 0);
    Ok(())
}

#[tokio::test]
async fn begin_while_active_is_rejected() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("outer", None).await?;
    let err = session.begin_transaction("inner", None).await.unwrap_err();
    assert!(matches!(err, SqlCommandError::TransactionError(_)));

    assert_eq!(session.transaction_name(), Some("outer"));
    assert_eq!(state.opened(), 1);
    session.rollback().await?;
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn begin_failure_leaves_session_idle_and_connection_closed() {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set(&state.fail_begin, true);
    let err = session.begin_transaction("tx1", None).await.unwrap_err();

    assert!(matches!(err, SqlCommandError::TransactionError(_)));
    assert!(!session.in_transaction());
    assert_eq!(state.opened(), 1);
    assert_eq!(state.closed(), 1);
}

#[tokio::test]
async fn connection_failure_is_returned_as_is() {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set(&state.fail_open, true);
    let err = session.statement_scalar("SELECT 1", None).await.unwrap_err();
    assert!(matches!(err, SqlCommandError::ConnectionError(_)));
    assert_eq!(state.closed(), 0);
}

#[tokio::test]
async fn exceeded_timeout_is_an_execution_error() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    let err = session
        .statement_non_query("UPDATE SLOW", Some(1))
        .await
        .unwrap_err();

    assert!(matches!(&err, SqlCommandError::ExecutionError(m) if m.contains("timed out")));
    assert!(!session.in_transaction());
    assert_eq!(state.rolled_back(), 1);
    Ok(())
}

#[tokio::test]
async fn zero_timeout_is_a_command_error() {
    let (engine, state) = engine();
    let mut session = engine.session();

    let err = session.statement_scalar("SELECT 1", Some(0)).await.unwrap_err();
    assert!(matches!(err, SqlCommandError::CommandError(_)));
    assert_eq!(state.opened(), state.closed());
}

#[tokio::test]
async fn insert_returning_id_reads_identity_on_the_same_connection() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.add_input("@name", "ann");
    let inserted = session
        .statement_insert_returning_id("INSERT INTO users (name) VALUES (@name)", None)
        .await?;

    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.id, Some(RowValues::Int(100)));
    let log = state.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, log[1].0);
    assert_eq!(log[1].1.text(), IDENTITY_SQL);
    assert_eq!(state.opened(), 1);
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn positional_procedure_arguments_skip_the_return_slot() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.add_input("@ignored", 9);
    session
        .procedure_non_query("dbo.AddThing", &[RowValues::Int(1)], None)
        .await?;
    assert!(session.parameters().is_empty());

    let log = state.log();
    let params = log[0].1.parameters();
    assert_eq!(log[0].1.kind(), CommandKind::StoredProcedure);
    assert_eq!(params.len(), 5);
    assert_eq!(params[0].name, RETURN_VALUE_NAME);
    assert_eq!(params[0].direction, ParameterDirection::ReturnValue);
    assert_eq!(params[1].value, Some(RowValues::Int(1)));
    assert_eq!(params[2].value, Some(RowValues::Null));
    assert_eq!(params[3].value, Some(RowValues::Null));
    Ok(())
}

#[tokio::test]
async fn error_parms_are_surfaced() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set_output("@ReturnCode", RowValues::Int(5));
    state.set_output("@ReturnMessage", RowValues::Text("duplicate name".into()));
    let (rows, parms) = session
        .procedure_non_query_with_error_parms("dbo.AddThing", &[1.into(), 2.into()], None)
        .await?;

    assert_eq!(rows, 1);
    assert!(!parms.is_success());
    assert_eq!(parms.return_code, 5);
    assert_eq!(parms.return_message, "duplicate name");
    Ok(())
}

#[tokio::test]
async fn named_procedure_outputs_are_captured() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set_output("@total", RowValues::Int(42));
    session
        .add_input("@a", 40)
        .add_output("@total", "int")
        .add_input_output("@ReturnCode", 0)
        .add_input_output("@ReturnMessage", "");
    let outcome = session
        .procedure_non_query_with_output_and_error_parms("dbo.Sum", None)
        .await?;

    assert_eq!(outcome.outputs.get("total"), Some(&RowValues::Int(42)));
    assert_eq!(
        outcome.error_parms,
        Some(ErrorParms {
            return_code: 0,
            return_message: String::new()
        })
    );
    assert!(session.parameters().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_error_parms_is_a_parameter_error() {
    let (engine, _state) = engine();
    let mut session = engine.session();

    session.add_input("@a", 1);
    let err = session
        .procedure_non_query_with_output_and_error_parms("dbo.Sum", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlCommandError::ParameterError(_)));
}

#[tokio::test]
async fn unknown_procedure_rolls_back_active_transaction() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    let err = session
        .procedure_table("dbo.missing", &[], None)
        .await
        .unwrap_err();

    assert!(matches!(err, SqlCommandError::CommandError(_)));
    assert!(!session.in_transaction());
    assert_eq!(state.rolled_back(), 1);
    Ok(())
}

#[tokio::test]
async fn close_rolls_back_an_active_transaction() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", Some(IsolationLevel::Serializable)).await?;
    session.close().await?;

    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn statement_outputs_are_returned() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set_output("@total", RowValues::Int(7));
    session.add_input("@a", 3).add_output("@total", "int");
    let outcome = session
        .statement_non_query_with_output("SET @total = @a + 4", None)
        .await?;
    assert_eq!(outcome.outputs.get("@total"), Some(&RowValues::Int(7)));
    assert_eq!(outcome.outputs.len(), 1);
    Ok(())
}

#[tokio::test]
async fn abandoned_call_rolls_back_and_commit_reports_it() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    session.statement_non_query("INSERT INTO t VALUES (1)", None).await?;
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        session.statement_non_query("UPDATE SLOW", None),
    )
    .await;
    assert!(abandoned.is_err());

    // Cleanup of the dropped call runs on a spawned task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.opened(), 1);
    assert_eq!(state.closed(), 1);
    assert!(session.in_transaction());
    assert_eq!(session.transaction_name(), Some("tx1"));

    let err = session
        .statement_non_query("UPDATE t SET a = 2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlCommandError::TransactionError(_)));
    assert_eq!(state.opened(), 1);

    let err = session.commit().await.unwrap_err();
    assert!(matches!(&err, SqlCommandError::TransactionError(m) if m.contains("tx1")));
    assert_eq!(state.committed(), 0);
    assert!(!session.in_transaction());

    session.statement_non_query("UPDATE t SET a = 3", None).await?;
    assert_eq!(state.opened(), state.closed());
    Ok(())
}

#[tokio::test]
async fn rollback_acknowledges_an_abandoned_transaction() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        session.statement_table("SELECT SLOW", None),
    )
    .await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = session.begin_transaction("tx2", None).await.unwrap_err();
    assert!(matches!(err, SqlCommandError::TransactionError(_)));

    session.rollback().await?;
    assert!(!session.in_transaction());
    session.begin_transaction("tx2", None).await?;
    session.commit().await?;
    assert_eq!(state.committed(), 1);
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.opened(), state.closed());
    Ok(())
}

#[tokio::test]
async fn dropped_session_rolls_back_its_transaction() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    session.begin_transaction("tx1", None).await?;
    session.statement_non_query("INSERT INTO t VALUES (1)", None).await?;
    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(state.committed(), 0);
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.closed(), 1);
    Ok(())
}

#[tokio::test]
async fn error_parms_left_null_are_not_success() {
    let (engine, state) = engine();
    let mut session = engine.session();

    let err = session
        .procedure_non_query_with_error_parms("dbo.AddThing", &[1.into()], None)
        .await
        .unwrap_err();
    assert!(matches!(&err, SqlCommandError::ParameterError(m) if m.contains("@ReturnCode")));
    assert_eq!(state.opened(), state.closed());
}

#[tokio::test]
async fn procedure_table_surfaces_success_error_parms() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set_output("@ReturnCode", RowValues::Int(0));
    state.set_output("@ReturnMessage", RowValues::Text("OK".into()));
    let (table, parms) = session
        .procedure_table_with_error_parms("dbo.AddThing", &[1.into(), 2.into()], None)
        .await?;

    assert_eq!(table.len(), 1);
    assert_eq!(
        parms,
        ErrorParms {
            return_code: 0,
            return_message: "OK".to_string()
        }
    );
    assert!(parms.is_success());
    Ok(())
}

#[tokio::test]
async fn procedure_table_surfaces_failure_error_parms() -> Result<(), SqlCommandError> {
    let (engine, state) = engine();
    let mut session = engine.session();

    state.set_output("@ReturnCode", RowValues::Int(-3));
    state.set_output("@ReturnMessage", RowValues::Text("quota exceeded".into()));
    session.begin_transaction("tx1", None).await?;
    let (_table, parms) = session
        .procedure_table_with_error_parms("dbo.AddThing", &[1.into()], None)
        .await?;

    assert!(!parms.is_success());
    assert_eq!(parms.return_code, -3);
    assert_eq!(parms.return_message, "quota exceeded");
    // Reported error parameters are data, not a failure: the transaction survives.
    assert!(session.in_transaction());
    session.commit().await?;
    assert_eq!(state.committed(), 1);
    Ok(())
}

#[tokio::test]
async fn procedure_table_missing_error_parm_rolls_back() -> Result<(), SqlCommandError> {
    let connector = MockConnector::default();
    let state = connector.state.clone();
    let options = EngineOptions::builder()
        .error_parm_names("@ReturnCode", "@StatusText")
        .build()?;
    let engine = Engine::new(connector, options)?;
    let mut session = engine.session();

    state.set_output("@ReturnCode", RowValues::Int(0));
    state.set_output("@ReturnMessage", RowValues::Text("OK".into()));
    session.begin_transaction("tx1", None).await?;
    let err = session
        .procedure_table_with_error_parms("dbo.AddThing", &[1.into()], None)
        .await
        .unwrap_err();

    assert!(matches!(&err, SqlCommandError::ParameterError(m) if m.contains("@StatusText")));
    assert!(!session.in_transaction());
    assert_eq!(state.rolled_back(), 1);
    assert_eq!(state.committed(), 0);
    assert_eq!(state.opened(), state.closed());
    Ok(())
}
