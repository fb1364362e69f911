//! In-memory connector that records every lifecycle event.
//!
//! Statement text drives behaviour: `FAIL` makes the command fail, `SLOW` makes it
//! sleep long enough to trip a one-second timeout.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_command_middleware::prelude::*;
use sql_command_middleware::{ColumnInfo, ExecOutcome, QueryOutcome};

pub const IDENTITY_SQL: &str = "SELECT MOCK_IDENTITY";

#[derive(Default)]
pub struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub fail_close: AtomicBool,
    log: Mutex<Vec<(usize, CommandSpec)>>,
    outputs: Mutex<OutputParameters>,
}

impl MockState {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Value the mock server writes into an output parameter of this name.
    pub fn set_output(&self, name: &str, value: RowValues) {
        self.outputs.lock().unwrap().insert(name, value);
    }

    /// Every command run so far, with the id of the connection it ran on.
    pub fn log(&self) -> Vec<(usize, CommandSpec)> {
        self.log.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub state: Arc<MockState>,
}

pub struct MockConnection {
    id: usize,
    state: Arc<MockState>,
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn open(&self) -> Result<MockConnection, SqlCommandError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(SqlCommandError::ConnectionError("mock server unreachable".into()));
        }
        let id = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            id,
            state: Arc::clone(&self.state),
        })
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }
}

impl MockConnection {
    async fn run(&self, command: &CommandSpec) -> Result<(), SqlCommandError> {
        if command.text().contains("SLOW") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if command.text().contains("FAIL") {
            return Err(SqlCommandError::ExecutionError(format!(
                "mock failure: {}",
                command.text()
            )));
        }
        self.state.log.lock().unwrap().push((self.id, command.clone()));
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn query(&mut self, command: &CommandSpec) -> Result<QueryOutcome, SqlCommandError> {
        self.run(command).await?;
        let mut table = ResultSet::with_capacity(1);
        if command.text() == IDENTITY_SQL {
            table.set_columns(vec![ColumnInfo::new("id", "bigint")]);
            table.add_row_values(vec![RowValues::Int(i64::try_from(self.id).unwrap() * 100)]);
        } else {
            table.set_columns(vec![
                ColumnInfo::new("conn_id", "bigint"),
                ColumnInfo::new("text", "nvarchar"),
            ]);
            table.add_row_values(vec![
                RowValues::Int(i64::try_from(self.id).unwrap()),
                RowValues::Text(command.text().to_string()),
            ]);
        }
        let mut data = DataSet::default();
        data.tables.push(table);
        Ok(QueryOutcome {
            data,
            outputs: self.outputs_for(command),
        })
    }

    async fn execute(&mut self, command: &CommandSpec) -> Result<ExecOutcome, SqlCommandError> {
        self.run(command).await?;
        Ok(ExecOutcome {
            rows_affected: 1,
            outputs: self.outputs_for(command),
        })
    }

    async fn derive_parameters(
        &mut self,
        procedure: &str,
    ) -> Result<Vec<ProcedureParameter>, SqlCommandError> {
        if procedure.contains("missing") {
            return Err(SqlCommandError::CommandError(format!(
                "stored procedure {procedure} not found"
            )));
        }
        Ok(vec![
            ProcedureParameter::return_value(),
            ProcedureParameter::new("@a", ParameterDirection::Input, Some("int".into())),
            ProcedureParameter::new("@b", ParameterDirection::Input, Some("int".into())),
            ProcedureParameter::new(
                "@ReturnCode",
                ParameterDirection::InputOutput,
                Some("int".into()),
            ),
            ProcedureParameter::new(
                "@ReturnMessage",
                ParameterDirection::InputOutput,
                Some("nvarchar(200)".into()),
            ),
        ])
    }

    fn identity_query(&self) -> &'static str {
        IDENTITY_SQL
    }

    async fn begin(&mut self, _name: &str, _isolation: IsolationLevel) -> Result<(), SqlCommandError> {
        if self.state.fail_begin.load(Ordering::SeqCst) {
            return Err(SqlCommandError::TransactionError("mock begin failure".into()));
        }
        self.state.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self, _name: &str) -> Result<(), SqlCommandError> {
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(SqlCommandError::TransactionError("mock commit failure".into()));
        }
        self.state.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self, _name: &str) -> Result<(), SqlCommandError> {
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(SqlCommandError::TransactionError("mock rollback failure".into()));
        }
        self.state.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> Result<(), SqlCommandError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(SqlCommandError::ConnectionError("mock close failure".into()));
        }
        Ok(())
    }
}

impl MockConnection {
    fn outputs_for(&self, command: &CommandSpec) -> OutputParameters {
        let scripted = self.state.outputs.lock().unwrap();
        let mut outputs = OutputParameters::new();
        for p in command.parameters() {
            if p.direction.is_output() {
                let value = scripted
                    .get(&p.name)
                    .cloned()
                    .unwrap_or_else(|| p.bind_value());
                outputs.insert(p.name.clone(), value);
            }
        }
        outputs
    }
}
