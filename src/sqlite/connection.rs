use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::InterruptHandle;
use tokio::sync::Mutex;
use tracing::debug;

use super::params::bind_named;
use super::query::build_result_set;
use crate::backend::DbConnection;
use crate::command::{CommandKind, CommandSpec, ProcedureParameter};
use crate::error::{Result, SqlCommandError};
use crate::results::{DataSet, ExecOutcome, QueryOutcome};
use crate::types::IsolationLevel;

/// Shared handle so a blocking task can own the connection while it runs.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// One exclusively owned `SQLite` connection.
///
/// rusqlite is synchronous, so every call runs on tokio's blocking pool.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    interrupt: InterruptHandle,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// Run `func` against the raw connection on the blocking pool.
    ///
    /// # Errors
    /// Returns whatever `func` returns, or `SqlCommandError::ExecutionError` if the
    /// blocking task panics.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.conn), func).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlCommandError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

fn reject_procedure(command: &CommandSpec) -> Result<()> {
    match command.kind() {
        CommandKind::Statement => Ok(()),
        CommandKind::StoredProcedure => Err(SqlCommandError::Unimplemented(format!(
            "SQLite has no stored procedures ({})",
            command.text()
        ))),
    }
}

#[async_trait]
impl DbConnection for SqliteConnection {
    async fn query(&mut self, command: &CommandSpec) -> Result<QueryOutcome> {
        reject_procedure(command)?;
        let command = command.clone();
        let table = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(command.text())?;
                bind_named(&mut stmt, command.parameters())?;
                build_result_set(&mut stmt)
            })
            .await?;
        Ok(QueryOutcome {
            data: DataSet::new(vec![table]),
            ..QueryOutcome::default()
        })
    }

    async fn execute(&mut self, command: &CommandSpec) -> Result<ExecOutcome> {
        reject_procedure(command)?;
        let command = command.clone();
        let rows_affected = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(command.text())?;
                bind_named(&mut stmt, command.parameters())?;
                Ok(stmt.raw_execute()?)
            })
            .await?;
        Ok(ExecOutcome {
            rows_affected,
            ..ExecOutcome::default()
        })
    }

    async fn derive_parameters(&mut self, procedure: &str) -> Result<Vec<ProcedureParameter>> {
        Err(SqlCommandError::Unimplemented(format!(
            "SQLite has no stored procedures ({procedure})"
        )))
    }

    fn identity_query(&self) -> &'static str {
        "SELECT last_insert_rowid()"
    }

    async fn begin(&mut self, name: &str, isolation: IsolationLevel) -> Result<()> {
        // SQLite transactions are unnamed; the name only matters to the caller.
        debug!(transaction = name, ?isolation, "sqlite begin");
        let sql = match isolation {
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1; BEGIN DEFERRED",
            IsolationLevel::Serializable | IsolationLevel::Snapshot => "BEGIN IMMEDIATE",
            IsolationLevel::Default
            | IsolationLevel::ReadCommitted
            | IsolationLevel::RepeatableRead => "BEGIN DEFERRED",
        };
        self.with_connection(move |conn| Ok(conn.execute_batch(sql)?))
            .await
    }

    async fn commit(&mut self, _name: &str) -> Result<()> {
        self.with_connection(|conn| Ok(conn.execute_batch("COMMIT")?))
            .await
    }

    async fn rollback(&mut self, _name: &str) -> Result<()> {
        self.with_connection(|conn| {
            // An interrupted write already rolled the transaction back.
            if conn.is_autocommit() {
                debug!("sqlite rollback with no open transaction");
                return Ok(());
            }
            Ok(conn.execute_batch("ROLLBACK")?)
        })
        .await
    }

    fn cancel(&self) {
        self.interrupt.interrupt();
    }

    async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner();
                tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e))
                    .await
                    .map_err(|e| {
                        SqlCommandError::ConnectionError(format!(
                            "sqlite spawn_blocking join error: {e}"
                        ))
                    })??;
                Ok(())
            }
            Err(_) => {
                // An abandoned blocking call still holds the connection; it is
                // interrupted here and closes when that call returns.
                self.interrupt.interrupt();
                debug!("sqlite connection busy at close, interrupted");
                Ok(())
            }
        }
    }
}
