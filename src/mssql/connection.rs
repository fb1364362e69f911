use async_trait::async_trait;
use tracing::debug;

use super::batch::{RenderedBatch, render};
use super::client::MssqlClient;
use super::metadata;
use super::params::bind_query;
use super::query::{collect_sets, take_outputs};
use crate::backend::DbConnection;
use crate::command::{CommandSpec, ProcedureParameter};
use crate::error::{Result, SqlCommandError};
use crate::results::{DataSet, ExecOutcome, QueryOutcome};
use crate::types::IsolationLevel;

/// One exclusively owned SQL Server connection.
pub struct MssqlConnection {
    client: MssqlClient,
}

impl MssqlConnection {
    pub(crate) fn new(client: MssqlClient) -> Self {
        Self { client }
    }

    async fn run_query(&mut self, batch: &RenderedBatch) -> Result<DataSet> {
        let stream = bind_query(&batch.sql, &batch.binds)
            .query(&mut self.client)
            .await
            .map_err(|e| {
                SqlCommandError::ExecutionError(format!("SQL Server query error: {e}"))
            })?;
        collect_sets(stream).await
    }

    /// Run a transaction-control batch outside `sp_executesql`, whose scope would
    /// otherwise unbalance the transaction count.
    async fn run_control(&mut self, sql: &str, what: &str) -> Result<()> {
        debug!(sql, "transaction control");
        self.client
            .simple_query(sql)
            .await
            .map_err(|e| SqlCommandError::TransactionError(format!("{what} failed: {e}")))?
            .into_results()
            .await
            .map_err(|e| SqlCommandError::TransactionError(format!("{what} failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MssqlConnection {
    async fn query(&mut self, command: &CommandSpec) -> Result<QueryOutcome> {
        let batch = render(command)?;
        let mut data = self.run_query(&batch).await?;
        let (outputs, _) = take_outputs(&batch, &mut data)?;
        Ok(QueryOutcome { data, outputs })
    }

    async fn execute(&mut self, command: &CommandSpec) -> Result<ExecOutcome> {
        let batch = render(command)?;
        if batch.has_outputs() {
            let mut data = self.run_query(&batch).await?;
            let (outputs, rows_affected) = take_outputs(&batch, &mut data)?;
            return Ok(ExecOutcome {
                rows_affected,
                outputs,
            });
        }

        let result = bind_query(&batch.sql, &batch.binds)
            .execute(&mut self.client)
            .await
            .map_err(|e| {
                SqlCommandError::ExecutionError(format!("SQL Server execute error: {e}"))
            })?;
        let rows: u64 = result.rows_affected().iter().sum();
        let rows_affected = usize::try_from(rows).map_err(|e| {
            SqlCommandError::ExecutionError(format!("Invalid rows affected count: {e}"))
        })?;
        Ok(ExecOutcome {
            rows_affected,
            ..ExecOutcome::default()
        })
    }

    async fn derive_parameters(&mut self, procedure: &str) -> Result<Vec<ProcedureParameter>> {
        metadata::derive_parameters(&mut self.client, procedure).await
    }

    fn identity_query(&self) -> &'static str {
        "SELECT CAST(@@IDENTITY AS bigint)"
    }

    async fn begin(&mut self, name: &str, isolation: IsolationLevel) -> Result<()> {
        let mut sql = String::new();
        if let Some(level) = isolation_clause(isolation) {
            sql.push_str("SET TRANSACTION ISOLATION LEVEL ");
            sql.push_str(level);
            sql.push_str("; ");
        }
        sql.push_str(&named_transaction("BEGIN", name));
        self.run_control(&sql, "BEGIN TRANSACTION").await
    }

    async fn commit(&mut self, _name: &str) -> Result<()> {
        self.run_control("COMMIT TRANSACTION", "COMMIT TRANSACTION")
            .await
    }

    async fn rollback(&mut self, name: &str) -> Result<()> {
        let sql = named_transaction("ROLLBACK", name);
        self.run_control(&sql, "ROLLBACK TRANSACTION").await
    }

    async fn close(self) -> Result<()> {
        self.client.close().await.map_err(|e| {
            SqlCommandError::ConnectionError(format!("SQL Server close error: {e}"))
        })
    }
}

fn isolation_clause(level: IsolationLevel) -> Option<&'static str> {
    match level {
        IsolationLevel::Default => None,
        IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
        IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
        IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
        IsolationLevel::Serializable => Some("SERIALIZABLE"),
        IsolationLevel::Snapshot => Some("SNAPSHOT"),
    }
}

/// The name travels through a variable so any caller text is safe; SQL Server keeps
/// the first 32 characters.
fn named_transaction(verb: &str, name: &str) -> String {
    format!(
        "DECLARE @__tx nvarchar(32) = N'{}'; {verb} TRANSACTION @__tx;",
        name.replace('\'', "''")
    )
}
