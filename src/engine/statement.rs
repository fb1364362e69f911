use crate::backend::{Connector, DbConnection};
use crate::command::CommandBuilder;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::results::{DataSet, ExecOutcome, InsertOutcome, ResultSet};
use crate::types::RowValues;

use super::Session;
use super::scope::{CallConnection, timed};

impl<C: Connector> Session<'_, C> {
    /// Run a statement and materialize its first result set.
    ///
    /// Queued parameters are bound by name and cleared whatever the outcome.
    ///
    /// # Errors
    /// Returns construction, connection or execution failures unchanged; an active
    /// transaction is rolled back first.
    pub async fn statement_table(&mut self, sql: &str, timeout: Option<u32>) -> Result<ResultSet> {
        Ok(self.statement_set(sql, timeout).await?.into_first())
    }

    /// Run a statement and materialize every result set it produces.
    ///
    /// # Errors
    /// See [`statement_table`](Session::statement_table).
    pub async fn statement_set(&mut self, sql: &str, timeout: Option<u32>) -> Result<DataSet> {
        const OP: &str = "statement_set";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = query_set(&mut call, sql, timeout, &parameters).await;
        self.release(call, outcome).await
    }

    /// Run a statement for its side effects and return the affected-row count.
    ///
    /// # Errors
    /// See [`statement_table`](Session::statement_table).
    pub async fn statement_non_query(&mut self, sql: &str, timeout: Option<u32>) -> Result<usize> {
        Ok(self
            .statement_non_query_with_output(sql, timeout)
            .await?
            .rows_affected)
    }

    /// Like [`statement_non_query`](Session::statement_non_query), also returning the
    /// values written into OUTPUT and INPUT/OUTPUT parameters.
    ///
    /// # Errors
    /// See [`statement_table`](Session::statement_table).
    pub async fn statement_non_query_with_output(
        &mut self,
        sql: &str,
        timeout: Option<u32>,
    ) -> Result<ExecOutcome> {
        const OP: &str = "statement_non_query";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = execute(&mut call, sql, timeout, &parameters).await;
        self.release(call, outcome).await
    }

    /// Run an insert, then fetch the last identity value generated on the same
    /// connection.
    ///
    /// The identity is connection scoped, not table scoped: if a trigger inserts into
    /// another identity table, its value is the one returned.
    ///
    /// # Errors
    /// See [`statement_table`](Session::statement_table).
    pub async fn statement_insert_returning_id(
        &mut self,
        sql: &str,
        timeout: Option<u32>,
    ) -> Result<InsertOutcome> {
        const OP: &str = "statement_insert_returning_id";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = insert_returning_id(&mut call, sql, timeout, &parameters).await;
        self.release(call, outcome).await
    }

    /// Run a statement and return the first column of the first row, or `None` when
    /// it yields no rows.
    ///
    /// # Errors
    /// See [`statement_table`](Session::statement_table).
    pub async fn statement_scalar(
        &mut self,
        sql: &str,
        timeout: Option<u32>,
    ) -> Result<Option<RowValues>> {
        const OP: &str = "statement_scalar";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = scalar(&mut call, sql, timeout, &parameters).await;
        self.release(call, outcome).await
    }
}

async fn query_set<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    sql: &str,
    timeout: Option<u32>,
    parameters: &ParameterSet,
) -> Result<DataSet> {
    let command = CommandBuilder::statement(sql)
        .timeout(timeout)
        .bind_parameters(parameters)?;
    let conn = call.conn()?;
    let result = timed(timeout, conn.query(&command)).await?;
    Ok(result.data)
}

async fn execute<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    sql: &str,
    timeout: Option<u32>,
    parameters: &ParameterSet,
) -> Result<ExecOutcome> {
    let command = CommandBuilder::statement(sql)
        .timeout(timeout)
        .bind_parameters(parameters)?;
    let conn = call.conn()?;
    timed(timeout, conn.execute(&command)).await
}

async fn insert_returning_id<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    sql: &str,
    timeout: Option<u32>,
    parameters: &ParameterSet,
) -> Result<InsertOutcome> {
    let command = CommandBuilder::statement(sql)
        .timeout(timeout)
        .bind_parameters(parameters)?;
    let conn = call.conn()?;
    let inserted = timed(timeout, conn.execute(&command)).await?;

    let identity = command.follow_up(conn.identity_query());
    let id = timed(timeout, conn.scalar(&identity))
        .await?
        .filter(|v| !v.is_null());

    Ok(InsertOutcome {
        rows_affected: inserted.rows_affected,
        id,
    })
}

async fn scalar<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    sql: &str,
    timeout: Option<u32>,
    parameters: &ParameterSet,
) -> Result<Option<RowValues>> {
    let command = CommandBuilder::statement(sql)
        .timeout(timeout)
        .bind_parameters(parameters)?;
    let conn = call.conn()?;
    timed(timeout, conn.scalar(&command)).await
}
