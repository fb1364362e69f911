//! The seam between the engine and a concrete database client.

use async_trait::async_trait;

use crate::command::{CommandSpec, ProcedureParameter};
use crate::error::Result;
use crate::results::{ExecOutcome, QueryOutcome};
use crate::types::{DatabaseType, IsolationLevel, RowValues};

/// Opens fresh, exclusively owned connections.
///
/// The connection string (or equivalent) lives in the connector and never changes.
/// Pooling, if any, is the driver's business.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: DbConnection;

    /// Open and authenticate a new connection.
    ///
    /// # Errors
    /// Returns `SqlCommandError::ConnectionError` (or a backend error) when the
    /// connection cannot be established.
    async fn open(&self) -> Result<Self::Conn>;

    fn database_type(&self) -> DatabaseType;
}

/// One live connection. Every method runs a single round trip to completion.
///
/// Connections are `'static` so an abandoned call can be cleaned up on a spawned task.
#[async_trait]
pub trait DbConnection: Send + Sized + 'static {
    /// Run a cursor-producing command and materialize every result set, then capture
    /// OUTPUT/RETURN-VALUE parameters.
    ///
    /// # Errors
    /// Returns an error if execution or materialization fails.
    async fn query(&mut self, command: &CommandSpec) -> Result<QueryOutcome>;

    /// Run a command for its side effects.
    ///
    /// # Errors
    /// Returns an error if execution fails.
    async fn execute(&mut self, command: &CommandSpec) -> Result<ExecOutcome>;

    /// First column of the first row of the first result set.
    ///
    /// # Errors
    /// Returns an error if execution fails.
    async fn scalar(&mut self, command: &CommandSpec) -> Result<Option<RowValues>> {
        let outcome = self.query(command).await?;
        Ok(outcome
            .data
            .tables
            .into_iter()
            .next()
            .and_then(|table| table.first_value().cloned()))
    }

    /// Ask the server for a procedure's formal parameters, RETURN-VALUE slot first.
    ///
    /// # Errors
    /// Returns `SqlCommandError::CommandError` when the procedure does not exist, or the
    /// underlying error if the metadata round trip fails.
    async fn derive_parameters(&mut self, procedure: &str) -> Result<Vec<ProcedureParameter>>;

    /// Statement returning the last identity value generated on this connection.
    fn identity_query(&self) -> &'static str;

    /// # Errors
    /// Returns an error if the server refuses to start the transaction.
    async fn begin(&mut self, name: &str, isolation: IsolationLevel) -> Result<()>;

    /// # Errors
    /// Returns an error if the commit fails.
    async fn commit(&mut self, name: &str) -> Result<()>;

    /// Roll back to the savepoint called `name`, which is the transaction itself.
    ///
    /// # Errors
    /// Returns an error if the rollback fails.
    async fn rollback(&mut self, name: &str) -> Result<()>;

    /// Stop a statement still running on this connection for a call that was given
    /// up on, so a following rollback does not wait behind it. Does nothing by
    /// default.
    fn cancel(&self) {}

    /// Close the connection. Consumes it so it can only happen once.
    ///
    /// # Errors
    /// Returns an error if the close handshake fails; the connection is gone either way.
    async fn close(self) -> Result<()>;
}
