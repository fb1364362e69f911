//! Execution engine: the per-call lifecycle build → execute → post-process →
//! release → clear, with a compensating rollback on every failure inside a
//! transaction.

mod procedure;
mod scope;
mod statement;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::backend::Connector;
use crate::config::EngineOptions;
use crate::error::{Result, SqlCommandError};
use crate::params::{Parameter, ParameterSet};
use crate::transaction::TransactionContext;
use crate::types::{DatabaseType, IsolationLevel, ParameterDirection, RowValues};

use scope::CallConnection;

/// Immutable half of the data-access layer: a connector plus options.
///
/// ```rust,no_run
/// use sql_command_middleware::prelude::*;
///
/// # async fn demo() -> Result<(), SqlCommandError> {
/// let engine = Engine::with_defaults(SqliteConnector::new("app.db"));
/// let mut session = engine.session();
/// session.add_input("@name", "alice");
/// let inserted = session
///     .statement_insert_returning_id("INSERT INTO users (name) VALUES (@name)", None)
///     .await?;
/// # let _ = inserted;
/// session.close().await
/// # }
/// ```
#[derive(Debug)]
pub struct Engine<C: Connector> {
    connector: C,
    options: EngineOptions,
}

impl<C: Connector> Engine<C> {
    /// # Errors
    /// Returns `SqlCommandError::ConfigError` if `options` fail validation.
    pub fn new(connector: C, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { connector, options })
    }

    #[must_use]
    pub fn with_defaults(connector: C) -> Self {
        Self {
            connector,
            options: EngineOptions::default(),
        }
    }

    /// A fresh session: empty parameter set, no transaction.
    #[must_use]
    pub fn session(&self) -> Session<'_, C> {
        Session {
            engine: self,
            parameters: ParameterSet::new(),
            transaction: None,
            lent: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.connector.database_type()
    }
}

/// Per-scope context: the pending parameters and the optional transaction.
///
/// Every operation takes `&mut self`, so one session can never run two operations at
/// once. Open one session per task instead of sharing one.
///
/// Dropping a session with an active transaction rolls it back and closes its
/// connection on a background task. Call [`close`](Session::close) to roll back and
/// see the outcome.
///
/// If an operation inside a transaction is abandoned (its future dropped by a
/// `select!`, an outer timeout or task abort), the transaction is rolled back in the
/// background and the session refuses further work until
/// [`rollback`](Session::rollback) acknowledges the loss; [`commit`](Session::commit)
/// returns `SqlCommandError::TransactionError`.
pub struct Session<'e, C: Connector> {
    engine: &'e Engine<C>,
    parameters: ParameterSet,
    transaction: Option<TransactionContext<C::Conn>>,
    /// Name of the transaction handed to a call that has not been released yet.
    lent: Option<String>,
}

impl<C: Connector> std::fmt::Debug for Session<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("parameters", &self.parameters)
            .field("transaction", &self.transaction_name())
            .finish()
    }
}

impl<C: Connector> Session<'_, C> {
    /// Queue a parameter for the next execution.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        value: Option<RowValues>,
        direction: ParameterDirection,
    ) -> &mut Self {
        self.parameters.add(name, value, direction);
        self
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: impl Into<RowValues>) -> &mut Self {
        self.parameters.add_input(name, value);
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>, sql_type: impl Into<String>) -> &mut Self {
        self.parameters.add_output(name, sql_type);
        self
    }

    pub fn add_input_output(
        &mut self,
        name: impl Into<String>,
        value: impl Into<RowValues>,
    ) -> &mut Self {
        self.parameters.add_input_output(name, value);
        self
    }

    pub fn push_parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    /// Parameters queued for the next execution.
    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    /// True from a successful begin until commit or rollback, including while an
    /// abandoned transaction waits to be acknowledged.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction_name().is_some()
    }

    #[must_use]
    pub fn transaction_name(&self) -> Option<&str> {
        self.transaction
            .as_ref()
            .map(TransactionContext::name)
            .or(self.lent.as_deref())
    }

    /// Open a dedicated connection and start a named transaction on it.
    ///
    /// `isolation: None` uses the engine's default isolation level.
    ///
    /// # Errors
    /// Returns `SqlCommandError::TransactionError` if a transaction is already active,
    /// or the connection/begin failure. On failure the session stays idle and no
    /// connection is left open.
    pub async fn begin_transaction(
        &mut self,
        name: &str,
        isolation: Option<IsolationLevel>,
    ) -> Result<()> {
        if let Some(active) = self.transaction_name() {
            return Err(SqlCommandError::TransactionError(format!(
                "transaction '{active}' is already active; commit or roll it back before starting '{name}'"
            )));
        }
        if name.trim().is_empty() {
            return Err(SqlCommandError::TransactionError(
                "transaction name must not be empty".to_string(),
            ));
        }
        let isolation = isolation.unwrap_or(self.engine.options.default_isolation);
        let conn = self.engine.connector.open().await?;
        let tx = TransactionContext::begin(conn, name, isolation).await?;
        self.transaction = Some(tx);
        Ok(())
    }

    /// Commit the active transaction; a no-op when idle.
    ///
    /// The session ends idle with its parameters cleared whatever the outcome.
    ///
    /// # Errors
    /// Returns the commit failure (after a compensating rollback), or the rollback
    /// failure if that also fails. Returns `SqlCommandError::TransactionError` when an
    /// operation of the transaction was abandoned, since nothing can be committed.
    pub async fn commit(&mut self) -> Result<()> {
        self.parameters.clear();
        if let Some(name) = self.lent.take() {
            return Err(SqlCommandError::TransactionError(format!(
                "transaction '{name}' was abandoned mid-call and rolled back; nothing was committed"
            )));
        }
        match self.transaction.take() {
            Some(tx) => tx.commit().await,
            None => {
                debug!("commit requested with no active transaction");
                Ok(())
            }
        }
    }

    /// Roll back the active transaction; a no-op when idle.
    ///
    /// # Errors
    /// Returns the rollback failure. The session still ends idle.
    pub async fn rollback(&mut self) -> Result<()> {
        self.parameters.clear();
        if let Some(name) = self.lent.take() {
            debug!(transaction = %name, "abandoned transaction already rolled back");
            return Ok(());
        }
        match self.transaction.take() {
            Some(tx) => tx.rollback().await,
            None => {
                debug!("rollback requested with no active transaction");
                Ok(())
            }
        }
    }

    /// Release everything the session holds, rolling back an active transaction.
    ///
    /// # Errors
    /// Returns the rollback failure, if any.
    pub async fn close(mut self) -> Result<()> {
        self.rollback().await
    }

    fn effective_timeout(&self, timeout: Option<u32>) -> Option<u32> {
        timeout.or(self.engine.options.default_timeout)
    }

    /// Hand out the connection for one call: the transaction's if one is active,
    /// otherwise a new one.
    async fn acquire(&mut self, operation: &'static str) -> Result<CallConnection<C::Conn>> {
        if let Some(name) = &self.lent {
            return Err(SqlCommandError::TransactionError(format!(
                "transaction '{name}' was abandoned mid-call; roll it back before running {operation}"
            )));
        }
        if let Some(tx) = self.transaction.take() {
            debug!(operation, transaction = tx.name(), "using transaction connection");
            self.lent = Some(tx.name().to_string());
            return Ok(CallConnection::transaction(operation, tx));
        }
        debug!(operation, "opening connection");
        let conn = self.engine.connector.open().await?;
        Ok(CallConnection::owned(operation, conn))
    }

    async fn release<T>(&mut self, call: CallConnection<C::Conn>, outcome: Result<T>) -> Result<T> {
        let (result, tx) = call.finish(outcome).await;
        self.lent = None;
        self.transaction = tx;
        result
    }
}

impl<C: Connector> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if let Some(name) = &self.lent {
            warn!(transaction = %name, "session dropped after abandoning its transaction");
        }
        let Some(tx) = self.transaction.take() else {
            return;
        };
        warn!(
            transaction = tx.name(),
            "session dropped with an active transaction; rolling back"
        );
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = tx.rollback().await {
                    warn!(error = %err, "rollback of dropped session's transaction failed");
                }
            });
        }
    }
}
