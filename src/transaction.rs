//! An in-flight transaction: owns its connection until commit or rollback.

use tracing::{debug, warn};

use crate::backend::DbConnection;
use crate::error::{Result, SqlCommandError};
use crate::types::IsolationLevel;

/// Active transaction state held by a [`Session`](crate::engine::Session).
///
/// Both [`commit`](TransactionContext::commit) and
/// [`rollback`](TransactionContext::rollback) consume the context and close the owned
/// connection on every path, so a finished transaction cannot be reused.
pub struct TransactionContext<Conn: DbConnection> {
    conn: Conn,
    name: String,
    isolation: IsolationLevel,
}

impl<Conn: DbConnection> std::fmt::Debug for TransactionContext<Conn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("conn", &"<connection>")
            .field("name", &self.name)
            .field("isolation", &self.isolation)
            .finish()
    }
}

impl<Conn: DbConnection> TransactionContext<Conn> {
    /// Start a transaction on a freshly opened connection.
    ///
    /// On failure the connection is closed before the error is returned, so the caller
    /// never sees a half-open state.
    ///
    /// # Errors
    /// Returns the error raised by the server when starting the transaction.
    pub async fn begin(mut conn: Conn, name: &str, isolation: IsolationLevel) -> Result<Self> {
        match conn.begin(name, isolation).await {
            Ok(()) => {
                debug!(transaction = name, ?isolation, "transaction started");
                Ok(Self {
                    conn,
                    name: name.to_string(),
                    isolation,
                })
            }
            Err(err) => {
                close_quietly(conn, "begin failure").await;
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub(crate) fn connection(&mut self) -> &mut Conn {
        &mut self.conn
    }

    /// Commit, falling back to a rollback when the commit fails.
    ///
    /// # Errors
    /// Returns the commit failure, or the rollback failure if the compensating rollback
    /// also fails. A failure to close the connection after a successful commit is
    /// returned too.
    pub async fn commit(mut self) -> Result<()> {
        let outcome = match self.conn.commit(&self.name).await {
            Ok(()) => {
                debug!(transaction = %self.name, "transaction committed");
                Ok(())
            }
            Err(commit_err) => {
                warn!(transaction = %self.name, error = %commit_err, "commit failed; rolling back");
                match self.conn.rollback(&self.name).await {
                    Ok(()) => Err(commit_err),
                    Err(rollback_err) => {
                        warn!(
                            transaction = %self.name,
                            original = %commit_err,
                            "rollback after failed commit also failed"
                        );
                        Err(rollback_err)
                    }
                }
            }
        };
        self.finish(outcome).await
    }

    /// Roll back the whole transaction.
    ///
    /// # Errors
    /// Returns the rollback failure, or a failure to close the connection.
    pub async fn rollback(mut self) -> Result<()> {
        let outcome = self.conn.rollback(&self.name).await;
        match &outcome {
            Ok(()) => debug!(transaction = %self.name, "transaction rolled back"),
            Err(err) => warn!(transaction = %self.name, error = %err, "rollback failed"),
        }
        self.finish(outcome).await
    }

    /// Compensating rollback after a failed operation. Hands back `original` unless
    /// the rollback itself fails, in which case the rollback error replaces it.
    /// A statement still running from a timed-out call is cancelled first. A failure
    /// to close the connection afterwards is only logged.
    pub(crate) async fn abort_with(mut self, original: SqlCommandError) -> SqlCommandError {
        warn!(
            transaction = %self.name,
            error = %original,
            "operation failed inside transaction; rolling back"
        );
        self.conn.cancel();
        let rolled_back = self.conn.rollback(&self.name).await;
        close_quietly(self.conn, &self.name).await;
        match rolled_back {
            Ok(()) => original,
            Err(secondary) => {
                warn!(
                    original = %original,
                    secondary = %secondary,
                    "compensating rollback failed; reporting the rollback error"
                );
                secondary
            }
        }
    }

    async fn finish(self, outcome: Result<()>) -> Result<()> {
        let name = self.name;
        match outcome {
            Ok(()) => self.conn.close().await,
            Err(err) => {
                close_quietly(self.conn, &name).await;
                Err(err)
            }
        }
    }
}

/// Close a connection on a failure path: the close error is logged, the caller keeps
/// reporting its original failure.
pub(crate) async fn close_quietly<Conn: DbConnection>(conn: Conn, context: &str) {
    if let Err(err) = conn.close().await {
        warn!(context, error = %err, "closing connection after failure also failed");
    }
}
