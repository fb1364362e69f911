use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::backend::DbConnection;
use crate::error::{Result, SqlCommandError};
use crate::transaction::{TransactionContext, close_quietly};

enum Slot<Conn: DbConnection> {
    Owned(Conn),
    Transaction(TransactionContext<Conn>),
}

/// The connection one call runs on.
///
/// A call either owns a short-lived connection or holds the transaction's for its
/// duration. [`Session::release`](super::Session) decides what happens to it
/// afterwards. If the call's future is dropped before that, the connection is
/// released in the background: an owned one is closed, a transaction is rolled back.
pub(crate) struct CallConnection<Conn: DbConnection> {
    operation: &'static str,
    slot: Option<Slot<Conn>>,
}

impl<Conn: DbConnection> CallConnection<Conn> {
    pub(crate) fn owned(operation: &'static str, conn: Conn) -> Self {
        Self {
            operation,
            slot: Some(Slot::Owned(conn)),
        }
    }

    pub(crate) fn transaction(operation: &'static str, tx: TransactionContext<Conn>) -> Self {
        Self {
            operation,
            slot: Some(Slot::Transaction(tx)),
        }
    }

    /// # Errors
    /// Returns `SqlCommandError::Other` once the call has been finished.
    pub(crate) fn conn(&mut self) -> Result<&mut Conn> {
        match self.slot.as_mut() {
            Some(Slot::Owned(conn)) => Ok(conn),
            Some(Slot::Transaction(tx)) => Ok(tx.connection()),
            None => Err(SqlCommandError::Other(format!(
                "{}: connection already released",
                self.operation
            ))),
        }
    }

    /// End the call.
    ///
    /// Success: an owned connection is closed, a transaction is handed back to the
    /// session. Failure: an owned connection is closed and the error returned as is; a
    /// transaction is rolled back and closed first.
    pub(crate) async fn finish<T>(
        mut self,
        outcome: Result<T>,
    ) -> (Result<T>, Option<TransactionContext<Conn>>) {
        let operation = self.operation;
        let Some(slot) = self.slot.take() else {
            return (outcome, None);
        };
        match (slot, outcome) {
            (Slot::Transaction(tx), Ok(value)) => {
                debug!(operation, transaction = tx.name(), "call completed in transaction");
                (Ok(value), Some(tx))
            }
            (Slot::Transaction(tx), Err(err)) => (Err(tx.abort_with(err).await), None),
            (Slot::Owned(conn), Ok(value)) => {
                debug!(operation, "call completed; closing connection");
                (conn.close().await.map(|()| value), None)
            }
            (Slot::Owned(conn), Err(err)) => {
                debug!(operation, error = %err, "call failed; closing connection");
                close_quietly(conn, operation).await;
                (Err(err), None)
            }
        }
    }
}

impl<Conn: DbConnection> Drop for CallConnection<Conn> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let operation = self.operation;
        warn!(operation, "call abandoned before completion; releasing its connection");
        let Ok(handle) = Handle::try_current() else {
            warn!(operation, "no tokio runtime; connection dropped without cleanup");
            return;
        };
        handle.spawn(async move {
            match slot {
                Slot::Owned(conn) => close_quietly(conn, operation).await,
                Slot::Transaction(mut tx) => {
                    tx.connection().cancel();
                    if let Err(err) = tx.rollback().await {
                        warn!(operation, error = %err, "rollback of abandoned transaction failed");
                    }
                }
            }
        });
    }
}

/// Run `fut`, failing with an execution error once `timeout` seconds pass.
pub(crate) async fn timed<T, F>(timeout: Option<u32>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => fut.await,
        Some(secs) => tokio::time::timeout(Duration::from_secs(u64::from(secs)), fut)
            .await
            .map_err(|_| {
                SqlCommandError::ExecutionError(format!("command timed out after {secs}s"))
            })?,
    }
}
