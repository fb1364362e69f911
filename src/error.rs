use thiserror::Error;

/// Every failure surfaced by the engine.
///
/// The engine never downgrades or swallows one of these; at most it rolls back an
/// active transaction before handing the error back unchanged.
#[derive(Debug, Error)]
pub enum SqlCommandError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Cannot open or authenticate a connection.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Command construction failed (bad timeout, unknown procedure, ...).
    #[error("Command construction error: {0}")]
    CommandError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Execution failed, including an exceeded command timeout.
    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// Commit/rollback/begin attempted against an inconsistent transaction state.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

/// Shorthand used across the crate.
pub type Result<T, E = SqlCommandError> = std::result::Result<T, E>;

impl From<serde_json::Error> for SqlCommandError {
    fn from(err: serde_json::Error) -> Self {
        SqlCommandError::ConfigError(format!("invalid options document: {err}"))
    }
}
