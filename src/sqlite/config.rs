use std::time::Duration;

use async_trait::async_trait;

use super::connection::SqliteConnection;
use crate::backend::Connector;
use crate::error::{Result, SqlCommandError};
use crate::types::DatabaseType;

/// Options for opening `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// File path, or `:memory:` for a private in-memory database per connection.
    pub db_path: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Option<Duration>,
    /// Switch the file to write-ahead logging on open.
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            busy_timeout: Some(Duration::from_secs(5)),
            wal: false,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    #[must_use]
    pub fn build(self) -> SqliteConnector {
        SqliteConnector::from_options(self.finish())
    }
}

/// Opens a fresh `rusqlite` connection to one database file per call.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    opts: SqliteOptions,
}

impl SqliteConnector {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self::from_options(SqliteOptions::new(db_path.into()))
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path.into())
    }

    #[must_use]
    pub fn from_options(opts: SqliteOptions) -> Self {
        Self { opts }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.opts
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Conn = SqliteConnection;

    async fn open(&self) -> Result<SqliteConnection> {
        let opts = self.opts.clone();
        let conn = tokio::task::spawn_blocking(move || open_sync(&opts))
            .await
            .map_err(|e| {
                SqlCommandError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
        Ok(SqliteConnection::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }
}

fn open_sync(opts: &SqliteOptions) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(&opts.db_path).map_err(|e| {
        SqlCommandError::ConnectionError(format!("cannot open {}: {e}", opts.db_path))
    })?;
    if let Some(timeout) = opts.busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    if opts.wal {
        // journal_mode returns the new mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    Ok(conn)
}
