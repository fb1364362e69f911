//! Command construction and transactional resource lifecycle for SQL Server
//! (tiberius) and `SQLite` (rusqlite).
//!
//! An [`Engine`] pairs a [`Connector`] with [`EngineOptions`]. Each [`Session`]
//! queues named parameters, runs statements or stored procedures, and either opens
//! a connection per call or reuses the one held by an explicit transaction. Any
//! failure inside a transaction rolls it back before the error is returned.

pub mod backend;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod prelude;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{Connector, DbConnection};
pub use command::{CommandBuilder, CommandKind, CommandSpec, ProcedureParameter, RETURN_VALUE_NAME};
pub use config::{EngineOptions, EngineOptionsBuilder, ErrorParmNames};
pub use engine::{Engine, Session};
pub use error::SqlCommandError;
pub use params::{Parameter, ParameterSet};
pub use results::{
    ColumnInfo, CustomDbRow, DataSet, ErrorParms, ExecOutcome, InsertOutcome, OutputParameters,
    ProcedureOutcome, QueryOutcome, ResultSet,
};
pub use transaction::TransactionContext;
pub use types::{DatabaseType, IsolationLevel, ParameterDirection, RowValues};

#[cfg(feature = "mssql")]
pub use mssql::{MssqlConnection, MssqlConnector, MssqlOptions};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteConnector, SqliteOptions};
