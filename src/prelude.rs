//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so callers can get started
//! with a single `use`.

pub use crate::backend::{Connector, DbConnection};
pub use crate::command::{CommandBuilder, CommandKind, CommandSpec, ProcedureParameter};
pub use crate::config::{EngineOptions, ErrorParmNames};
pub use crate::engine::{Engine, Session};
pub use crate::error::SqlCommandError;
pub use crate::params::{Parameter, ParameterSet};
pub use crate::results::{
    CustomDbRow, DataSet, ErrorParms, ExecOutcome, InsertOutcome, OutputParameters,
    ProcedureOutcome, ResultSet,
};
pub use crate::types::{DatabaseType, IsolationLevel, ParameterDirection, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlConnector, MssqlOptions};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnector, SqliteOptions};
