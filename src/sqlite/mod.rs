//! `SQLite` backend on rusqlite.
//!
//! Statements only: stored procedures and output parameters are reported as
//! unsupported. Each statement text must hold a single SQL statement.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SqliteConnector, SqliteOptions, SqliteOptionsBuilder};
pub use connection::{SharedSqliteConnection, SqliteConnection};
