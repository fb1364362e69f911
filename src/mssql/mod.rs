//! SQL Server backend on tiberius.
//!
//! - config: connector and connection settings
//! - client: TCP connect and login
//! - batch: renders commands into T-SQL with named and OUTPUT parameters
//! - params: binds values to `@P1..@Pn`
//! - query: result-set and output materialization
//! - metadata: stored procedure signature discovery

mod batch;
pub mod client;
pub mod config;
mod connection;
mod metadata;
mod params;
mod query;

pub use client::{MssqlClient, connect};
pub use config::{MssqlConnector, MssqlOptions, MssqlOptionsBuilder};
pub use connection::MssqlConnection;
