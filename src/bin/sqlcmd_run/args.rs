use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sql_command_middleware::{DatabaseType, RowValues};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one SQL command or stored procedure and print JSON")]
pub(crate) struct Args {
    #[arg(long, value_enum)]
    pub(crate) backend: DatabaseType,
    /// ADO connection string for SQL Server, database path for SQLite.
    #[arg(long)]
    pub(crate) connection: String,
    /// JSON file with engine options.
    #[arg(long)]
    pub(crate) options: Option<PathBuf>,
    /// Command timeout in seconds.
    #[arg(long)]
    pub(crate) timeout: Option<u32>,
    /// Input parameter as `name=value`; may repeat.
    #[arg(long = "param", value_parser = parse_param)]
    pub(crate) params: Vec<(String, RowValues)>,
    /// Output parameter as `name:sqltype`; may repeat.
    #[arg(long = "out", value_parser = parse_output)]
    pub(crate) outputs: Vec<(String, String)>,
    /// Run inside a transaction with this name and commit on success.
    #[arg(long)]
    pub(crate) transaction: Option<String>,
    #[arg(long, short)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Every result set of a statement.
    Query { sql: String },
    /// Affected rows and output parameters of a statement.
    Exec { sql: String },
    /// Run an insert and fetch the generated identity.
    Insert { sql: String },
    /// First column of the first row.
    Scalar { sql: String },
    /// Call a stored procedure with positional arguments.
    Proc {
        name: String,
        #[arg(value_parser = parse_literal_arg)]
        args: Vec<RowValues>,
        /// Also read the return-code/return-message parameters.
        #[arg(long)]
        error_parms: bool,
    },
    /// Call a stored procedure with the `--param`/`--out` parameters.
    ProcOutput {
        name: String,
        #[arg(long)]
        error_parms: bool,
    },
}

fn parse_param(raw: &str) -> Result<(String, RowValues), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    if name.trim().is_empty() {
        return Err("parameter name is empty".to_string());
    }
    Ok((name.trim().to_string(), parse_literal(value)))
}

fn parse_output(raw: &str) -> Result<(String, String), String> {
    let (name, sql_type) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected name:sqltype, got {raw:?}"))?;
    if name.trim().is_empty() || sql_type.trim().is_empty() {
        return Err(format!("expected name:sqltype, got {raw:?}"));
    }
    Ok((name.trim().to_string(), sql_type.trim().to_string()))
}

#[allow(clippy::unnecessary_wraps)]
fn parse_literal_arg(raw: &str) -> Result<RowValues, String> {
    Ok(parse_literal(raw))
}

/// `null`, booleans and numbers are typed; single quotes force text.
pub(crate) fn parse_literal(raw: &str) -> RowValues {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return RowValues::Text(raw[1..raw.len() - 1].to_string());
    }
    if raw.eq_ignore_ascii_case("null") {
        return RowValues::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return RowValues::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return RowValues::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return RowValues::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return RowValues::Float(f);
        }
    }
    RowValues::Text(raw.to_string())
}
