use rusqlite::Statement;
use rusqlite::types::Value;
use tracing::debug;

use crate::error::{Result, SqlCommandError};
use crate::params::{Parameter, bare_name};
use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Bind parameters by name onto a prepared statement.
///
/// A parameter matches `:name`, `@name` or `$name` in the SQL, whatever sigil the
/// caller used. Parameters the statement never mentions are skipped; placeholders
/// nobody supplied stay NULL.
///
/// # Errors
/// Returns `SqlCommandError::ParameterError` for OUTPUT or RETURN-VALUE parameters,
/// which `SQLite` cannot honour, and for two parameters landing on one placeholder.
pub(crate) fn bind_named(stmt: &mut Statement<'_>, parameters: &[Parameter]) -> Result<()> {
    let mut bound: Vec<(usize, &str)> = Vec::with_capacity(parameters.len());
    for p in parameters {
        if p.direction.is_output() {
            return Err(SqlCommandError::ParameterError(format!(
                "SQLite has no output parameters ({} is {:?})",
                p.name, p.direction
            )));
        }
        let bare = bare_name(&p.name);
        let mut index = None;
        for sigil in [':', '@', '$'] {
            index = stmt.parameter_index(&format!("{sigil}{bare}"))?;
            if index.is_some() {
                break;
            }
        }
        match index {
            Some(idx) => {
                if let Some((_, first)) = bound.iter().find(|(i, _)| *i == idx) {
                    return Err(SqlCommandError::ParameterError(format!(
                        "parameter {} binds the same placeholder as {first}",
                        p.name
                    )));
                }
                stmt.raw_bind_parameter(idx, row_value_to_sqlite_value(&p.bind_value()))?;
                bound.push((idx, &p.name));
            }
            None => debug!(parameter = %p.name, "parameter not referenced by statement"),
        }
    }
    Ok(())
}
