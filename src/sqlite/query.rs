use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::Result;
use crate::results::{ColumnInfo, ResultSet};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `SqlCommandError::SqliteError` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<RowValues> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Step an already bound statement to completion and materialize its rows.
///
/// Column types are the declared types, empty for expressions.
pub(crate) fn build_result_set(stmt: &mut Statement<'_>) -> Result<ResultSet> {
    let columns: Vec<ColumnInfo> = stmt
        .columns()
        .iter()
        .map(|c| ColumnInfo::new(c.name(), c.decl_type().unwrap_or_default()))
        .collect();
    let col_count = columns.len();

    let mut result_set = ResultSet::with_capacity(16);
    result_set.set_columns(columns);

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}
