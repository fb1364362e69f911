use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use super::row::{CustomDbRow, index_columns};
use crate::types::RowValues;

/// Name and backend type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Backend type name, e.g. `Int4` for SQL Server or the declared type for `SQLite`.
    /// Empty when the backend cannot tell.
    pub type_name: String,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A result set from a database query
///
/// This struct represents one fully materialized cursor: column metadata plus
/// row-major values.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// The number of rows materialized
    pub rows_affected: usize,
    columns: Vec<ColumnInfo>,
    /// Column names shared by all rows (to avoid duplicating in each row)
    column_names: Option<Arc<Vec<String>>>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Set the column metadata for this result set (shared by all rows)
    pub fn set_columns(&mut self, columns: Vec<ColumnInfo>) {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        self.column_index_cache = Arc::new(index_columns(&names));
        self.column_names = Some(Arc::new(names));
        self.columns = columns;
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Add a row to the result set. Ignored until the columns are known.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let Some(column_names) = &self.column_names {
            self.results.push(CustomDbRow {
                column_names: Arc::clone(column_names),
                rows: row_values,
                column_index_cache: Arc::clone(&self.column_index_cache),
            });
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// First column of the first row, if any row exists.
    #[must_use]
    pub fn first_value(&self) -> Option<&RowValues> {
        self.results.first().and_then(|row| row.get_by_index(0))
    }

    /// Rows as JSON objects keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let rows = self
            .results
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (name, value) in row.column_names.iter().zip(row.rows.iter()) {
                    obj.insert(name.clone(), value.to_json());
                }
                JsonValue::Object(obj)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

/// Every result set produced by one command, in order.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub tables: Vec<ResultSet>,
}

impl DataSet {
    #[must_use]
    pub fn new(tables: Vec<ResultSet>) -> Self {
        Self { tables }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The first table, or an empty one when the command produced none.
    #[must_use]
    pub fn into_first(self) -> ResultSet {
        self.tables.into_iter().next().unwrap_or_default()
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.tables.iter().map(ResultSet::to_json).collect())
    }
}
