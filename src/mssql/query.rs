use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::{Column, ColumnData, FromSql, QueryItem, QueryStream, Row};

use super::batch::{ROWCOUNT_COLUMN, RenderedBatch};
use crate::error::{Result, SqlCommandError};
use crate::results::{ColumnInfo, DataSet, OutputParameters, ResultSet};
use crate::types::RowValues;

/// Drain a query stream, one [`ResultSet`] per metadata token.
pub(crate) async fn collect_sets(mut stream: QueryStream<'_>) -> Result<DataSet> {
    let mut data = DataSet::default();
    let mut current: Option<ResultSet> = None;

    while let Some(item) = stream.try_next().await.map_err(fetch_error)? {
        match item {
            QueryItem::Metadata(meta) => {
                if let Some(done) = current.take() {
                    data.tables.push(done);
                }
                let mut set = ResultSet::with_capacity(16);
                set.set_columns(meta.columns().iter().map(column_info).collect());
                current = Some(set);
            }
            QueryItem::Row(row) => {
                if let Some(set) = current.as_mut() {
                    set.add_row_values(convert_row(&row)?);
                }
            }
        }
    }
    if let Some(done) = current {
        data.tables.push(done);
    }
    Ok(data)
}

/// Split the trailing output `SELECT` off a batch's result sets.
///
/// Returns the output values and the captured `@@ROWCOUNT`.
pub(crate) fn take_outputs(
    batch: &RenderedBatch,
    data: &mut DataSet,
) -> Result<(OutputParameters, usize)> {
    let mut outputs = OutputParameters::new();
    if !batch.has_outputs() {
        return Ok((outputs, 0));
    }
    let table = data.tables.pop().ok_or_else(|| {
        SqlCommandError::ExecutionError("output parameters were not returned".to_string())
    })?;
    let row = table.results.first().ok_or_else(|| {
        SqlCommandError::ExecutionError("output parameter row is empty".to_string())
    })?;

    for (idx, name) in batch.outputs.iter().enumerate() {
        let value = row.get_by_index(idx).cloned().unwrap_or(RowValues::Null);
        outputs.insert(name.clone(), value);
    }
    let rows = row
        .get(ROWCOUNT_COLUMN)
        .and_then(RowValues::as_int)
        .map_or(0, |n| usize::try_from(*n).unwrap_or(0));
    Ok((outputs, rows))
}

fn column_info(col: &Column) -> ColumnInfo {
    ColumnInfo::new(col.name(), format!("{:?}", col.column_type()))
}

fn convert_row(row: &Row) -> Result<Vec<RowValues>> {
    let mut values = Vec::with_capacity(row.len());
    for (_, data) in row.cells() {
        values.push(convert_cell(data)?);
    }
    Ok(values)
}

#[allow(clippy::cast_precision_loss)]
fn convert_cell(data: &ColumnData<'static>) -> Result<RowValues> {
    let value = match data {
        ColumnData::U8(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I16(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I32(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|n| RowValues::Float(f64::from(n))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            match (n.scale(), i64::try_from(n.value())) {
                (0, Ok(i)) => RowValues::Int(i),
                _ => RowValues::Float(n.value() as f64 / 10f64.powi(i32::from(n.scale()))),
            }
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| RowValues::Text(xml.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(fetch_error)?
                .map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(fetch_error)?
            .map(|d| RowValues::Text(d.format("%Y-%m-%d").to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(fetch_error)?
            .map(|t| RowValues::Text(t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(fetch_error)?
            .map(|dt| RowValues::Text(dt.to_rfc3339())),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

fn fetch_error(e: tiberius::error::Error) -> SqlCommandError {
    SqlCommandError::ExecutionError(format!("SQL Server row fetch error: {e}"))
}
