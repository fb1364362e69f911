//! Procedure signature discovery from the `sys.parameters` catalog.

use tracing::debug;

use super::client::MssqlClient;
use crate::command::ProcedureParameter;
use crate::error::{Result, SqlCommandError};
use crate::types::ParameterDirection;

const OBJECT_ID_SQL: &str = "SELECT OBJECT_ID(@P1)";

const PARAMETERS_SQL: &str = "SELECT p.name, p.is_output, TYPE_NAME(p.user_type_id), \
     p.max_length, p.precision, p.scale \
     FROM sys.parameters AS p \
     WHERE p.object_id = @P1 AND p.parameter_id > 0 \
     ORDER BY p.parameter_id";

pub(crate) async fn derive_parameters(
    client: &mut MssqlClient,
    procedure: &str,
) -> Result<Vec<ProcedureParameter>> {
    let name = procedure.trim();
    let object_id = client
        .query(OBJECT_ID_SQL, &[&name])
        .await
        .map_err(metadata_error)?
        .into_row()
        .await
        .map_err(metadata_error)?
        .and_then(|row| row.try_get::<i32, _>(0).ok().flatten())
        .ok_or_else(|| {
            SqlCommandError::CommandError(format!("stored procedure {name} not found"))
        })?;

    let rows = client
        .query(PARAMETERS_SQL, &[&object_id])
        .await
        .map_err(metadata_error)?
        .into_first_result()
        .await
        .map_err(metadata_error)?;

    let mut parameters = Vec::with_capacity(rows.len() + 1);
    parameters.push(ProcedureParameter::return_value());
    for row in &rows {
        let param_name: &str = row.try_get(0).map_err(metadata_error)?.unwrap_or_default();
        let is_output: bool = row.try_get(1).map_err(metadata_error)?.unwrap_or(false);
        let type_name: &str = row.try_get(2).map_err(metadata_error)?.unwrap_or_default();
        let max_length: i16 = row.try_get(3).map_err(metadata_error)?.unwrap_or(-1);
        let precision: u8 = row.try_get(4).map_err(metadata_error)?.unwrap_or(0);
        let scale: u8 = row.try_get(5).map_err(metadata_error)?.unwrap_or(0);

        let direction = if is_output {
            ParameterDirection::InputOutput
        } else {
            ParameterDirection::Input
        };
        parameters.push(ProcedureParameter::new(
            param_name,
            direction,
            Some(declared_type(type_name, max_length, precision, scale)),
        ));
    }
    debug!(procedure = name, count = parameters.len(), "derived procedure parameters");
    Ok(parameters)
}

/// Rebuild a declarable type from catalog columns, e.g. `nvarchar(50)` or `decimal(9,2)`.
fn declared_type(type_name: &str, max_length: i16, precision: u8, scale: u8) -> String {
    let lower = type_name.to_ascii_lowercase();
    match lower.as_str() {
        "nvarchar" | "nchar" => {
            if max_length < 0 {
                format!("{lower}(max)")
            } else {
                format!("{lower}({})", (max_length / 2).max(1))
            }
        }
        "varchar" | "char" | "varbinary" | "binary" => {
            if max_length < 0 {
                format!("{lower}(max)")
            } else {
                format!("{lower}({max_length})")
            }
        }
        "decimal" | "numeric" => format!("{lower}({precision},{scale})"),
        "datetime2" | "time" | "datetimeoffset" => format!("{lower}({scale})"),
        _ => type_name.to_string(),
    }
}

fn metadata_error(e: tiberius::error::Error) -> SqlCommandError {
    SqlCommandError::ExecutionError(format!("SQL Server metadata lookup failed: {e}"))
}
