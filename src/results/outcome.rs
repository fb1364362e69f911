use crate::error::{Result, SqlCommandError};
use crate::params::same_name;
use crate::types::RowValues;

use super::result_set::DataSet;

/// Values the server wrote back into OUTPUT, INPUT/OUTPUT and RETURN-VALUE parameters.
///
/// Lookups ignore the `@` sigil and ASCII case, matching SQL Server's parameter naming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputParameters {
    values: Vec<(String, RowValues)>,
}

impl OutputParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RowValues) {
        let name = name.into();
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| same_name(n, &name)) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RowValues> {
        self.values
            .iter()
            .find(|(n, _)| same_name(n, name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// The procedure's RETURN value, when one was captured.
    #[must_use]
    pub fn return_value(&self) -> Option<&RowValues> {
        self.get(crate::command::RETURN_VALUE_NAME)
    }

    /// Read the two well-known error-signaling parameters.
    ///
    /// Both values are reported as the procedure left them. A procedure that never
    /// assigned them is not a success, so NULL is refused rather than read as `0`/`""`.
    ///
    /// # Errors
    /// Returns `SqlCommandError::ParameterError` if either parameter is missing from the
    /// executed command, is NULL, or holds a value of the wrong type.
    pub fn error_parms(&self, return_code: &str, return_message: &str) -> Result<ErrorParms> {
        let code = self.get(return_code).ok_or_else(|| {
            SqlCommandError::ParameterError(format!(
                "procedure has no parameter named {return_code}"
            ))
        })?;
        let message = self.get(return_message).ok_or_else(|| {
            SqlCommandError::ParameterError(format!(
                "procedure has no parameter named {return_message}"
            ))
        })?;

        let return_code_value = match code {
            RowValues::Int(i) => i32::try_from(*i).map_err(|e| {
                SqlCommandError::ParameterError(format!("{return_code} out of range: {e}"))
            })?,
            RowValues::Null => return Err(unset(return_code)),
            other => {
                return Err(SqlCommandError::ParameterError(format!(
                    "{return_code} is not an integer: {other:?}"
                )));
            }
        };
        let return_message_value = match message {
            RowValues::Text(s) => s.clone(),
            RowValues::Null => return Err(unset(return_message)),
            other => {
                return Err(SqlCommandError::ParameterError(format!(
                    "{return_message} is not text: {other:?}"
                )));
            }
        };

        Ok(ErrorParms {
            return_code: return_code_value,
            return_message: return_message_value,
        })
    }
}

fn unset(name: &str) -> SqlCommandError {
    SqlCommandError::ParameterError(format!("procedure left {name} NULL"))
}

/// Structured error signaling reported by a procedure through two OUTPUT parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorParms {
    pub return_code: i32,
    pub return_message: String,
}

impl ErrorParms {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// What a backend returns for a cursor-producing command.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub data: DataSet,
    pub outputs: OutputParameters,
}

/// What a backend returns for a non-query command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub rows_affected: usize,
    pub outputs: OutputParameters,
}

/// Result of an insert that also fetched the connection's last identity value.
///
/// The identity is connection scoped (`@@IDENTITY` / `last_insert_rowid()`): an insert
/// fired by a trigger on the same connection wins over the caller's insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub rows_affected: usize,
    pub id: Option<RowValues>,
}

/// Result of a procedure call.
#[derive(Debug, Clone, Default)]
pub struct ProcedureOutcome {
    pub rows_affected: usize,
    pub outputs: OutputParameters,
    /// Populated by the `_with_error_parms` variants.
    pub error_parms: Option<ErrorParms>,
}
