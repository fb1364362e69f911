//! Caller-declared parameters accumulated between executions.

use crate::types::{ParameterDirection, RowValues};

/// One named parameter.
///
/// `value: None` means "no value supplied" (typical for pure OUTPUT slots) and is kept
/// distinct from `Some(RowValues::Null)`. Both are bound as an explicit database null.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Option<RowValues>,
    pub direction: ParameterDirection,
    /// Server type used when the backend has to declare the parameter, e.g. `int`
    /// or `nvarchar(200)`. Inferred from the value when absent.
    pub sql_type: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: Option<RowValues>,
        direction: ParameterDirection,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            direction,
            sql_type: None,
        }
    }

    #[must_use]
    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    /// The value to put on the wire: absent values become an explicit null.
    #[must_use]
    pub fn bind_value(&self) -> RowValues {
        self.value.clone().unwrap_or(RowValues::Null)
    }

    /// Name without the leading `@`, `:` or `$` sigil.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }
}

/// Strip the placeholder sigil from a parameter name.
#[must_use]
pub fn bare_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$'])
}

/// Compare two parameter names the way SQL Server does: sigil-agnostic, ASCII
/// case-insensitive.
#[must_use]
pub fn same_name(a: &str, b: &str) -> bool {
    bare_name(a).eq_ignore_ascii_case(bare_name(b))
}

/// Ordered collection of parameters, consumed by the next execution.
///
/// No uniqueness check happens here; a duplicate name is reported by the backend
/// when the command runs (SQL Server refuses the second declaration, `SQLite`
/// refuses a second bind to one placeholder).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: Option<RowValues>,
        direction: ParameterDirection,
    ) -> &mut Self {
        self.parameters.push(Parameter::new(name, value, direction));
        self
    }

    /// Append an already built parameter (keeps its explicit SQL type).
    pub fn push(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: impl Into<RowValues>) -> &mut Self {
        self.add(name, Some(value.into()), ParameterDirection::Input)
    }

    /// Declare an OUTPUT slot of the given server type.
    pub fn add_output(&mut self, name: impl Into<String>, sql_type: impl Into<String>) -> &mut Self {
        self.push(Parameter::new(name, None, ParameterDirection::Output).with_sql_type(sql_type))
    }

    pub fn add_input_output(
        &mut self,
        name: impl Into<String>,
        value: impl Into<RowValues>,
    ) -> &mut Self {
        self.add(name, Some(value.into()), ParameterDirection::InputOutput)
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
    }

    /// Move the accumulated parameters out, leaving the set empty.
    pub fn take(&mut self) -> ParameterSet {
        std::mem::take(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Parameter] {
        &self.parameters
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

impl IntoIterator for ParameterSet {
    type Item = Parameter;
    type IntoIter = std::vec::IntoIter<Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.into_iter()
    }
}
