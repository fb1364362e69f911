//! Command construction: turns statement text or a procedure name plus caller
//! parameters into an immutable [`CommandSpec`].

use crate::error::{Result, SqlCommandError};
use crate::params::{Parameter, ParameterSet};
use crate::types::{ParameterDirection, RowValues};

/// Name of the synthetic slot that receives a procedure's RETURN value.
pub const RETURN_VALUE_NAME: &str = "@RETURN_VALUE";

/// Whether the command text is SQL or the name of a stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Statement,
    StoredProcedure,
}

/// A formal parameter reported by the server for a stored procedure.
///
/// The first entry of a discovered list is always the RETURN-VALUE slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureParameter {
    pub name: String,
    pub direction: ParameterDirection,
    pub sql_type: Option<String>,
}

impl ProcedureParameter {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        direction: ParameterDirection,
        sql_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            sql_type,
        }
    }

    /// The RETURN-VALUE slot every discovered list starts with.
    #[must_use]
    pub fn return_value() -> Self {
        Self::new(
            RETURN_VALUE_NAME,
            ParameterDirection::ReturnValue,
            Some("int".to_string()),
        )
    }
}

/// A fully configured command, ready to run on a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    kind: CommandKind,
    text: String,
    timeout: Option<u32>,
    parameters: Vec<Parameter>,
}

impl CommandSpec {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Timeout in seconds; `None` leaves the server/driver default in place.
    #[must_use]
    pub fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn has_outputs(&self) -> bool {
        self.parameters.iter().any(|p| p.direction.is_output())
    }

    /// A parameterless statement on the same timeout, used for follow-up queries such
    /// as the identity fetch after an insert.
    #[must_use]
    pub fn follow_up(&self, text: impl Into<String>) -> CommandSpec {
        CommandSpec {
            kind: CommandKind::Statement,
            text: text.into(),
            timeout: self.timeout,
            parameters: Vec::new(),
        }
    }
}

/// Builds [`CommandSpec`]s for both construction paths.
///
/// ```rust
/// use sql_command_middleware::prelude::*;
///
/// let mut params = ParameterSet::new();
/// params.add_input("@id", 42);
/// let cmd = CommandBuilder::statement("SELECT * FROM t WHERE id = @id")
///     .timeout(Some(30))
///     .bind_parameters(&params)?;
/// assert_eq!(cmd.parameters().len(), 1);
/// # Ok::<(), SqlCommandError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    kind: CommandKind,
    text: String,
    timeout: Option<u32>,
}

impl CommandBuilder {
    #[must_use]
    pub fn statement(sql: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Statement,
            text: sql.into(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::StoredProcedure,
            text: name.into(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<u32>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(SqlCommandError::CommandError(match self.kind {
                CommandKind::Statement => "statement text is empty".to_string(),
                CommandKind::StoredProcedure => "procedure name is empty".to_string(),
            }));
        }
        if self.timeout == Some(0) {
            return Err(SqlCommandError::CommandError(
                "command timeout must be a positive number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Bind every caller-declared parameter, in order, direction included.
    ///
    /// Null and absent values are bound as an explicit null.
    ///
    /// # Errors
    /// Returns `SqlCommandError::CommandError` for empty text or a zero timeout, and
    /// `SqlCommandError::ParameterError` for an empty parameter name.
    pub fn bind_parameters(self, parameters: &ParameterSet) -> Result<CommandSpec> {
        self.validate()?;
        let mut bound = Vec::with_capacity(parameters.len());
        for p in parameters {
            if p.bare_name().is_empty() {
                return Err(SqlCommandError::ParameterError(
                    "parameter name is empty".to_string(),
                ));
            }
            let mut param = p.clone();
            param.value = Some(p.bind_value());
            bound.push(param);
        }
        Ok(CommandSpec {
            kind: self.kind,
            text: self.text,
            timeout: self.timeout,
            parameters: bound,
        })
    }

    /// Bind positional arguments against a discovered procedure signature.
    ///
    /// The first discovered entry is the RETURN-VALUE slot and never receives an
    /// argument. The remaining entries take the arguments in order; entries left over
    /// are bound to null and arguments beyond the signature are ignored.
    ///
    /// # Errors
    /// Returns `SqlCommandError::CommandError` for an empty name or a zero timeout.
    pub fn bind_positional(
        self,
        discovered: &[ProcedureParameter],
        args: &[RowValues],
    ) -> Result<CommandSpec> {
        self.validate()?;
        let mut bound = Vec::with_capacity(discovered.len());
        let mut formals = discovered.iter();

        if let Some(slot) = formals.next() {
            bound.push(to_parameter(slot, RowValues::Null));
        }

        let mut supplied = args.iter();
        for formal in formals {
            let value = supplied.next().cloned().unwrap_or(RowValues::Null);
            bound.push(to_parameter(formal, value));
        }

        Ok(CommandSpec {
            kind: self.kind,
            text: self.text,
            timeout: self.timeout,
            parameters: bound,
        })
    }
}

fn to_parameter(formal: &ProcedureParameter, value: RowValues) -> Parameter {
    Parameter {
        name: formal.name.clone(),
        value: Some(value),
        direction: formal.direction,
        sql_type: formal.sql_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(names: &[&str]) -> Vec<ProcedureParameter> {
        let mut v = vec![ProcedureParameter::return_value()];
        for n in names {
            v.push(ProcedureParameter::new(*n, ParameterDirection::Input, None));
        }
        v
    }

    #[test]
    fn statement_binds_nulls_explicitly() {
        let mut set = ParameterSet::new();
        set.add("@a", None, ParameterDirection::Input)
            .add("@b", Some(RowValues::Null), ParameterDirection::Input)
            .add_input("@c", 3);
        let cmd = CommandBuilder::statement("UPDATE t SET a=@a, b=@b WHERE c=@c")
            .bind_parameters(&set)
            .unwrap();
        let values: Vec<_> = cmd.parameters().iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(RowValues::Null),
                Some(RowValues::Null),
                Some(RowValues::Int(3))
            ]
        );
        assert_eq!(cmd.kind(), CommandKind::Statement);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = CommandBuilder::statement("SELECT 1")
            .timeout(Some(0))
            .bind_parameters(&ParameterSet::new())
            .unwrap_err();
        assert!(matches!(err, SqlCommandError::CommandError(_)));
    }

    #[test]
    fn empty_procedure_name_is_rejected() {
        let err = CommandBuilder::procedure("  ")
            .bind_positional(&signature(&[]), &[])
            .unwrap_err();
        assert!(matches!(err, SqlCommandError::CommandError(_)));
    }

    #[test]
    fn positional_binding_skips_return_slot() {
        let cmd = CommandBuilder::procedure("dbo.AddUser")
            .bind_positional(&signature(&["@name", "@age"]), &["ann".into(), 30.into()])
            .unwrap();
        let p = cmd.parameters();
        assert_eq!(p.len(), 3);
        assert_eq!(p[0].name, RETURN_VALUE_NAME);
        assert_eq!(p[0].direction, ParameterDirection::ReturnValue);
        assert_eq!(p[0].value, Some(RowValues::Null));
        assert_eq!(p[1].value, Some(RowValues::Text("ann".into())));
        assert_eq!(p[2].value, Some(RowValues::Int(30)));
    }

    #[test]
    fn missing_arguments_are_null_filled() {
        let cmd = CommandBuilder::procedure("p")
            .bind_positional(&signature(&["@a", "@b", "@c"]), &[1.into()])
            .unwrap();
        let values: Vec<_> = cmd.parameters()[1..].iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(RowValues::Int(1)),
                Some(RowValues::Null),
                Some(RowValues::Null)
            ]
        );
    }

    #[test]
    fn excess_arguments_are_never_reached() {
        let cmd = CommandBuilder::procedure("p")
            .bind_positional(&signature(&["@a"]), &[1.into(), 2.into(), 3.into()])
            .unwrap();
        assert_eq!(cmd.parameters().len(), 2);
        assert_eq!(cmd.parameters()[1].value, Some(RowValues::Int(1)));
    }

    #[test]
    fn follow_up_keeps_timeout_and_drops_parameters() {
        let mut set = ParameterSet::new();
        set.add_input("@x", 1);
        let cmd = CommandBuilder::statement("INSERT INTO t VALUES (@x)")
            .timeout(Some(5))
            .bind_parameters(&set)
            .unwrap();
        let next = cmd.follow_up("SELECT @@IDENTITY");
        assert_eq!(next.timeout(), Some(5));
        assert!(next.parameters().is_empty());
    }
}
