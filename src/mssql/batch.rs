//! Renders a [`CommandSpec`] into a T-SQL batch tiberius can run.
//!
//! tiberius only binds positional `@P1..@Pn` values. Caller names are restored by
//! wrapping statements in `sp_executesql` and procedures in a named-argument `EXEC`;
//! OUTPUT, INPUT/OUTPUT and RETURN-VALUE slots are declared as locals and read back by
//! a trailing `SELECT`.

use std::fmt::Write;

use crate::command::{CommandKind, CommandSpec};
use crate::error::{Result, SqlCommandError};
use crate::params::{Parameter, bare_name};
use crate::types::{ParameterDirection, RowValues};

/// Alias of the row-count column in the trailing output `SELECT`.
pub(crate) const ROWCOUNT_COLUMN: &str = "__rows";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderedBatch {
    pub sql: String,
    /// Values for `@P1..@Pn`, in order.
    pub binds: Vec<RowValues>,
    /// Caller names of the output columns in the trailing `SELECT`, in order.
    pub outputs: Vec<String>,
}

impl RenderedBatch {
    pub(crate) fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }
}

pub(crate) fn render(command: &CommandSpec) -> Result<RenderedBatch> {
    for p in command.parameters() {
        validate_name(&p.name)?;
    }
    match command.kind() {
        CommandKind::Statement => render_statement(command),
        CommandKind::StoredProcedure => render_procedure(command),
    }
}

fn render_statement(command: &CommandSpec) -> Result<RenderedBatch> {
    let params = command.parameters();
    if params.is_empty() {
        return Ok(RenderedBatch {
            sql: command.text().to_string(),
            binds: Vec::new(),
            outputs: Vec::new(),
        });
    }

    let mut b = Builder::default();
    let mut declarations = Vec::new();
    let mut arguments = Vec::new();

    for p in params {
        let name = at_name(&p.name);
        let sql_type = declared_type(p);
        match p.direction {
            ParameterDirection::Input => {
                let slot = b.bind(p.bind_value());
                declarations.push(format!("{name} {sql_type}"));
                arguments.push(format!("{name} = {slot}"));
            }
            ParameterDirection::Output | ParameterDirection::InputOutput => {
                let local = b.declare_output(p, &sql_type);
                declarations.push(format!("{name} {sql_type} OUTPUT"));
                arguments.push(format!("{name} = {local} OUTPUT"));
            }
            // A statement has no RETURN value; the slot reads back as NULL.
            ParameterDirection::ReturnValue => b.null_output(p),
        }
    }

    let call = format!(
        "EXEC sp_executesql N'{}', N'{}', {}",
        escape_literal(command.text()),
        escape_literal(&declarations.join(", ")),
        arguments.join(", ")
    );
    Ok(b.finish(&call))
}

fn render_procedure(command: &CommandSpec) -> Result<RenderedBatch> {
    let target = quote_procedure(command.text())?;
    let mut b = Builder::default();
    let mut arguments = Vec::new();
    let mut return_slot = None;

    for p in command.parameters() {
        let name = at_name(&p.name);
        match p.direction {
            ParameterDirection::Input => {
                let slot = b.bind(p.bind_value());
                arguments.push(format!("{name} = {slot}"));
            }
            ParameterDirection::Output | ParameterDirection::InputOutput => {
                let sql_type = declared_type(p);
                let local = b.declare_output(p, &sql_type);
                arguments.push(format!("{name} = {local} OUTPUT"));
            }
            ParameterDirection::ReturnValue => {
                if return_slot.is_none() {
                    return_slot = Some(b.declare_output(p, "int"));
                } else {
                    b.null_output(p);
                }
            }
        }
    }

    let mut call = String::from("EXEC ");
    if let Some(local) = &return_slot {
        let _ = write!(call, "{local} = ");
    }
    call.push_str(&target);
    if !arguments.is_empty() {
        call.push(' ');
        call.push_str(&arguments.join(", "));
    }
    Ok(b.finish(&call))
}

#[derive(Default)]
struct Builder {
    prelude: String,
    binds: Vec<RowValues>,
    select: Vec<String>,
    outputs: Vec<String>,
}

impl Builder {
    fn bind(&mut self, value: RowValues) -> String {
        self.binds.push(value);
        format!("@P{}", self.binds.len())
    }

    fn declare_output(&mut self, p: &Parameter, sql_type: &str) -> String {
        let local = format!("@__o{}", self.outputs.len() + 1);
        if p.direction.sends_value() {
            let slot = self.bind(p.bind_value());
            let _ = writeln!(self.prelude, "DECLARE {local} {sql_type} = {slot};");
        } else {
            let _ = writeln!(self.prelude, "DECLARE {local} {sql_type};");
        }
        self.select.push(format!("{local} AS [{}]", escape_ident(&p.name)));
        self.outputs.push(p.name.clone());
        local
    }

    fn null_output(&mut self, p: &Parameter) {
        self.select
            .push(format!("NULL AS [{}]", escape_ident(&p.name)));
        self.outputs.push(p.name.clone());
    }

    fn finish(self, call: &str) -> RenderedBatch {
        if self.outputs.is_empty() {
            return RenderedBatch {
                sql: call.to_string(),
                binds: self.binds,
                outputs: self.outputs,
            };
        }
        let mut sql = self.prelude;
        let _ = writeln!(sql, "DECLARE @__rows int;");
        let _ = writeln!(sql, "{call};");
        let _ = writeln!(sql, "SET @__rows = @@ROWCOUNT;");
        let _ = write!(
            sql,
            "SELECT {}, @__rows AS [{ROWCOUNT_COLUMN}];",
            self.select.join(", ")
        );
        RenderedBatch {
            sql,
            binds: self.binds,
            outputs: self.outputs,
        }
    }
}

/// Server type used to declare a parameter: explicit type first, then a guess from
/// the value.
fn declared_type(p: &Parameter) -> String {
    if let Some(t) = &p.sql_type {
        return t.clone();
    }
    match p.value.as_ref().unwrap_or(&RowValues::Null) {
        RowValues::Int(_) => "bigint",
        RowValues::Float(_) => "float",
        RowValues::Bool(_) => "bit",
        RowValues::Timestamp(_) => "datetime2",
        RowValues::Blob(_) => "varbinary(max)",
        RowValues::Text(_) | RowValues::JSON(_) | RowValues::Null => "nvarchar(max)",
    }
    .to_string()
}

fn validate_name(name: &str) -> Result<()> {
    let bare = bare_name(name);
    let valid = !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '#' | '$'));
    if valid {
        Ok(())
    } else {
        Err(SqlCommandError::ParameterError(format!(
            "invalid SQL Server parameter name: {name:?}"
        )))
    }
}

fn at_name(name: &str) -> String {
    format!("@{}", bare_name(name))
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn escape_ident(s: &str) -> String {
    s.replace(']', "]]")
}

/// Bracket-quote each part of `schema.procedure`, leaving already quoted names alone.
pub(crate) fn quote_procedure(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SqlCommandError::CommandError(
            "procedure name is empty".to_string(),
        ));
    }
    if name.contains('[') {
        return Ok(name.to_string());
    }
    Ok(name
        .split('.')
        .map(|part| format!("[{}]", escape_ident(part.trim())))
        .collect::<Vec<_>>()
        .join("."))
}
