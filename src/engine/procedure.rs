use crate::backend::{Connector, DbConnection};
use crate::command::{CommandBuilder, CommandSpec};
use crate::config::ErrorParmNames;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::results::{
    ErrorParms, ExecOutcome, OutputParameters, ProcedureOutcome, QueryOutcome, ResultSet,
};
use crate::types::RowValues;

use super::Session;
use super::scope::{CallConnection, timed};

impl<C: Connector> Session<'_, C> {
    /// Call a procedure with positional arguments and materialize its first result set.
    ///
    /// The procedure's signature is discovered from the server first; `args` fill the
    /// formal parameters in order after the RETURN-VALUE slot, missing ones are null.
    /// Queued named parameters are discarded.
    ///
    /// # Errors
    /// Returns `SqlCommandError::CommandError` for an unknown procedure, plus any
    /// connection or execution failure; an active transaction is rolled back first.
    pub async fn procedure_table(
        &mut self,
        name: &str,
        args: &[RowValues],
        timeout: Option<u32>,
    ) -> Result<ResultSet> {
        const OP: &str = "procedure_table";
        self.parameters.clear();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = positional_query(&mut call, name, args, timeout)
            .await
            .map(|q| q.data.into_first());
        self.release(call, outcome).await
    }

    /// [`procedure_table`](Session::procedure_table) plus the procedure's
    /// return-code/return-message OUTPUT parameters.
    ///
    /// # Errors
    /// As [`procedure_table`](Session::procedure_table); additionally
    /// `SqlCommandError::ParameterError` when the procedure lacks either error parameter.
    pub async fn procedure_table_with_error_parms(
        &mut self,
        name: &str,
        args: &[RowValues],
        timeout: Option<u32>,
    ) -> Result<(ResultSet, ErrorParms)> {
        const OP: &str = "procedure_table_with_error_parms";
        self.parameters.clear();
        let timeout = self.effective_timeout(timeout);
        let names = self.engine.options.error_parms.clone();
        let mut call = self.acquire(OP).await?;
        let outcome = positional_query(&mut call, name, args, timeout)
            .await
            .and_then(|q| {
                let parms = read_error_parms(&q.outputs, &names)?;
                Ok((q.data.into_first(), parms))
            });
        self.release(call, outcome).await
    }

    /// Call a procedure with positional arguments for its side effects.
    ///
    /// # Errors
    /// See [`procedure_table`](Session::procedure_table).
    pub async fn procedure_non_query(
        &mut self,
        name: &str,
        args: &[RowValues],
        timeout: Option<u32>,
    ) -> Result<usize> {
        const OP: &str = "procedure_non_query";
        self.parameters.clear();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = positional_execute(&mut call, name, args, timeout)
            .await
            .map(|e| e.rows_affected);
        self.release(call, outcome).await
    }

    /// [`procedure_non_query`](Session::procedure_non_query) plus the error parameters.
    ///
    /// # Errors
    /// See [`procedure_table_with_error_parms`](Session::procedure_table_with_error_parms).
    pub async fn procedure_non_query_with_error_parms(
        &mut self,
        name: &str,
        args: &[RowValues],
        timeout: Option<u32>,
    ) -> Result<(usize, ErrorParms)> {
        const OP: &str = "procedure_non_query_with_error_parms";
        self.parameters.clear();
        let timeout = self.effective_timeout(timeout);
        let names = self.engine.options.error_parms.clone();
        let mut call = self.acquire(OP).await?;
        let outcome = positional_execute(&mut call, name, args, timeout)
            .await
            .and_then(|e| {
                let parms = read_error_parms(&e.outputs, &names)?;
                Ok((e.rows_affected, parms))
            });
        self.release(call, outcome).await
    }

    /// Call a procedure with the queued named parameters and return what it wrote
    /// into OUTPUT, INPUT/OUTPUT and RETURN-VALUE parameters.
    ///
    /// The parameter set is cleared, but the output values are captured into the
    /// returned outcome first.
    ///
    /// # Errors
    /// Returns construction, connection or execution failures; an active transaction
    /// is rolled back first.
    pub async fn procedure_non_query_with_output(
        &mut self,
        name: &str,
        timeout: Option<u32>,
    ) -> Result<ProcedureOutcome> {
        const OP: &str = "procedure_non_query_with_output";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let mut call = self.acquire(OP).await?;
        let outcome = named_execute(&mut call, name, &parameters, timeout)
            .await
            .map(|e| ProcedureOutcome {
                rows_affected: e.rows_affected,
                outputs: e.outputs,
                error_parms: None,
            });
        self.release(call, outcome).await
    }

    /// [`procedure_non_query_with_output`](Session::procedure_non_query_with_output)
    /// that also reads the error parameters. They must be among the queued parameters.
    ///
    /// # Errors
    /// See [`procedure_table_with_error_parms`](Session::procedure_table_with_error_parms).
    pub async fn procedure_non_query_with_output_and_error_parms(
        &mut self,
        name: &str,
        timeout: Option<u32>,
    ) -> Result<ProcedureOutcome> {
        const OP: &str = "procedure_non_query_with_output_and_error_parms";
        let parameters = self.parameters.take();
        let timeout = self.effective_timeout(timeout);
        let names = self.engine.options.error_parms.clone();
        let mut call = self.acquire(OP).await?;
        let outcome = named_execute(&mut call, name, &parameters, timeout)
            .await
            .and_then(|e| {
                let parms = read_error_parms(&e.outputs, &names)?;
                Ok(ProcedureOutcome {
                    rows_affected: e.rows_affected,
                    outputs: e.outputs,
                    error_parms: Some(parms),
                })
            });
        self.release(call, outcome).await
    }
}

/// Discover the signature and bind `args` positionally.
async fn positional_command<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    name: &str,
    args: &[RowValues],
    timeout: Option<u32>,
) -> Result<CommandSpec> {
    let builder = CommandBuilder::procedure(name).timeout(timeout);
    builder.validate()?;
    let conn = call.conn()?;
    let discovered = timed(timeout, conn.derive_parameters(name)).await?;
    builder.bind_positional(&discovered, args)
}

async fn positional_query<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    name: &str,
    args: &[RowValues],
    timeout: Option<u32>,
) -> Result<QueryOutcome> {
    let command = positional_command(call, name, args, timeout).await?;
    let conn = call.conn()?;
    timed(timeout, conn.query(&command)).await
}

async fn positional_execute<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    name: &str,
    args: &[RowValues],
    timeout: Option<u32>,
) -> Result<ExecOutcome> {
    let command = positional_command(call, name, args, timeout).await?;
    let conn = call.conn()?;
    timed(timeout, conn.execute(&command)).await
}

async fn named_execute<Conn: DbConnection>(
    call: &mut CallConnection<Conn>,
    name: &str,
    parameters: &ParameterSet,
    timeout: Option<u32>,
) -> Result<ExecOutcome> {
    let command = CommandBuilder::procedure(name)
        .timeout(timeout)
        .bind_parameters(parameters)?;
    let conn = call.conn()?;
    timed(timeout, conn.execute(&command)).await
}

fn read_error_parms(
    outputs: &OutputParameters,
    names: &ErrorParmNames,
) -> Result<ErrorParms> {
    outputs.error_parms(&names.return_code, &names.return_message)
}
