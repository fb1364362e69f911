mod args;

use clap::Parser;
use serde_json::{Map, Value as JsonValue, json};
use sql_command_middleware::prelude::*;
use tracing::{Level, info};

use crate::args::{Args, Command};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    match dispatch(&args).await {
        Ok(output) => {
            let text = serde_json::to_string_pretty(&output).unwrap_or_else(|_| "null".to_string());
            println!("{text}");
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn dispatch(args: &Args) -> Result<JsonValue, SqlCommandError> {
    let options = match &args.options {
        Some(path) => EngineOptions::from_json_file(path)?,
        None => EngineOptions::default(),
    };
    match args.backend {
        DatabaseType::Mssql => run_mssql(args, options).await,
        DatabaseType::Sqlite => run_sqlite(args, options).await,
    }
}

#[cfg(feature = "mssql")]
async fn run_mssql(args: &Args, options: EngineOptions) -> Result<JsonValue, SqlCommandError> {
    let connector = MssqlConnector::from_connection_string(&args.connection)?;
    run(Engine::new(connector, options)?, args).await
}

#[cfg(not(feature = "mssql"))]
async fn run_mssql(_args: &Args, _options: EngineOptions) -> Result<JsonValue, SqlCommandError> {
    Err(SqlCommandError::Unimplemented(
        "built without the mssql feature".to_string(),
    ))
}

#[cfg(feature = "sqlite")]
async fn run_sqlite(args: &Args, options: EngineOptions) -> Result<JsonValue, SqlCommandError> {
    let connector = SqliteConnector::new(args.connection.clone());
    run(Engine::new(connector, options)?, args).await
}

#[cfg(not(feature = "sqlite"))]
async fn run_sqlite(_args: &Args, _options: EngineOptions) -> Result<JsonValue, SqlCommandError> {
    Err(SqlCommandError::Unimplemented(
        "built without the sqlite feature".to_string(),
    ))
}

async fn run<C: Connector>(engine: Engine<C>, args: &Args) -> Result<JsonValue, SqlCommandError> {
    info!(backend = ?engine.database_type(), "running command");
    let mut session = engine.session();
    for (name, value) in &args.params {
        session.add_input(name.clone(), value.clone());
    }
    for (name, sql_type) in &args.outputs {
        session.add_output(name.clone(), sql_type.clone());
    }

    if let Some(name) = &args.transaction {
        session.begin_transaction(name, None).await?;
    }
    // A failed command already rolled the transaction back.
    let output = execute(&mut session, &args.command, args.timeout).await?;
    session.commit().await?;
    Ok(output)
}

async fn execute<C: Connector>(
    session: &mut Session<'_, C>,
    command: &Command,
    timeout: Option<u32>,
) -> Result<JsonValue, SqlCommandError> {
    let output = match command {
        Command::Query { sql } => {
            let data = session.statement_set(sql, timeout).await?;
            data.to_json()
        }
        Command::Exec { sql } => {
            let outcome = session.statement_non_query_with_output(sql, timeout).await?;
            json!({
                "rows_affected": outcome.rows_affected,
                "outputs": outputs_json(&outcome.outputs),
            })
        }
        Command::Insert { sql } => {
            let outcome = session.statement_insert_returning_id(sql, timeout).await?;
            json!({
                "rows_affected": outcome.rows_affected,
                "id": outcome.id.as_ref().map_or(JsonValue::Null, RowValues::to_json),
            })
        }
        Command::Scalar { sql } => session
            .statement_scalar(sql, timeout)
            .await?
            .as_ref()
            .map_or(JsonValue::Null, RowValues::to_json),
        Command::Proc {
            name,
            args,
            error_parms,
        } => {
            if *error_parms {
                let (table, parms) = session
                    .procedure_table_with_error_parms(name, args, timeout)
                    .await?;
                json!({ "rows": table.to_json(), "error_parms": error_parms_json(&parms) })
            } else {
                session.procedure_table(name, args, timeout).await?.to_json()
            }
        }
        Command::ProcOutput { name, error_parms } => {
            let outcome = if *error_parms {
                session
                    .procedure_non_query_with_output_and_error_parms(name, timeout)
                    .await?
            } else {
                session.procedure_non_query_with_output(name, timeout).await?
            };
            json!({
                "rows_affected": outcome.rows_affected,
                "outputs": outputs_json(&outcome.outputs),
                "error_parms": outcome.error_parms.as_ref().map_or(JsonValue::Null, error_parms_json),
            })
        }
    };
    Ok(output)
}

fn outputs_json(outputs: &OutputParameters) -> JsonValue {
    let mut map = Map::new();
    for (name, value) in outputs.iter() {
        map.insert(name.to_string(), value.to_json());
    }
    JsonValue::Object(map)
}

fn error_parms_json(parms: &ErrorParms) -> JsonValue {
    json!({ "return_code": parms.return_code, "return_message": parms.return_message })
}
