//! Materialized query results and the values an execution hands back.

mod outcome;
mod result_set;
mod row;

pub use outcome::{ErrorParms, ExecOutcome, InsertOutcome, OutputParameters, ProcedureOutcome, QueryOutcome};
pub use result_set::{ColumnInfo, DataSet, ResultSet};
pub use row::CustomDbRow;
