use tiberius::Query;

use crate::types::RowValues;

/// Build a tiberius query with `binds` attached as `@P1..@Pn`.
pub(crate) fn bind_query<'a>(sql: &'a str, binds: &[RowValues]) -> Query<'a> {
    let mut query = Query::new(sql);
    for value in binds {
        match value {
            RowValues::Int(i) => query.bind(*i),
            RowValues::Float(f) => query.bind(*f),
            RowValues::Text(s) => query.bind(s.clone()),
            RowValues::Bool(b) => query.bind(*b),
            RowValues::Timestamp(dt) => query.bind(*dt),
            RowValues::Null => query.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query.bind(bytes.clone()),
        }
    }
    query
}
