//! UPDATE generation.

use super::{predicate, source};
use crate::param::{column_param_name, Parameter};
use crate::query::Query;

/// Generates `UPDATE src SET col = @col, ... WHERE predicate`.
///
/// Each value is bound to a parameter named after its column.
pub(super) fn generate(query: &Query) -> (String, Vec<Parameter>) {
    let mut sql = String::from("UPDATE ");
    let mut params = Vec::with_capacity(query.values.len());

    sql.push_str(source(query));
    sql.push_str(" SET ");

    let assignments: Vec<String> = query
        .values
        .iter()
        .map(|(column, value)| {
            let param = Parameter::new(&column_param_name(column), value);
            let assignment = format!("{column} = {}", param.placeholder());
            params.push(param);
            assignment
        })
        .collect();
    sql.push_str(&assignments.join(", "));

    sql.push_str(" WHERE ");
    sql.push_str(predicate(query));

    (sql, params)
}
