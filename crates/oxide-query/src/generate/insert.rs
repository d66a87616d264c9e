//! INSERT generation.
//!
//! Single inserts bind one row and read the new identity back through an
//! output parameter. Batched inserts pack as many rows into one multi-row
//! `VALUES` statement as the parameter budget and the row ceiling allow,
//! sharing one parameter between identical values; each call generates the
//! next batch. Table-valued inserts send every remaining row at once.

use tracing::trace;

use super::source;
use crate::config::Limits;
use crate::driver::TableValuedEncoder;
use crate::error::{QueryError, Result};
use crate::param::{ParamBinder, Parameter};
use crate::query::{OperationKind, Query};
use crate::record::Record;
use crate::value::{SqlType, SqlValue};

/// Output parameter receiving the identity of a single insert.
pub const IDENTITY_PARAM: &str = "__identity";

/// Table-valued parameter carrying the rows of a table-valued insert.
pub const TABLE_PARAM: &str = "__rows";

/// Prefix of the generated value parameters.
const VALUE_PREFIX: &str = "__v";

fn no_rows(kind: OperationKind) -> QueryError {
    QueryError::configuration(kind, "there are no rows to insert")
}

/// Pushes `INSERT INTO src (a, b)`.
fn push_head(sql: &mut String, query: &Query, columns: &[String]) {
    sql.push_str("INSERT INTO ");
    sql.push_str(source(query));
    sql.push_str(" (");
    sql.push_str(&columns.join(", "));
    sql.push(')');
}

/// Values of `row` in the column order of the first row.
fn ordered<'a>(row: &'a Record, columns: &[String]) -> Vec<&'a SqlValue> {
    const NULL: &SqlValue = &SqlValue::Null;
    columns
        .iter()
        .map(|column| row.get(column).unwrap_or(NULL))
        .collect()
}

fn push_tuple(sql: &mut String, binder: &mut ParamBinder, values: &[&SqlValue]) {
    let placeholders: Vec<String> = values.iter().map(|v| binder.bind(v)).collect();
    sql.push('(');
    sql.push_str(&placeholders.join(", "));
    sql.push(')');
}

/// Generates the single-row insert followed by the identity assignment.
pub(super) fn generate_single(query: &Query) -> Result<(String, Vec<Parameter>)> {
    let row = query
        .rows
        .first()
        .ok_or_else(|| no_rows(OperationKind::Insert))?;
    let columns = row.columns();

    let mut sql = String::new();
    let mut binder = ParamBinder::new(VALUE_PREFIX);
    push_head(&mut sql, query, columns);
    sql.push_str(" VALUES ");
    push_tuple(&mut sql, &mut binder, &ordered(row, columns));
    sql.push_str(&format!("; SET @{IDENTITY_PARAM} = SCOPE_IDENTITY()"));

    let mut params = binder.into_params();
    params.push(Parameter::output(IDENTITY_PARAM, SqlType::BigInt));
    Ok((sql, params))
}

/// Generates the next multi-row batch starting at `cursor` and advances it.
///
/// Caller parameters count against the budget. A row that cannot fit into an
/// empty statement is an error and leaves the cursor where it was.
pub(super) fn generate_batch(
    query: &Query,
    cursor: &mut usize,
    limits: &Limits,
) -> Result<(String, Vec<Parameter>)> {
    let kind = OperationKind::InsertBatch;
    let first = query.rows.first().ok_or_else(|| no_rows(kind))?;
    let columns = first.columns();
    let budget = limits.max_parameters.saturating_sub(query.params.len());
    let max_rows = limits.max_insert_rows.max(1);

    let mut sql = String::new();
    let mut binder = ParamBinder::new(VALUE_PREFIX);
    let mut included = 0;
    push_head(&mut sql, query, columns);
    sql.push_str(" VALUES ");

    for (index, row) in query.rows.iter().enumerate().skip(*cursor) {
        if included == max_rows {
            break;
        }
        let values = ordered(row, columns);
        let cost = binder.cost(values.iter().copied());
        if binder.len() + cost > budget {
            if included == 0 {
                return Err(QueryError::configuration(
                    kind,
                    format!(
                        "insert row {index} needs {cost} parameters but only {budget} are available"
                    ),
                ));
            }
            break;
        }
        if included > 0 {
            sql.push_str(", ");
        }
        push_tuple(&mut sql, &mut binder, &values);
        included += 1;
    }

    if included == 0 {
        return Err(no_rows(kind));
    }

    trace!(
        first_row = *cursor,
        rows = included,
        params = binder.len(),
        "Generated insert batch"
    );
    *cursor += included;
    Ok((sql, binder.into_params()))
}

/// Generates an insert selecting every remaining row from one table-valued
/// parameter, and moves the cursor past the last row.
pub(super) fn generate_table_valued(
    query: &Query,
    type_name: &str,
    encoder: &dyn TableValuedEncoder,
    cursor: &mut usize,
) -> Result<(String, Vec<Parameter>)> {
    let rows = query.rows.get(*cursor..).unwrap_or_default();
    let first = rows
        .first()
        .ok_or_else(|| no_rows(OperationKind::InsertBatch))?;
    let columns = first.columns();

    let param = encoder.encode(TABLE_PARAM, type_name, rows)?;

    let mut sql = String::new();
    push_head(&mut sql, query, columns);
    sql.push_str(" SELECT ");
    sql.push_str(&columns.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&param.placeholder());

    trace!(rows = rows.len(), type_name, "Generated table-valued insert");
    *cursor = query.rows.len();
    Ok((sql, vec![param]))
}
