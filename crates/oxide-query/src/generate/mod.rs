//! Statement generators.
//!
//! One generator per operation kind, each a function from the accumulated
//! clauses to SQL text plus the parameters it introduced. Caller parameters
//! are merged in later by `Prepared::command_with`.

mod count;
mod delete;
mod insert;
mod page;
mod select;
mod update;

use crate::config::Settings;
use crate::driver::{CommandKind, TableValuedEncoder};
use crate::error::Result;
use crate::param::Parameter;
use crate::query::{OperationKind, Query};

pub use insert::{IDENTITY_PARAM, TABLE_PARAM};
pub use page::{PAGE_ALIAS, ROW_NUMBER_ALIAS};

/// Filter modifier forced onto single-row selects.
pub const SINGLE_ROW_FILTER: &str = "TOP 1";

/// SQL text and the parameters a generator introduced.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedStatement {
    /// SQL text or stored procedure name.
    pub sql: String,
    /// How `sql` is interpreted.
    pub kind: CommandKind,
    /// Parameters created by the generator.
    pub params: Vec<Parameter>,
    /// Whether the parameter-sniffing rewrite applies.
    pub shadow: bool,
}

impl GeneratedStatement {
    fn text(sql: String) -> Self {
        Self {
            sql,
            kind: CommandKind::Text,
            params: Vec::new(),
            shadow: false,
        }
    }

    fn shadowed(sql: String) -> Self {
        Self {
            shadow: true,
            ..Self::text(sql)
        }
    }

    fn with_params(sql: String, params: Vec<Parameter>) -> Self {
        Self {
            params,
            ..Self::text(sql)
        }
    }
}

/// Generates the statement for `kind`.
///
/// `cursor` is the batch position of inserts and is advanced past the rows
/// the statement covers.
pub(crate) fn generate(
    kind: OperationKind,
    query: &Query,
    cursor: &mut usize,
    settings: &Settings,
    encoder: &dyn TableValuedEncoder,
) -> Result<GeneratedStatement> {
    if let Some(sql) = &query.sql {
        return Ok(GeneratedStatement::text(sql.clone()));
    }
    if let Some(procedure) = &query.procedure {
        return Ok(GeneratedStatement {
            kind: CommandKind::StoredProcedure,
            ..GeneratedStatement::text(procedure.clone())
        });
    }

    let statement = match kind {
        OperationKind::Count => GeneratedStatement::text(count::generate(query)),
        OperationKind::Delete => GeneratedStatement::text(delete::generate(query)),
        OperationKind::Update => {
            let (sql, params) = update::generate(query);
            GeneratedStatement::with_params(sql, params)
        }
        OperationKind::Insert => {
            let (sql, params) = insert::generate_single(query)?;
            GeneratedStatement::with_params(sql, params)
        }
        OperationKind::InsertBatch => {
            let (sql, params) = match &query.table_type {
                Some(type_name) => {
                    insert::generate_table_valued(query, type_name, encoder, cursor)?
                }
                None => insert::generate_batch(query, cursor, &settings.limits)?,
            };
            GeneratedStatement::with_params(sql, params)
        }
        OperationKind::Item => {
            GeneratedStatement::shadowed(select::generate(query, Some(SINGLE_ROW_FILTER)))
        }
        OperationKind::Page => GeneratedStatement::shadowed(page::generate(query)),
        OperationKind::Execute
        | OperationKind::Rows
        | OperationKind::Iter
        | OperationKind::Reader
        | OperationKind::Scalar
        | OperationKind::Multiple => {
            GeneratedStatement::shadowed(select::generate(query, query.filter.as_deref()))
        }
    };

    Ok(statement)
}

/// Source clause of a validated query.
fn source(query: &Query) -> &str {
    query.source.as_deref().unwrap_or_default()
}

/// Predicate clause of a validated query.
fn predicate(query: &Query) -> &str {
    query.predicate.as_deref().unwrap_or_default()
}
