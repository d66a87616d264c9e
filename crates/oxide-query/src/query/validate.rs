//! Clause legality per operation kind.

use std::collections::HashSet;
use std::fmt;

use super::{Clause, OperationKind, Query};
use crate::error::{QueryError, Result};

/// Why a clause is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The clause must be declared.
    Required,
    /// The clause must not be declared.
    Forbidden,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("requires"),
            Self::Forbidden => f.write_str("does not allow"),
        }
    }
}

/// Clauses that cannot accompany raw SQL or a stored procedure.
const BUILT_CLAUSES: [Clause; 7] = [
    Clause::Source,
    Clause::Filter,
    Clause::Columns,
    Clause::Predicate,
    Clause::OrderBy,
    Clause::GroupBy,
    Clause::Having,
];

/// Forbidden and required clauses for a kind.
fn matrix(kind: OperationKind) -> (&'static [Clause], &'static [Clause]) {
    use Clause::{
        Columns, Filter, GroupBy, Having, InsertRows, OrderBy, PageSize, Predicate, Source,
        UpdateValues,
    };

    match kind {
        OperationKind::Count => (&[Columns], &[Source]),
        OperationKind::Delete => (
            &[Columns, OrderBy, GroupBy, Having, Filter],
            &[Source, Predicate],
        ),
        OperationKind::Insert | OperationKind::InsertBatch => (
            &[Columns, Predicate, OrderBy, GroupBy, Having, Filter],
            &[Source, InsertRows],
        ),
        OperationKind::Item => (&[Filter], &[Source]),
        OperationKind::Page => (&[], &[Source, OrderBy, PageSize]),
        OperationKind::Update => (
            &[Columns, OrderBy, GroupBy, Having, Filter],
            &[Source, Predicate, UpdateValues],
        ),
        OperationKind::Execute
        | OperationKind::Rows
        | OperationKind::Iter
        | OperationKind::Reader
        | OperationKind::Scalar
        | OperationKind::Multiple => (&[], &[]),
    }
}

fn forbid(kind: OperationKind, query: &Query, clauses: &[Clause]) -> Result<()> {
    match clauses.iter().find(|c| query.has(**c)) {
        Some(&clause) => Err(QueryError::InvalidClause {
            kind,
            clause,
            rule: Rule::Forbidden,
        }),
        None => Ok(()),
    }
}

fn require(kind: OperationKind, query: &Query, clauses: &[Clause]) -> Result<()> {
    match clauses.iter().find(|c| !query.has(**c)) {
        Some(&clause) => Err(QueryError::InvalidClause {
            kind,
            clause,
            rule: Rule::Required,
        }),
        None => Ok(()),
    }
}

/// Checks the clause set of `query` for `kind`.
pub(super) fn validate(kind: OperationKind, query: &Query) -> Result<()> {
    if query.has(Clause::Sql) {
        forbid(kind, query, &[Clause::Procedure])?;
        forbid(kind, query, &BUILT_CLAUSES)?;
    }
    if query.has(Clause::Procedure) {
        forbid(kind, query, &BUILT_CLAUSES)?;
    }

    let (forbidden, required) = matrix(kind);
    forbid(kind, query, forbidden)?;
    require(kind, query, required)?;

    // Clause-built statements need something to select from.
    if !query.has(Clause::Sql) && !query.has(Clause::Procedure) {
        require(kind, query, &[Clause::Source])?;
    }

    match kind {
        OperationKind::Insert if query.rows.len() > 1 => Err(QueryError::configuration(
            kind,
            format!(
                "expects exactly one row but {} were given; use a batch insert",
                query.rows.len()
            ),
        )),
        OperationKind::Insert | OperationKind::InsertBatch => validate_rows(kind, query),
        _ => Ok(()),
    }
}

/// Every insert row must carry the columns of the first row.
fn validate_rows(kind: OperationKind, query: &Query) -> Result<()> {
    let Some(first) = query.rows.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(QueryError::configuration(kind, "insert row 0 has no values"));
    }

    let expected: HashSet<&str> = first.columns().iter().map(String::as_str).collect();
    for (index, row) in query.rows.iter().enumerate().skip(1) {
        let columns: HashSet<&str> = row.columns().iter().map(String::as_str).collect();
        if columns != expected {
            return Err(QueryError::configuration(
                kind,
                format!("insert row {index} has different columns than row 0"),
            ));
        }
    }
    Ok(())
}
