//! Clause accumulation and operation-kind resolution.
//!
//! A `Query` collects clauses without checking them. Resolving it into a
//! `Prepared` for an `OperationKind` validates the clause set once; the
//! resulting `Prepared` keeps that kind for the rest of its life and is what
//! statements are generated from.
//!
//! # Example
//!
//! ```rust
//! use oxide_query::{OperationKind, Query, Settings};
//!
//! let mut prepared = Query::new()
//!     .from("users")
//!     .columns(&["id", "name"])
//!     .where_clause("active = @active")
//!     .bind("active", true)
//!     .finalize(OperationKind::Rows)
//!     .unwrap();
//!
//! let settings = Settings::default().with_anti_sniffing(false);
//! let command = prepared.command(&settings).unwrap();
//! assert_eq!(command.text, "SELECT id, name FROM users WHERE active = @active");
//! ```

mod validate;

use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use crate::config::Settings;
use crate::driver::{Command, InferredTableEncoder, TableValuedEncoder};
use crate::error::{QueryError, Result};
use crate::generate::{self, GeneratedStatement};
use crate::param::Parameter;
use crate::record::Record;
use crate::sniffing;
use crate::value::ToSqlValue;

pub use validate::Rule;

/// The resolved statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `SELECT COUNT(*)`, returned as a scalar.
    Count,
    /// `DELETE`.
    Delete,
    /// Single-row `INSERT` returning the new identity.
    Insert,
    /// Multi-row `INSERT`, batched or table-valued.
    InsertBatch,
    /// `SELECT TOP 1`, returned as one optional row.
    Item,
    /// Paged `SELECT`.
    Page,
    /// `UPDATE`.
    Update,
    /// Any statement, returning the affected row count.
    Execute,
    /// All rows of a result set.
    Rows,
    /// Rows of a result set produced lazily.
    Iter,
    /// A raw cursor.
    Reader,
    /// A single scalar value.
    Scalar,
    /// Every result set of a batch.
    Multiple,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "Count",
            Self::Delete => "Delete",
            Self::Insert => "Insert",
            Self::InsertBatch => "InsertBatch",
            Self::Item => "Item",
            Self::Page => "Page",
            Self::Update => "Update",
            Self::Execute => "Execute",
            Self::Rows => "Rows",
            Self::Iter => "Iter",
            Self::Reader => "Reader",
            Self::Scalar => "Scalar",
            Self::Multiple => "Multiple",
        };
        f.write_str(name)
    }
}

/// A clause that can be declared on a `Query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    /// `FROM` source / target table.
    Source,
    /// Filter modifier placed after `SELECT`, such as `TOP 10` or `DISTINCT`.
    Filter,
    /// Selected columns.
    Columns,
    /// `WHERE` predicate.
    Predicate,
    /// `GROUP BY`.
    GroupBy,
    /// `HAVING`.
    Having,
    /// `ORDER BY`.
    OrderBy,
    /// Raw SQL text.
    Sql,
    /// Stored procedure name.
    Procedure,
    /// `UPDATE ... SET` values.
    UpdateValues,
    /// Rows to insert.
    InsertRows,
    /// Page size.
    PageSize,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Filter => "filter",
            Self::Columns => "columns",
            Self::Predicate => "where",
            Self::GroupBy => "group by",
            Self::Having => "having",
            Self::OrderBy => "order by",
            Self::Sql => "raw SQL",
            Self::Procedure => "stored procedure",
            Self::UpdateValues => "update values",
            Self::InsertRows => "insert rows",
            Self::PageSize => "page size",
        };
        f.write_str(name)
    }
}

/// A build-then-execute session for one logical statement.
///
/// Clause methods consume and return the builder. Nothing is validated until
/// `finalize`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) source: Option<String>,
    pub(crate) filter: Option<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) predicate: Option<String>,
    pub(crate) group_by: Option<String>,
    pub(crate) having: Option<String>,
    pub(crate) order_by: Option<String>,
    pub(crate) outer_order_by: Option<String>,
    pub(crate) procedure: Option<String>,
    pub(crate) sql: Option<String>,
    pub(crate) params: Vec<Parameter>,
    pub(crate) values: Record,
    pub(crate) rows: Vec<Record>,
    pub(crate) table_type: Option<String>,
    pub(crate) page_number: u64,
    pub(crate) page_size: u64,
}

/// Stores a clause, treating blank text as unset.
fn clause(text: impl Into<String>) -> Option<String> {
    let text = text.into();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source table or expression.
    #[must_use]
    pub fn from(mut self, source: impl Into<String>) -> Self {
        self.source = clause(source);
        self
    }

    /// Sets the filter modifier placed after `SELECT`, e.g. `TOP 10`.
    #[must_use]
    pub fn filter(mut self, modifier: impl Into<String>) -> Self {
        self.filter = clause(modifier);
        self
    }

    /// Adds columns to select. Repeated calls accumulate.
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns
            .extend(columns.iter().filter_map(|c| clause(*c)));
        self
    }

    /// Adds one column to select.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.extend(clause(column));
        self
    }

    /// Sets the `WHERE` predicate.
    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = clause(predicate);
        self
    }

    /// Sets the `GROUP BY` expression.
    #[must_use]
    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by = clause(expr);
        self
    }

    /// Sets the `HAVING` expression.
    #[must_use]
    pub fn having(mut self, expr: impl Into<String>) -> Self {
        self.having = clause(expr);
        self
    }

    /// Sets the `ORDER BY` expression. For pages this orders the row numbers.
    #[must_use]
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by = clause(expr);
        self
    }

    /// Sets the order applied to a page after it is cut out.
    ///
    /// Only used by pages; it can only reference columns visible outside the
    /// paging subquery.
    #[must_use]
    pub fn outer_order_by(mut self, expr: impl Into<String>) -> Self {
        self.outer_order_by = clause(expr);
        self
    }

    /// Uses raw SQL text instead of clauses.
    #[must_use]
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = clause(sql);
        self
    }

    /// Calls a stored procedure instead of building SQL.
    #[must_use]
    pub fn procedure(mut self, name: impl Into<String>) -> Self {
        self.procedure = clause(name);
        self
    }

    /// Adds a parameter. A parameter with the same name is replaced.
    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        if let Some(existing) = self
            .params
            .iter_mut()
            .find(|p| p.name().eq_ignore_ascii_case(parameter.name()))
        {
            *existing = parameter;
        } else {
            self.params.push(parameter);
        }
        self
    }

    /// Adds a parameter by name and value.
    #[must_use]
    pub fn bind<T: ToSqlValue>(self, name: &str, value: T) -> Self {
        self.param(Parameter::new(name, value))
    }

    /// Adds an `UPDATE ... SET` value.
    #[must_use]
    pub fn set<T: ToSqlValue>(mut self, column: &str, value: T) -> Self {
        self.values.insert(column, value);
        self
    }

    /// Adds every column of `values` to the `UPDATE ... SET` values.
    #[must_use]
    pub fn set_values(mut self, values: &Record) -> Self {
        for (column, value) in values.iter() {
            self.values.insert(column, value);
        }
        self
    }

    /// Adds a row to insert.
    #[must_use]
    pub fn values(mut self, row: Record) -> Self {
        self.rows.push(row);
        self
    }

    /// Adds rows to insert.
    #[must_use]
    pub fn rows(mut self, rows: impl IntoIterator<Item = Record>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Inserts batches through one table-valued parameter of this
    /// server-side table type.
    #[must_use]
    pub fn table_type(mut self, type_name: impl Into<String>) -> Self {
        self.table_type = clause(type_name);
        self
    }

    /// Selects a zero-based page of `size` rows.
    #[must_use]
    pub const fn page(mut self, number: u64, size: u64) -> Self {
        self.page_number = number;
        self.page_size = size;
        self
    }

    /// Returns the caller-supplied parameters.
    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Returns true if the clause is declared.
    #[must_use]
    pub fn has(&self, clause: Clause) -> bool {
        match clause {
            Clause::Source => self.source.is_some(),
            Clause::Filter => self.filter.is_some(),
            Clause::Columns => !self.columns.is_empty(),
            Clause::Predicate => self.predicate.is_some(),
            Clause::GroupBy => self.group_by.is_some(),
            Clause::Having => self.having.is_some(),
            Clause::OrderBy => self.order_by.is_some(),
            Clause::Sql => self.sql.is_some(),
            Clause::Procedure => self.procedure.is_some(),
            Clause::UpdateValues => !self.values.is_empty(),
            Clause::InsertRows => !self.rows.is_empty(),
            Clause::PageSize => self.page_size > 0,
        }
    }

    /// Resolves the operation kind and validates the clause set.
    ///
    /// This is the only transition out of the builder: the returned
    /// `Prepared` owns the clauses and cannot be resolved again.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending clause when the
    /// clause set is not legal for `kind`.
    pub fn finalize(self, kind: OperationKind) -> Result<Prepared> {
        validate::validate(kind, &self)?;
        trace!(kind = %kind, "Query finalized");
        Ok(Prepared {
            kind,
            query: self,
            cursor: 0,
        })
    }
}

/// A validated query with its operation kind fixed.
///
/// Batched inserts are generated over several statements; the batch cursor
/// tracks the next row to insert.
#[derive(Debug, Clone)]
pub struct Prepared {
    kind: OperationKind,
    query: Query,
    cursor: usize,
}

impl Prepared {
    /// Returns the resolved operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the accumulated clauses.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Index of the next row a batched insert will generate.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns true when a batched insert has generated every row.
    ///
    /// Always false for other kinds, which can be generated repeatedly.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.kind == OperationKind::InsertBatch && self.cursor >= self.query.rows.len()
    }

    /// Generates the next statement, without caller parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the statement cannot be generated,
    /// for example when one insert row alone exceeds the parameter budget.
    pub fn generate(
        &mut self,
        settings: &Settings,
        encoder: &dyn TableValuedEncoder,
    ) -> Result<GeneratedStatement> {
        if self.is_exhausted() {
            return Err(QueryError::configuration(
                self.kind,
                "every insert row has already been generated",
            ));
        }
        generate::generate(self.kind, &self.query, &mut self.cursor, settings, encoder)
    }

    /// Generates the next statement and merges it with the caller
    /// parameters into a command, using the inferred table encoder.
    ///
    /// # Errors
    ///
    /// See [`Prepared::command_with`].
    pub fn command(&mut self, settings: &Settings) -> Result<Command> {
        self.command_with(settings, &InferredTableEncoder)
    }

    /// Generates the next statement and merges it with the caller
    /// parameters into a command.
    ///
    /// Caller parameters come first, generated ones after. SELECT and page
    /// statements are rewritten to shadow their parameters when enabled.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if generation fails, a parameter name
    /// is bound twice, or a shadow variable would reuse a bound name.
    pub fn command_with(
        &mut self,
        settings: &Settings,
        encoder: &dyn TableValuedEncoder,
    ) -> Result<Command> {
        let statement = self.generate(settings, encoder)?;
        let params = merge_params(self.kind, &self.query.params, statement.params)?;

        let text = if statement.shadow && settings.anti_sniffing {
            if let Some((param, other)) = sniffing::shadow_collision(&statement.sql, &params) {
                return Err(QueryError::configuration(
                    self.kind,
                    format!(
                        "parameter {} cannot be shadowed because {} is already bound",
                        param.placeholder(),
                        other.placeholder()
                    ),
                ));
            }
            sniffing::shadow_parameters(&statement.sql, &params)
        } else {
            statement.sql
        };

        Ok(Command {
            text,
            kind: statement.kind,
            timeout: settings.timeout(),
            params,
        })
    }

    /// Generates the next command of a batched insert, or `None` once
    /// every row has been generated.
    ///
    /// Other kinds produce the same command on every call.
    ///
    /// # Errors
    ///
    /// See [`Prepared::command_with`].
    pub fn next_statement(
        &mut self,
        settings: &Settings,
        encoder: &dyn TableValuedEncoder,
    ) -> Result<Option<Command>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        self.command_with(settings, encoder).map(Some)
    }
}

/// Merges caller parameters with generated ones.
fn merge_params(
    kind: OperationKind,
    caller: &[Parameter],
    generated: Vec<Parameter>,
) -> Result<Vec<Parameter>> {
    let mut params = caller.to_vec();
    params.extend(generated);

    let mut seen = HashSet::with_capacity(params.len());
    for param in &params {
        if !seen.insert(param.name().to_ascii_lowercase()) {
            return Err(QueryError::configuration(
                kind,
                format!("parameter {} is bound more than once", param.placeholder()),
            ));
        }
    }

    Ok(params)
}
