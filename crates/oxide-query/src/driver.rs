//! Contracts for the database driver.
//!
//! The session only talks to the database through these traits. A driver
//! opens connections (`Connect`), runs commands on them (`Connection`) and
//! exposes result sets through a forward-only `Cursor`. Row batches for
//! table-valued inserts are encoded by a `TableValuedEncoder`.

use std::time::Duration;

use thiserror::Error;

use crate::error::{QueryError, Result};
use crate::param::{Parameter, TableValue};
use crate::query::OperationKind;
use crate::record::Record;
use crate::value::SqlValue;

/// An error reported by the driver or the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    code: Option<i32>,
}

impl DriverError {
    /// Creates a driver error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a driver error carrying a vendor error number.
    #[must_use]
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the vendor error number, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// The text is a stored procedure name.
    StoredProcedure,
}

/// A statement ready to hand to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// SQL text or stored procedure name.
    pub text: String,
    /// How `text` is interpreted.
    pub kind: CommandKind,
    /// Command timeout.
    pub timeout: Duration,
    /// Parameters, caller-supplied first.
    pub params: Vec<Parameter>,
}

impl Command {
    /// Returns the parameter with the given name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        let name = name.trim_start_matches('@');
        self.params.iter().find(|p| p.name() == name)
    }
}

/// Outcome of a non-query execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Execution {
    /// Rows affected by the statement.
    pub rows_affected: u64,
    /// Values written to output parameters, by parameter name.
    pub outputs: Vec<(String, SqlValue)>,
}

impl Execution {
    /// Creates an execution result without output values.
    #[must_use]
    pub const fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            outputs: Vec::new(),
        }
    }

    /// Adds an output parameter value.
    #[must_use]
    pub fn with_output(mut self, name: &str, value: SqlValue) -> Self {
        self.outputs
            .push((String::from(name.trim_start_matches('@')), value));
        self
    }

    /// Returns the value written to an output parameter.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&SqlValue> {
        let name = name.trim_start_matches('@');
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Opens connections from a connection string.
pub trait Connect {
    /// The connection type produced.
    type Connection: Connection;

    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the connection cannot be established.
    fn connect(
        &self,
        connection_string: &str,
    ) -> std::result::Result<Self::Connection, DriverError>;
}

/// One open database connection.
///
/// Statements run against the current transaction when one is open. A
/// connection runs one statement at a time; an open cursor borrows the
/// connection until it is dropped.
pub trait Connection {
    /// Cursor over the result sets of a query.
    type Cursor<'c>: Cursor
    where
        Self: 'c;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure.
    fn begin(&mut self) -> std::result::Result<(), DriverError>;

    /// Commits the current transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure.
    fn commit(&mut self) -> std::result::Result<(), DriverError>;

    /// Rolls back the current transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure.
    fn rollback(&mut self) -> std::result::Result<(), DriverError>;

    /// Runs a command that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the database rejects the command.
    fn execute(&mut self, command: &Command) -> std::result::Result<Execution, DriverError>;

    /// Runs a command and returns the first column of the first row, or
    /// `SqlValue::Null` when there is none.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the database rejects the command.
    fn scalar(&mut self, command: &Command) -> std::result::Result<SqlValue, DriverError>;

    /// Runs a command and opens a cursor on its result sets.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the database rejects the command.
    fn query(&mut self, command: &Command) -> std::result::Result<Self::Cursor<'_>, DriverError>;
}

/// A forward-only cursor over one or more result sets.
///
/// A fresh cursor is positioned before the first row of the first result set.
/// Column metadata describes the current result set.
pub trait Cursor {
    /// Number of columns in the current result set.
    fn column_count(&self) -> usize;

    /// Name of a column in the current result set.
    fn column_name(&self, index: usize) -> &str;

    /// Returns true if the column of the current row is NULL.
    fn is_null(&self, index: usize) -> bool;

    /// Value of a column of the current row.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the value cannot be decoded.
    fn value(&self, index: usize) -> std::result::Result<SqlValue, DriverError>;

    /// Advances to the next row. Returns false past the last row.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure.
    fn next_row(&mut self) -> std::result::Result<bool, DriverError>;

    /// Advances to the next result set. Returns false past the last one.
    ///
    /// # Errors
    ///
    /// Returns the driver error on failure.
    fn next_result(&mut self) -> std::result::Result<bool, DriverError>;
}

/// Encodes a row batch into a single table-valued parameter.
pub trait TableValuedEncoder {
    /// Encodes `rows` as a parameter named `name` of the server-side table
    /// type `type_name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the rows cannot be encoded.
    fn encode(&self, name: &str, type_name: &str, rows: &[Record]) -> Result<Parameter>;
}

/// Encoder that infers column types from the first row.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferredTableEncoder;

impl TableValuedEncoder for InferredTableEncoder {
    fn encode(&self, name: &str, type_name: &str, rows: &[Record]) -> Result<Parameter> {
        let first = rows.first().ok_or_else(|| {
            QueryError::configuration(
                OperationKind::InsertBatch,
                "a table-valued insert needs at least one row",
            )
        })?;

        let columns: Vec<_> = first
            .iter()
            .map(|(column, value)| (String::from(column), value.infer_type()))
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|(column, _)| row.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Parameter::table(
            name,
            TableValue {
                type_name: String::from(type_name),
                columns,
                rows,
            },
        ))
    }
}
