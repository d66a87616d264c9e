//! Error types for building and executing queries.

use thiserror::Error;

use crate::driver::DriverError;
use crate::query::{Clause, OperationKind, Rule};
use crate::value::SqlValue;

/// Errors raised while validating, generating or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A clause is missing or not allowed for the operation kind.
    #[error("{kind} query {rule} the {clause} clause")]
    InvalidClause {
        /// The resolved operation kind.
        kind: OperationKind,
        /// The offending clause.
        clause: Clause,
        /// Whether the clause is required or forbidden.
        rule: Rule,
    },

    /// Any other misconfiguration detected before the statement runs.
    #[error("{kind} query: {message}")]
    Configuration {
        /// The resolved operation kind.
        kind: OperationKind,
        /// What is wrong.
        message: String,
    },

    /// The driver or database rejected the statement.
    #[error("database error: {0}")]
    Database(#[from] DriverError),

    /// A value could not be converted to the requested type.
    #[error("cannot convert {value} to {target}")]
    Conversion {
        /// The value, rendered as a SQL literal.
        value: String,
        /// The requested Rust type.
        target: &'static str,
    },

    /// Settings could not be parsed.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl QueryError {
    /// Creates a configuration error.
    pub(crate) fn configuration(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::Configuration {
            kind,
            message: message.into(),
        }
    }

    /// Creates a conversion error.
    pub(crate) fn conversion(value: &SqlValue, target: &'static str) -> Self {
        Self::Conversion {
            value: value.to_string(),
            target,
        }
    }

    /// Returns true if the error was raised before reaching the database.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidClause { .. } | Self::Configuration { .. })
    }
}

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
