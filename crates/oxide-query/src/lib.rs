//! # oxide-query
//!
//! A clause-based SQL statement builder and execution facade for SQL Server.
//!
//! This crate provides:
//! - A `Query` builder that accumulates clauses, raw SQL or a stored
//!   procedure call and validates them once against the operation kind
//! - Generators for selects, single-row selects, `ROW_NUMBER()` paging,
//!   counts, updates, deletes and inserts (single, batched under the driver's
//!   parameter ceiling, or table-valued)
//! - A parameter-sniffing rewrite that reads parameters through local
//!   variables
//! - A blocking `Session` that shapes results as row records, scalars,
//!   cursors, lazy iterators or multiple result sets
//!
//! The database driver is reached through the traits in [`driver`].
//!
//! ## Building a statement
//!
//! ```rust
//! use oxide_query::{OperationKind, Query, Settings};
//!
//! let mut page = Query::new()
//!     .from("orders")
//!     .where_clause("customer_id = @customer")
//!     .bind("customer", 42)
//!     .order_by("created_at DESC")
//!     .page(1, 20)
//!     .finalize(OperationKind::Page)
//!     .unwrap();
//!
//! let command = page.command(&Settings::default()).unwrap();
//! assert!(command.text.starts_with("DECLARE @__customer BIGINT = @customer;"));
//! assert!(command.text.contains("__row BETWEEN 21 AND 40"));
//! ```
//!
//! ## Invalid clause sets
//!
//! ```rust
//! use oxide_query::{OperationKind, Query};
//!
//! let err = Query::new()
//!     .from("users")
//!     .set("name", "Bob")
//!     .finalize(OperationKind::Update)
//!     .unwrap_err();
//! assert_eq!(err.to_string(), "Update query requires the where clause");
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod generate;
pub mod mapping;
pub mod param;
pub mod query;
pub mod record;
pub mod session;
pub mod sniffing;
pub mod value;

pub use bigdecimal::BigDecimal;
pub use config::{
    Limits, Settings, DEFAULT_COMMAND_TIMEOUT_SECS, MAX_INSERT_ROWS, MAX_PARAMETERS,
};
pub use driver::{
    Command, CommandKind, Connect, Connection, Cursor, DriverError, Execution,
    InferredTableEncoder, TableValuedEncoder,
};
pub use error::{QueryError, Result};
pub use generate::GeneratedStatement;
pub use mapping::FromRecord;
pub use param::{Direction, ParamValue, Parameter, TableValue};
pub use query::{Clause, OperationKind, Prepared, Query, Rule};
pub use record::Record;
pub use session::{RowIter, Session};
pub use value::{FromSqlValue, SqlType, SqlValue, ToSqlValue};
