//! Mapping records onto typed values.
//!
//! Implement `FromRecord` by hand, or derive it with
//! `#[derive(FromRecord)]` from `oxide-query-derive`:
//!
//! ```ignore
//! use oxide_query_derive::FromRecord;
//!
//! #[derive(Debug, Default, FromRecord)]
//! struct User {
//!     id: i64,
//!     #[record(rename = "user_name")]
//!     name: String,
//!     email: Option<String>,
//!     #[record(skip)]
//!     cached: bool,
//! }
//! ```
//!
//! Mapping never fails: columns without a matching field are ignored and
//! fields without a compatible column keep their default.

use crate::record::Record;
use crate::value::FromSqlValue;

/// Builds a value from a record.
pub trait FromRecord: Sized {
    /// Builds a value from the columns of `record`.
    fn from_record(record: &Record) -> Self;

    /// Builds one value per record.
    fn from_records(records: &[Record]) -> Vec<Self> {
        records.iter().map(Self::from_record).collect()
    }
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Self {
        record.clone()
    }
}

/// Converts the value of `column` into `slot`.
///
/// The column is matched exactly first, then ignoring ASCII case. `slot` is
/// left untouched when no column matches or the value does not convert.
pub fn assign<T: FromSqlValue>(record: &Record, column: &str, slot: &mut T) {
    let value = record.get(column).or_else(|| {
        record
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    });
    if let Some(Ok(value)) = value.map(|v| T::from_sql_value(v.clone())) {
        *slot = value;
    }
}
