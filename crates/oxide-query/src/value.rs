//! SQL values and their declared types.
//!
//! Values travel between the builder, the driver and row records as a closed
//! set of scalar kinds. `ToSqlValue` turns Rust values into `SqlValue`s and
//! `FromSqlValue` turns them back.

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{QueryError, Result};

/// A SQL value that can be bound as a parameter or read from a result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Exact decimal value.
    Decimal(BigDecimal),
    /// Text value.
    Text(String),
    /// Date and time value.
    DateTime(NaiveDateTime),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns true for `SqlValue::Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the name of the value kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::DateTime(_) => "datetime",
            Self::Blob(_) => "blob",
        }
    }

    /// Infers the declared SQL type for this value.
    ///
    /// An untyped `NULL` is declared the way drivers bind it, as
    /// `NVARCHAR(4000)`, so it stays usable in string and date expressions.
    #[must_use]
    pub fn infer_type(&self) -> SqlType {
        match self {
            Self::Null => SqlType::NVarChar(Some(UNTYPED_NULL_LENGTH)),
            Self::Bool(_) => SqlType::Bit,
            Self::Int(_) => SqlType::BigInt,
            Self::Float(_) => SqlType::Float,
            Self::Decimal(d) => {
                let (_, exponent) = d.as_bigint_and_exponent();
                let scale = u8::try_from(exponent.clamp(0, i64::from(MAX_DECIMAL_PRECISION)))
                    .unwrap_or(MAX_DECIMAL_PRECISION);
                SqlType::Decimal(MAX_DECIMAL_PRECISION, scale)
            }
            Self::Text(_) => SqlType::NVarChar(None),
            Self::DateTime(_) => SqlType::DateTime2,
            Self::Blob(_) => SqlType::VarBinary(None),
        }
    }

    /// Returns a hashable key with the same equality as `PartialEq`.
    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int(n) => ValueKey::Int(*n),
            Self::Float(f) => ValueKey::Float(f.to_bits()),
            Self::Decimal(d) => ValueKey::Decimal(d.normalized().to_string()),
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::DateTime(dt) => ValueKey::DateTime(*dt),
            Self::Blob(b) => ValueKey::Blob(b.clone()),
        }
    }
}

/// Renders the value as an escaped SQL literal.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => {
                // Escape single quotes by doubling them
                let escaped = s.replace('\'', "''");
                write!(f, "N'{escaped}'")
            }
            Self::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                write!(f, "0x{hex}")
            }
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Decimal(d) => serializer.serialize_str(&d.to_string()),
            Self::Text(s) => serializer.serialize_str(s),
            Self::DateTime(dt) => dt.serialize(serializer),
            Self::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

/// Hash key used when deduplicating parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Decimal(String),
    Text(String),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
}

/// Length declared for a `NULL` parameter without an explicit type.
pub const UNTYPED_NULL_LENGTH: u32 = 4000;

/// Largest precision a `DECIMAL` can declare.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// A declared driver type.
///
/// Used for explicitly typed parameters and for the local variables declared
/// by the parameter-sniffing rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    /// `BIT`
    Bit,
    /// `INT`
    Int,
    /// `BIGINT`
    BigInt,
    /// `FLOAT`
    Float,
    /// `DECIMAL(precision, scale)`
    Decimal(u8, u8),
    /// `NVARCHAR(n)`, or `NVARCHAR(MAX)` without a length.
    NVarChar(Option<u32>),
    /// `DATE`
    Date,
    /// `DATETIME2`
    DateTime2,
    /// `VARBINARY(n)`, or `VARBINARY(MAX)` without a length.
    VarBinary(Option<u32>),
    /// `SQL_VARIANT`
    Variant,
    /// A server-side table type, by name.
    Structured(String),
}

impl SqlType {
    /// Returns the type as written in a `DECLARE` statement.
    #[must_use]
    pub fn declaration(&self) -> String {
        match self {
            Self::Bit => String::from("BIT"),
            Self::Int => String::from("INT"),
            Self::BigInt => String::from("BIGINT"),
            Self::Float => String::from("FLOAT"),
            Self::Decimal(precision, scale) => format!("DECIMAL({precision}, {scale})"),
            Self::NVarChar(Some(n)) => format!("NVARCHAR({n})"),
            Self::NVarChar(None) => String::from("NVARCHAR(MAX)"),
            Self::Date => String::from("DATE"),
            Self::DateTime2 => String::from("DATETIME2"),
            Self::VarBinary(Some(n)) => format!("VARBINARY({n})"),
            Self::VarBinary(None) => String::from("VARBINARY(MAX)"),
            Self::Variant => String::from("SQL_VARIANT"),
            Self::Structured(name) => name.clone(),
        }
    }

    /// Applies an explicit size to length-carrying types without one.
    #[must_use]
    pub fn with_size(self, size: u32) -> Self {
        match self {
            Self::NVarChar(None) => Self::NVarChar(Some(size)),
            Self::VarBinary(None) => Self::VarBinary(Some(size)),
            other => other,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration())
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for &SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self.clone()
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

macro_rules! int_to_sql_value {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(self) -> SqlValue {
                    SqlValue::Int(i64::from(self))
                }
            }
        )*
    };
}

int_to_sql_value!(i64, i32, i16, i8, u32, u16, u8);

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for BigDecimal {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Decimal(self)
    }
}

impl ToSqlValue for &BigDecimal {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Decimal(self.clone())
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::DateTime(self)
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::DateTime(self.and_time(chrono::NaiveTime::MIN))
    }
}

impl ToSqlValue for DateTime<Utc> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::DateTime(self.naive_utc())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

/// Trait for types that can be read back from SQL values.
///
/// Conversions are lenient in the way a driver's "change type" is: numbers
/// convert between integer and float kinds when no precision is lost, text is
/// parsed, and booleans read as `0`/`1`. `NULL` only converts into `Option`
/// and `SqlValue`.
pub trait FromSqlValue: Sized {
    /// Converts a `SqlValue` into `Self`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Conversion` if the value has no sensible
    /// representation as `Self`.
    fn from_sql_value(value: SqlValue) -> Result<Self>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql_value(value).map(Some)
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn as_i64(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Int(n) => Some(*n),
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Float(f)
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
        {
            Some(*f as i64)
        }
        SqlValue::Decimal(d) if d.with_scale(0) == *d => d.with_scale(0).to_string().parse().ok(),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! int_from_sql_value {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> Result<Self> {
                    as_i64(&value)
                        .and_then(|n| <$ty>::try_from(n).ok())
                        .ok_or_else(|| QueryError::conversion(&value, stringify!($ty)))
                }
            }
        )*
    };
}

int_from_sql_value!(i64, i32, i16, i8, u64, u32, u16, u8);

impl FromSqlValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Float(f) => Ok(*f),
            SqlValue::Int(n) => Ok(*n as f64),
            SqlValue::Decimal(d) => d
                .to_string()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "f64")),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "f64")),
            _ => Err(QueryError::conversion(&value, "f64")),
        }
    }
}

impl FromSqlValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        f64::from_sql_value(value).map(|f| f as f32)
    }
}

impl FromSqlValue for BigDecimal {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Decimal(d) => Ok(d.clone()),
            SqlValue::Int(n) => Ok(Self::from(*n)),
            SqlValue::Float(f) if f.is_finite() => f
                .to_string()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "BigDecimal")),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "BigDecimal")),
            _ => Err(QueryError::conversion(&value, "BigDecimal")),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(0) => Ok(false),
            SqlValue::Int(1) => Ok(true),
            SqlValue::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            SqlValue::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(QueryError::conversion(&value, "bool")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Int(n) => Ok(n.to_string()),
            SqlValue::Float(f) => Ok(f.to_string()),
            SqlValue::Decimal(d) => Ok(d.to_string()),
            SqlValue::Bool(b) => Ok(b.to_string()),
            SqlValue::DateTime(dt) => Ok(dt.to_string()),
            other => Err(QueryError::conversion(&other, "String")),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            other => Err(QueryError::conversion(&other, "Vec<u8>")),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "NaiveDateTime")),
            _ => Err(QueryError::conversion(&value, "NaiveDateTime")),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match &value {
            SqlValue::DateTime(dt) => Ok(dt.date()),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| QueryError::conversion(&value, "NaiveDate")),
            _ => Err(QueryError::conversion(&value, "NaiveDate")),
        }
    }
}
