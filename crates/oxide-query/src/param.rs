//! Bound parameters.
//!
//! A `Parameter` is what the driver receives: a name, a value and optionally
//! an explicit type, size and direction. `NULL` is bound as an explicit
//! `SqlValue::Null` so that it is never confused with a parameter that was not
//! supplied at all.

use std::collections::{HashMap, HashSet};

use crate::value::{SqlType, SqlValue, ToSqlValue, ValueKey};

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Value flows from the caller to the statement.
    #[default]
    Input,
    /// Value is written by the statement and read back after execution.
    Output,
}

/// A whole row batch encoded as one structured value.
#[derive(Debug, Clone, PartialEq)]
pub struct TableValue {
    /// The server-side table type name.
    pub type_name: String,
    /// Column names and their declared types, in order.
    pub columns: Vec<(String, SqlType)>,
    /// Row values, in column order.
    pub rows: Vec<Vec<SqlValue>>,
}

/// The value carried by a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A single scalar.
    Scalar(SqlValue),
    /// A table-valued parameter.
    Table(TableValue),
}

/// A named parameter bound to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: ParamValue,
    sql_type: Option<SqlType>,
    size: Option<u32>,
    direction: Direction,
}

impl Parameter {
    /// Creates an input parameter.
    ///
    /// A leading `@` in the name is ignored.
    #[must_use]
    pub fn new<T: ToSqlValue>(name: &str, value: T) -> Self {
        Self {
            name: normalize_name(name),
            value: ParamValue::Scalar(value.to_sql_value()),
            sql_type: None,
            size: None,
            direction: Direction::Input,
        }
    }

    /// Creates an input parameter with an explicit type.
    #[must_use]
    pub fn typed<T: ToSqlValue>(name: &str, value: T, sql_type: SqlType) -> Self {
        Self::new(name, value).with_type(sql_type)
    }

    /// Creates an output parameter.
    #[must_use]
    pub fn output(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: normalize_name(name),
            value: ParamValue::Scalar(SqlValue::Null),
            sql_type: Some(sql_type),
            size: None,
            direction: Direction::Output,
        }
    }

    /// Creates a table-valued parameter.
    #[must_use]
    pub fn table(name: &str, table: TableValue) -> Self {
        let sql_type = SqlType::Structured(table.type_name.clone());
        Self {
            name: normalize_name(name),
            value: ParamValue::Table(table),
            sql_type: Some(sql_type),
            size: None,
            direction: Direction::Input,
        }
    }

    /// Sets an explicit type.
    #[must_use]
    pub fn with_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Sets an explicit size.
    #[must_use]
    pub const fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Returns the name without the `@` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name as referenced in SQL text.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("@{}", self.name)
    }

    /// Returns the bound value.
    #[must_use]
    pub const fn value(&self) -> &ParamValue {
        &self.value
    }

    /// Returns the scalar value, if this is not a table-valued parameter.
    #[must_use]
    pub const fn scalar(&self) -> Option<&SqlValue> {
        match &self.value {
            ParamValue::Scalar(v) => Some(v),
            ParamValue::Table(_) => None,
        }
    }

    /// Returns the explicit type, if any.
    #[must_use]
    pub const fn sql_type(&self) -> Option<&SqlType> {
        self.sql_type.as_ref()
    }

    /// Returns the explicit size, if any.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        self.size
    }

    /// Returns the direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true for table-valued parameters.
    #[must_use]
    pub const fn is_table(&self) -> bool {
        matches!(self.value, ParamValue::Table(_))
    }

    /// Returns the type to declare for this parameter: the explicit one, or
    /// one inferred from the value, with the explicit size applied.
    #[must_use]
    pub fn declared_type(&self) -> SqlType {
        let sql_type = match (&self.sql_type, &self.value) {
            (Some(t), _) => t.clone(),
            (None, ParamValue::Scalar(v)) => v.infer_type(),
            (None, ParamValue::Table(t)) => SqlType::Structured(t.type_name.clone()),
        };
        match self.size {
            Some(size) => sql_type.with_size(size),
            None => sql_type,
        }
    }
}

/// Strips a leading `@` from a parameter name.
pub(crate) fn normalize_name(name: &str) -> String {
    String::from(name.trim().trim_start_matches('@'))
}

/// Derives a parameter name from a column expression.
///
/// Keeps alphanumerics and `_`, so `[Order Date]` becomes `OrderDate`.
pub(crate) fn column_param_name(column: &str) -> String {
    let name: String = column
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        String::from("p")
    } else {
        name
    }
}

/// Binds values to generated parameters, sharing one parameter between
/// identical values.
#[derive(Debug)]
pub(crate) struct ParamBinder {
    prefix: &'static str,
    slots: HashMap<ValueKey, String>,
    params: Vec<Parameter>,
}

impl ParamBinder {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            slots: HashMap::new(),
            params: Vec::new(),
        }
    }

    /// Number of parameters bound so far.
    pub(crate) fn len(&self) -> usize {
        self.params.len()
    }

    /// Number of new parameters binding `values` would add.
    pub(crate) fn cost<'a>(&self, values: impl IntoIterator<Item = &'a SqlValue>) -> usize {
        values
            .into_iter()
            .map(SqlValue::key)
            .filter(|key| !self.slots.contains_key(key))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Binds a value and returns the placeholder to use in SQL.
    pub(crate) fn bind(&mut self, value: &SqlValue) -> String {
        let key = value.key();
        if let Some(placeholder) = self.slots.get(&key) {
            return placeholder.clone();
        }
        let name = format!("{}{}", self.prefix, self.params.len());
        let parameter = Parameter::new(&name, value);
        let placeholder = parameter.placeholder();
        self.params.push(parameter);
        self.slots.insert(key, placeholder.clone());
        placeholder
    }

    pub(crate) fn into_params(self) -> Vec<Parameter> {
        self.params
    }
}
