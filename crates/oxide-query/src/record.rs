//! Row records.
//!
//! A `Record` is one result row as an ordered column name to value mapping.
//! Rows read from the same result set share their column list.

use std::collections::HashSet;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::driver::Cursor;
use crate::error::Result;
use crate::value::{FromSqlValue, SqlValue, ToSqlValue};

/// An ordered mapping from column name to value with unique keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Adds or replaces a column value.
    #[must_use]
    pub fn with<T: ToSqlValue>(mut self, column: &str, value: T) -> Self {
        self.insert(column, value);
        self
    }

    /// Adds or replaces a column value.
    pub fn insert<T: ToSqlValue>(&mut self, column: &str, value: T) {
        let value = value.to_sql_value();
        if let Some(index) = self.position(column) {
            self.values[index] = value;
        } else {
            Arc::make_mut(&mut self.columns).push(String::from(column));
            self.values.push(value);
        }
    }

    /// Returns the value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.position(column).map(|index| &self.values[index])
    }

    /// Returns the value of a column converted to `T`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Conversion` when the value cannot be converted.
    pub fn get_as<T: FromSqlValue>(&self, column: &str) -> Result<Option<T>> {
        self.get(column)
            .cloned()
            .map(T::from_sql_value)
            .transpose()
    }

    /// Returns true if the record has the column.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the record has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Renders the record as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

impl<K: AsRef<str>, V: ToSqlValue> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column.as_ref(), value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Makes result-set column names unique.
///
/// A repeated name gets a counter suffix (`id`, `id1`, `id2`); suffixes that
/// would collide with another column of the result set are skipped.
pub(crate) fn unique_column_names(names: Vec<String>) -> Vec<String> {
    let original: HashSet<String> = names.iter().cloned().collect();
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        if used.insert(name.clone()) {
            unique.push(name);
            continue;
        }
        let mut counter = 1_usize;
        let candidate = loop {
            let candidate = format!("{name}{counter}");
            if !used.contains(&candidate) && !original.contains(&candidate) {
                break candidate;
            }
            counter += 1;
        };
        used.insert(candidate.clone());
        unique.push(candidate);
    }

    unique
}

/// Reads the column names of the cursor's current result set.
pub(crate) fn column_names<K: Cursor + ?Sized>(cursor: &K) -> Arc<Vec<String>> {
    let names = (0..cursor.column_count())
        .map(|index| String::from(cursor.column_name(index)))
        .collect();
    Arc::new(unique_column_names(names))
}

/// Reads the row the cursor is positioned on.
pub(crate) fn read_row<K: Cursor + ?Sized>(
    cursor: &K,
    columns: &Arc<Vec<String>>,
) -> Result<Record> {
    let mut values = Vec::with_capacity(columns.len());
    for index in 0..columns.len() {
        if cursor.is_null(index) {
            values.push(SqlValue::Null);
        } else {
            values.push(cursor.value(index)?);
        }
    }
    Ok(Record::from_parts(Arc::clone(columns), values))
}

/// Reads every remaining row of the cursor's current result set.
pub(crate) fn read_result_set<K: Cursor + ?Sized>(cursor: &mut K) -> Result<Vec<Record>> {
    let columns = column_names(cursor);
    let mut records = Vec::new();
    while cursor.next_row()? {
        records.push(read_row(cursor, &columns)?);
    }
    Ok(records)
}
