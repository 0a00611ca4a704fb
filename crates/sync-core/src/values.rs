//! Relational value representations.
//!
//! Rows arrive from triggers (or from the relational source when running
//! auxiliary queries) as ordered column → scalar mappings. Column order is
//! kept because several handlers read "the first column" of a query result.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A scalar relational value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// Boolean value
    Bool(bool),

    /// Integer value (all integer widths are widened to 64 bits)
    Int(i64),

    /// Floating point value
    Float(f64),

    /// Textual value (also used for types without a native variant,
    /// e.g. numerics, timestamps and UUIDs)
    Text(String),

    /// SQL NULL
    Null,
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as an i64.
    ///
    /// Text holding an integer is accepted, since drivers that speak the
    /// simple query protocol report every column as text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Stringify for storage in a directory attribute.
    ///
    /// Directories have no native boolean, so booleans become `TRUE` /
    /// `FALSE`. Null has no directory representation and yields `None`.
    pub fn to_directory_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => f.write_str("NULL"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One relational row: column name → value, in column order.
///
/// Handlers only ever read rows; the caller owns them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insertion.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column, replacing any previous value but keeping its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Get a column value. Absent columns and nulls are distinct: absent
    /// yields `None`, null yields `Some(SqlValue::Null)`.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Get a column value, treating null like an absent column.
    pub fn get_non_null(&self, column: &str) -> Option<&SqlValue> {
        self.get(column).filter(|value| !value.is_null())
    }

    /// The value of the first column, if any.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((column, value)) = access.next_entry::<String, SqlValue>()? {
                    row.insert(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_stringify_for_directory() {
        assert_eq!(
            SqlValue::Bool(true).to_directory_string().as_deref(),
            Some("TRUE")
        );
        assert_eq!(
            SqlValue::Bool(false).to_directory_string().as_deref(),
            Some("FALSE")
        );
    }

    #[test]
    fn test_scalars_stringify_naturally() {
        assert_eq!(SqlValue::Int(42).to_directory_string().unwrap(), "42");
        assert_eq!(SqlValue::Float(1.5).to_directory_string().unwrap(), "1.5");
        assert_eq!(SqlValue::from("x").to_directory_string().unwrap(), "x");
        assert_eq!(SqlValue::Null.to_directory_string(), None);
    }

    #[test]
    fn test_row_keeps_column_order() {
        let row = Row::new().with("b", 1).with("a", 2).with("b", 3);
        let columns: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&SqlValue::Int(3)));
        assert_eq!(row.first_value(), Some(&SqlValue::Int(3)));
    }

    #[test]
    fn test_absent_and_null_columns_differ() {
        let row = Row::new().with("mail", SqlValue::Null);
        assert_eq!(row.get("mail"), Some(&SqlValue::Null));
        assert_eq!(row.get_non_null("mail"), None);
        assert_eq!(row.get("other"), None);
    }

    #[test]
    fn test_row_deserializes_from_json_in_order() {
        let row: Row = serde_json::from_str(r#"{"z": 1, "a": "x", "m": null, "b": true}"#).unwrap();
        let columns: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["z", "a", "m", "b"]);
        assert_eq!(row.get("z"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("m"), Some(&SqlValue::Null));
        assert_eq!(row.get("b"), Some(&SqlValue::Bool(true)));
    }

    #[test]
    fn test_text_counts_parse_as_integers() {
        assert_eq!(SqlValue::from("3").as_i64(), Some(3));
        assert_eq!(SqlValue::Int(0).as_i64(), Some(0));
        assert_eq!(SqlValue::Null.as_i64(), None);
    }
}
