//! Owned result sets returned by [`SqliteConnection`](crate::SqliteConnection).

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

/// A single SQLite value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text (invalid sequences replaced)
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// Result of one statement.
///
/// Statements that return no columns (DDL, INSERT, UPDATE, ...) produce an
/// empty `columns` list and report the number of changed rows in `affected`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rows {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// Row values, one inner vector per row.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a non-query statement.
    pub affected: usize,
}

impl Rows {
    /// Number of rows returned.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row was returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row`, column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row)?.get(col)
    }
}
