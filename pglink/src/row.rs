//! Postgres row operation.
//!
//! - [`Row`]
//! - [`QueryResult`]
use std::{fmt, sync::Arc};

use crate::postgres::backend::CommandComplete;

/// Postgres row, delivered to the row callback of [`Connection::query`][q].
///
/// Values are in text format, [`None`] is SQL `NULL`. Column names are shared between
/// every row of one query.
///
/// [q]: crate::Connection::query
#[derive(Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Caller guarantee that `values` has the same length as `columns`.
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column values, in order.
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Get value by column index.
    ///
    /// Returns [`None`] if index is out of bounds or the value is `NULL`.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx)?.as_deref()
    }

    /// Get value by column name, the first column with that name wins.
    ///
    /// Returns [`None`] if there is no such column or the value is `NULL`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|e| e == name)?;
        self.get(idx)
    }

    /// Consume self into the owned values.
    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }
}

impl IntoIterator for Row {
    type Item = (String, Option<String>);

    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { columns: self.columns, values: self.values.into_iter(), iter_n: 0 }
    }
}

/// [`IntoIterator`] implementation from [`Row`].
#[derive(Debug)]
pub struct IntoIter {
    columns: Arc<[String]>,
    values: std::vec::IntoIter<Option<String>>,
    iter_n: usize,
}

impl Iterator for IntoIter {
    type Item = (String, Option<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        let name = self.columns.get(self.iter_n)?.clone();
        self.iter_n += 1;
        Some((name, value))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (key, value) in self.columns.iter().zip(&self.values) {
            dbg.key(key);
            match value {
                Some(value) => dbg.value(value),
                None => dbg.value(&format_args!("NULL")),
            };
        }
        dbg.finish()
    }
}

/// Outcome of a completed query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Number of rows affected, or returned, by the command.
    pub rows_affected: u64,
    /// The command tag, empty for an empty query string.
    pub tag: String,
}

impl From<CommandComplete> for QueryResult {
    fn from(value: CommandComplete) -> Self {
        Self { rows_affected: value.rows_affected(), tag: value.tag }
    }
}
