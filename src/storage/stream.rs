//! Rows returned by `project`, merged by key across the files read.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::query::filter::{Filter, FilterRow};
use crate::storage::file::ResultTable;
use crate::types::{DataType, Tags, Value};

/// One output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Logical path of the column.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
    /// Tags of the series backing the column.
    pub tags: Tags,
}

/// Column layout shared by every row of a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Columns in output order.
    pub fields: Vec<Field>,
}

impl Header {
    /// Position of the column named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A key plus one optional value per header column.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Row key.
    pub key: i64,
    /// Values aligned with [`Header::fields`].
    pub values: Vec<Option<Value>>,
    header: Arc<Header>,
}

impl Row {
    /// Header the row is laid out against.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Value of the column named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.header
            .index_of(name)
            .and_then(|i| self.values.get(i))
            .and_then(Option::as_ref)
    }
}

impl FilterRow for Row {
    fn key(&self) -> i64 {
        self.key
    }

    fn value(&self, path: &str) -> Option<&Value> {
        self.get(path)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        for value in &self.values {
            match value {
                Some(v) => write!(f, "\t{v}")?,
                None => f.write_str("\tnull")?,
            }
        }
        Ok(())
    }
}

/// Ascending-key iterator over projected rows.
#[derive(Debug)]
pub struct RowStream {
    header: Arc<Header>,
    rows: std::vec::IntoIter<Row>,
}

impl RowStream {
    /// Stream with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            header: Arc::new(Header::default()),
            rows: Vec::new().into_iter(),
        }
    }

    /// Merges per-file tables (paired with their logical path) into rows by
    /// key, keeping only rows that satisfy `filter`.
    pub fn from_tables(tables: Vec<(String, ResultTable)>, filter: Option<&Filter>) -> Self {
        let width = tables.len();
        let mut fields = Vec::with_capacity(width);
        let mut by_key: BTreeMap<i64, Vec<Option<Value>>> = BTreeMap::new();
        for (col, (name, table)) in tables.into_iter().enumerate() {
            fields.push(Field {
                name,
                data_type: table.data_type,
                tags: table.tags,
            });
            for record in table.records {
                by_key
                    .entry(record.key)
                    .or_insert_with(|| vec![None; width])[col] = Some(record.value);
            }
        }
        let header = Arc::new(Header { fields });
        let compiled = filter.map(Filter::compile);
        let rows: Vec<Row> = by_key
            .into_iter()
            .map(|(key, values)| Row {
                key,
                values,
                header: Arc::clone(&header),
            })
            .filter(|row| compiled.as_ref().map_or(true, |f| f.evaluate(row)))
            .collect();
        Self {
            header,
            rows: rows.into_iter(),
        }
    }

    /// Column layout of the stream.
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl Iterator for RowStream {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
