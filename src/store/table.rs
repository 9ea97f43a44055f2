use crate::store::value::{Record, Value};
use serde::Serialize;

/// An ordered sequence of records under a fixed column list.
///
/// Weekly layouts keep their computed total rows in `totals`, apart from the day
/// rows, so aggregations over `rows` never count a total twice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Record>,
    totals: Vec<Record>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self::with_rows(name, columns, Vec::new())
    }

    pub fn with_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
            totals: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn totals(&self) -> &[Record] {
        &self.totals
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn head(&self, limit: usize) -> &[Record] {
        &self.rows[..self.rows.len().min(limit)]
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Every data-row value of `name`, or `None` when the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    #[cfg(test)]
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Keeps only the named columns that exist, in the order given.
    pub fn project(&self, columns: &[String]) -> Table {
        let indexes = columns
            .iter()
            .filter_map(|column| self.column_index(column).map(|index| (column.clone(), index)))
            .collect::<Vec<_>>();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                Record::new(
                    indexes
                        .iter()
                        .map(|(_, index)| row.get(*index).cloned().unwrap_or_default())
                        .collect(),
                )
            })
            .collect();

        Table::with_rows(
            self.name.clone(),
            indexes.into_iter().map(|(column, _)| column).collect(),
            rows,
        )
    }

    pub(crate) fn push_row(&mut self, record: Record) {
        self.rows.push(record);
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Record] {
        &mut self.rows
    }

    pub(crate) fn set_totals(&mut self, totals: Vec<Record>) {
        self.totals = totals;
    }
}
