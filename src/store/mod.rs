pub mod error;
pub mod recompute;
pub mod schema;
pub mod sheet;
pub mod table;
pub mod value;
pub mod workbook;

pub use error::{ErrorCategory, StoreError};
pub use schema::{Layout, TableSchema};
pub use table::Table;
pub use value::{Record, Value};

use crate::catalog::Catalog;
use recompute::recompute;
use sheet::{seeded_table, table_from_sheet};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use workbook::{Sheet, read_workbook, write_workbook};

/// One change to a weekly table: `row` is the day index, `0` being Monday.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub row: usize,
    pub column: String,
    pub value: Value,
}

/// Persists catalog tables as sheets of spreadsheet files under `root`.
///
/// Every write holds a per-file lock for the whole read-modify-rewrite, so
/// writers sharing one `TableStore` never lose each other's rows or sheets.
/// `save` writes a caller's snapshot as-is and the last snapshot wins. Separate processes writing the same file are not coordinated.
pub struct TableStore {
    root: PathBuf,
    catalog: Catalog,
    writers: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>, catalog: Catalog) -> Self {
        Self {
            root: root.into(),
            catalog,
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn schema(&self, table_id: &str) -> Result<&TableSchema, StoreError> {
        self.catalog
            .get(table_id)
            .ok_or_else(|| StoreError::UnknownTable(table_id.to_string()))
    }

    pub fn path_for(&self, schema: &TableSchema) -> PathBuf {
        self.root.join(&schema.file)
    }

    /// Returns the table, creating its file or sheet when absent.
    pub fn open(&self, table_id: &str) -> Result<Table, StoreError> {
        let schema = self.schema(table_id)?;
        let path = self.path_for(schema);
        let lock = self.writer(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (sheets, table, created) = self.read_or_seed(schema, &path)?;
        if created {
            self.persist(schema, &path, sheets, &table)?;
            info!(table = %schema.id, path = %path.display(), "table created");
        }
        Ok(table)
    }

    /// Reads the persisted table without ever creating it.
    pub fn load(&self, table_id: &str) -> Result<Table, StoreError> {
        let schema = self.schema(table_id)?;
        let path = self.path_for(schema);
        let not_found = || StoreError::NotFound {
            table: schema.id.clone(),
            path: path.clone(),
        };

        if !path.exists() {
            return Err(not_found());
        }
        let sheets = read_workbook(&path)?;
        let sheet = sheets
            .iter()
            .find(|sheet| sheet.name == schema.sheet)
            .ok_or_else(not_found)?;
        table_from_sheet(schema, sheet)
    }

    pub fn append(&self, table_id: &str, record: Record) -> Result<Table, StoreError> {
        let schema = self.schema(table_id)?;
        if schema.weekly_layout().is_some() {
            return Err(StoreError::LayoutMismatch {
                table: schema.id.clone(),
                operation: "append",
            });
        }
        check_record(schema, &record)?;

        let path = self.path_for(schema);
        let lock = self.writer(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (sheets, mut table, _) = self.read_or_seed(schema, &path)?;
        table.push_row(record);
        recompute(schema, &mut table);
        self.persist(schema, &path, sheets, &table)?;

        info!(table = %schema.id, rows = table.len(), "row appended");
        Ok(table)
    }

    pub fn update_cell(
        &self,
        table_id: &str,
        row: usize,
        column: &str,
        value: Value,
    ) -> Result<Table, StoreError> {
        self.update_cells(
            table_id,
            &[CellEdit {
                row,
                column: column.to_string(),
                value,
            }],
        )
    }

    /// Applies every edit, or none of them, then recomputes totals.
    pub fn update_cells(&self, table_id: &str, edits: &[CellEdit]) -> Result<Table, StoreError> {
        let schema = self.schema(table_id)?;
        let Some(weekly) = schema.weekly_layout() else {
            return Err(StoreError::LayoutMismatch {
                table: schema.id.clone(),
                operation: "cell update",
            });
        };

        let invalid = |reason: String| StoreError::InvalidEdit {
            table: schema.id.clone(),
            reason,
        };
        let mut targets = Vec::with_capacity(edits.len());
        for edit in edits {
            if edit.row >= weekly.days.len() {
                return Err(invalid(format!("row {} is not a day of the week", edit.row)));
            }
            let index = schema
                .column_index(&edit.column)
                .ok_or_else(|| invalid(format!("unknown column '{}'", edit.column)))?;
            let column = &schema.columns()[index];
            if !schema
                .editable_columns()
                .iter()
                .any(|editable| editable.name == column.name)
            {
                return Err(invalid(format!("column '{}' is not editable", column.name)));
            }
            if !column.kind.accepts(&edit.value) {
                return Err(invalid(format!(
                    "'{}' does not fit column '{}'",
                    edit.value, column.name
                )));
            }
            column
                .check_bounds(&edit.value)
                .map_err(|message| invalid(format!("'{}' {message}", column.name)))?;
            targets.push((edit.row, index, edit.value.clone()));
        }

        let path = self.path_for(schema);
        let lock = self.writer(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (sheets, mut table, _) = self.read_or_seed(schema, &path)?;
        for (row, index, value) in targets {
            if let Some(record) = table.rows_mut().get_mut(row) {
                record.set(index, value);
            }
        }
        recompute(schema, &mut table);
        self.persist(schema, &path, sheets, &table)?;

        info!(table = %schema.id, edits = edits.len(), "cells updated");
        Ok(table)
    }

    /// Persists a whole snapshot. Saves of snapshots taken from the same state
    /// are last-writer-wins.
    pub fn save(&self, table_id: &str, table: &Table) -> Result<Table, StoreError> {
        let schema = self.schema(table_id)?;
        if table.columns() != schema.column_names().as_slice() {
            return Err(StoreError::InvalidEdit {
                table: schema.id.clone(),
                reason: "columns differ from the table schema".to_string(),
            });
        }
        for record in table.rows() {
            check_width(schema, record)?;
        }

        let mut snapshot = Table::with_rows(schema.id.clone(), schema.column_names(), table.rows().to_vec());
        recompute(schema, &mut snapshot);

        let path = self.path_for(schema);
        let lock = self.writer(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let sheets = if path.exists() {
            ensure_writable(&path)?;
            read_workbook(&path)?
        } else {
            Vec::new()
        };
        self.persist(schema, &path, sheets, &snapshot)?;

        info!(table = %schema.id, rows = snapshot.len(), "table saved");
        Ok(snapshot)
    }

    fn writer(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(path.to_path_buf()).or_default().clone()
    }

    /// Current sheets of the file plus the decoded table; the flag is set when
    /// the table had to be seeded.
    fn read_or_seed(&self, schema: &TableSchema, path: &Path) -> Result<(Vec<Sheet>, Table, bool), StoreError> {
        if !path.exists() {
            return Ok((Vec::new(), seeded_table(schema), true));
        }

        ensure_writable(path)?;
        let sheets = read_workbook(path)?;
        match sheets.iter().find(|sheet| sheet.name == schema.sheet) {
            Some(sheet) => {
                let table = table_from_sheet(schema, sheet)?;
                Ok((sheets, table, false))
            }
            None => Ok((sheets, seeded_table(schema), true)),
        }
    }

    fn persist(&self, schema: &TableSchema, path: &Path, mut sheets: Vec<Sheet>, table: &Table) -> Result<(), StoreError> {
        let updated = Sheet::from_table(&schema.sheet, table);
        match sheets.iter_mut().find(|sheet| sheet.name == schema.sheet) {
            Some(sheet) => *sheet = updated,
            None => sheets.push(updated),
        }
        write_workbook(path, &sheets)
    }
}

fn check_width(schema: &TableSchema, record: &Record) -> Result<(), StoreError> {
    if record.width() == schema.columns().len() {
        return Ok(());
    }
    Err(StoreError::InvalidEdit {
        table: schema.id.clone(),
        reason: format!(
            "record has {} values, table has {} columns",
            record.width(),
            schema.columns().len()
        ),
    })
}

fn check_record(schema: &TableSchema, record: &Record) -> Result<(), StoreError> {
    check_width(schema, record)?;
    let invalid = |reason: String| StoreError::InvalidEdit {
        table: schema.id.clone(),
        reason,
    };

    if record.is_blank() {
        return Err(invalid("record has no values".to_string()));
    }
    for (column, value) in schema.columns().iter().zip(record.values()) {
        if !column.kind.accepts(value) {
            return Err(invalid(format!("'{value}' does not fit column '{}'", column.name)));
        }
        column
            .check_bounds(value)
            .map_err(|message| invalid(format!("'{}' {message}", column.name)))?;
    }
    Ok(())
}

fn ensure_writable(path: &Path) -> Result<(), StoreError> {
    let metadata = fs::metadata(path).map_err(|source| StoreError::io("inspect", path, source))?;
    if metadata.permissions().readonly() {
        return Err(StoreError::io(
            "write",
            path,
            io::Error::new(io::ErrorKind::PermissionDenied, "file is read-only"),
        ));
    }
    Ok(())
}
