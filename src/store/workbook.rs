use crate::store::error::StoreError;
use crate::store::table::Table;
use crate::store::value::{Record, Value, excel_serial_to_date};
use calamine::{DataType, Reader, open_workbook_auto};
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// A cell whose stored form says more than its value in `Sheet::grid`.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCell {
    Bool(bool),
    /// Excel serial date-time, time of day included.
    DateTime(f64),
    /// Formula text without the leading `=`; the grid holds its cached result.
    Formula(String),
    Error(String),
}

/// One worksheet as a raw grid; the first row is the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub grid: Vec<Vec<Value>>,
    /// Worksheet position of `grid[0][0]`.
    pub origin: (u32, u32),
    /// Keyed by `(row, column)` in `grid`; written back instead of the grid value.
    pub native: BTreeMap<(usize, usize), NativeCell>,
}

impl Sheet {
    pub fn new(name: &str, grid: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.to_string(),
            grid,
            origin: (0, 0),
            native: BTreeMap::new(),
        }
    }

    pub fn from_table(name: &str, table: &Table) -> Self {
        let header = table
            .columns()
            .iter()
            .map(|column| Value::text(column.clone()))
            .collect::<Vec<_>>();

        let grid = std::iter::once(header)
            .chain(
                table
                    .rows()
                    .iter()
                    .chain(table.totals())
                    .map(|record| record.values().to_vec()),
            )
            .collect();

        Self::new(name, grid)
    }

    pub fn header(&self) -> Vec<Option<String>> {
        self.grid
            .first()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_null()).then(|| cell.to_string().trim().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Non-blank rows below the header.
    pub fn body(&self) -> impl Iterator<Item = &Vec<Value>> {
        self.grid
            .iter()
            .skip(1)
            .filter(|row| row.iter().any(|cell| !cell.is_null()))
    }
}

/// Reads a sheet as-is, the header row naming the columns. Unnamed header cells
/// become `Unnamed: <n>`.
pub fn raw_table(sheet: &Sheet) -> Table {
    let columns = sheet
        .header()
        .into_iter()
        .enumerate()
        .map(|(index, name)| name.unwrap_or_else(|| format!("Unnamed: {index}")))
        .collect::<Vec<_>>();
    let width = columns.len();

    let rows = sheet
        .body()
        .map(|row| {
            let mut values = row.clone();
            values.resize(width, Value::Null);
            Record::new(values)
        })
        .collect();

    Table::with_rows(sheet.name.clone(), columns, rows)
}

pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>, StoreError> {
    let read_error = |message: String| StoreError::WorkbookRead {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|error| read_error(error.to_string()))?;
    let names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .ok_or_else(|| read_error(format!("sheet {name} could not be located")))?
            .map_err(|error| read_error(format!("sheet {name}: {error}")))?;
        let origin = range.start().unwrap_or((0, 0));

        let mut native = BTreeMap::new();
        let mut grid = Vec::with_capacity(range.height());
        for (row_index, row) in range.rows().enumerate() {
            let mut values = Vec::with_capacity(row.len());
            for (column_index, cell) in row.iter().enumerate() {
                if let Some(kept) = native_cell(cell) {
                    native.insert((row_index, column_index), kept);
                }
                values.push(cell_value(cell));
            }
            grid.push(values);
        }

        match workbook.worksheet_formula(&name) {
            Some(Ok(formulas)) => {
                let (first_row, first_column) = formulas.start().unwrap_or((0, 0));
                for (row, column, formula) in formulas.cells() {
                    if formula.is_empty() {
                        continue;
                    }
                    let row = (first_row as usize + row).checked_sub(origin.0 as usize);
                    let column = (first_column as usize + column).checked_sub(origin.1 as usize);
                    if let (Some(row), Some(column)) = (row, column) {
                        native.insert((row, column), NativeCell::Formula(formula.clone()));
                    }
                }
            }
            Some(Err(error)) => {
                warn!(path = %path.display(), sheet = %name, %error, "formulas could not be read");
            }
            None => {}
        }

        sheets.push(Sheet {
            name,
            grid,
            origin,
            native,
        });
    }

    Ok(sheets)
}

/// Writes every sheet to a hidden sibling file, then renames it over `path`, so
/// a failed write never leaves a half-written workbook behind.
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> Result<(), StoreError> {
    let write_error = |source| StoreError::WorkbookWrite {
        path: path.to_path_buf(),
        source,
    };

    let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name.as_str()).map_err(write_error)?;

        let (first_row, first_column) = sheet.origin;
        let position = |row: usize, column: usize| {
            (first_row + row as u32, (first_column as usize + column) as u16)
        };

        for (row_index, row) in sheet.grid.iter().enumerate() {
            for (column_index, value) in row.iter().enumerate() {
                if sheet.native.contains_key(&(row_index, column_index)) {
                    continue;
                }
                let (row_number, column_number) = position(row_index, column_index);
                write_value(worksheet, row_number, column_number, value).map_err(write_error)?;
            }
        }

        for (&(row_index, column_index), cell) in &sheet.native {
            let (row_number, column_number) = position(row_index, column_index);
            let cached = sheet
                .grid
                .get(row_index)
                .and_then(|row| row.get(column_index))
                .filter(|value| !value.is_null());

            let written = match cell {
                NativeCell::Bool(flag) => worksheet
                    .write_boolean(row_number, column_number, *flag)
                    .map(|_| ()),
                NativeCell::DateTime(serial) => worksheet
                    .write_number_with_format(row_number, column_number, *serial, &datetime_format)
                    .map(|_| ()),
                NativeCell::Formula(text) => {
                    let formula = match cached {
                        Some(result) => Formula::new(text.as_str()).set_result(result.to_string()),
                        None => Formula::new(text.as_str()),
                    };
                    worksheet
                        .write_formula(row_number, column_number, formula)
                        .map(|_| ())
                }
                NativeCell::Error(error) => worksheet
                    .write_formula(row_number, column_number, Formula::new(error.as_str()))
                    .map(|_| ()),
            };
            written.map_err(write_error)?;
        }
    }

    let bytes = workbook.save_to_buffer().map_err(write_error)?;
    replace_file(path, &bytes)
}

fn write_value(worksheet: &mut Worksheet, row: u32, column: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Number(number) => {
            worksheet.write_number(row, column, *number)?;
        }
        Value::Text(text) => {
            worksheet.write_string(row, column, text.as_str())?;
        }
        Value::Date(date) => {
            worksheet.write_string(row, column, date.format("%Y-%m-%d").to_string())?;
        }
    }
    Ok(())
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|source| StoreError::io("create directory", parent, source))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let mut staging = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|source| StoreError::io("stage", path, source))?;

    staging
        .write_all(bytes)
        .map_err(|source| StoreError::io("write", staging.path(), source))?;
    staging
        .persist(path)
        .map(|_| ())
        .map_err(|error| StoreError::io("replace", path, error.error))
}

fn cell_value(cell: &DataType) -> Value {
    match cell {
        DataType::Int(value) => Value::number(*value as f64),
        DataType::Float(value) => Value::number(*value),
        DataType::String(value) => Value::text(value.clone()),
        DataType::Bool(value) => Value::text(value.to_string()),
        DataType::DateTime(serial) => excel_serial_to_date(*serial)
            .map(Value::Date)
            .unwrap_or_default(),
        DataType::Empty => Value::Null,
        _ => Value::Null,
    }
}

fn native_cell(cell: &DataType) -> Option<NativeCell> {
    match cell {
        DataType::Bool(flag) => Some(NativeCell::Bool(*flag)),
        DataType::DateTime(serial) => Some(NativeCell::DateTime(*serial)),
        DataType::Error(error) => Some(NativeCell::Error(error.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{NativeCell, Sheet, raw_table, read_workbook, write_workbook};
    use crate::catalog::Catalog;
    use crate::store::TableStore;
    use crate::store::value::Value;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sheet(name: &str, grid: Vec<Vec<Value>>) -> Sheet {
        Sheet::new(name, grid)
    }

    #[test]
    fn workbook_keeps_every_sheet_and_cell_kind() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("Suivi.xlsx");
        let date = NaiveDate::from_ymd_opt(2025, 5, 12).expect("valid date");

        let sheets = vec![
            sheet(
                "CT3",
                vec![
                    vec![Value::text("Jour"), Value::text("Operateurs Present")],
                    vec![Value::text("Lundi"), Value::Number(12.0)],
                ],
            ),
            sheet(
                "Visites",
                vec![
                    vec![Value::text("Visite_Date"), Value::text("Visite_Qui")],
                    vec![Value::Date(date), Value::Null],
                ],
            ),
        ];
        write_workbook(&path, &sheets).expect("write workbook");

        let read = read_workbook(&path).expect("read workbook");
        assert_eq!(read.len(), 2);
        assert_eq!(read[0], sheets[0]);
        assert_eq!(read[1].name, "Visites");
        assert_eq!(read[1].grid[1][0], Value::text("2025-05-12"));
    }

    #[test]
    fn foreign_sheet_cells_survive_an_edit_of_a_shared_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("Suivi_RH.xlsx");

        let mut notes = sheet(
            "Notes",
            vec![vec![Value::text("true"), Value::Number(2.0), Value::Number(4.0), Value::Null]],
        );
        notes.native.insert((0, 0), NativeCell::Bool(true));
        notes.native.insert((0, 2), NativeCell::Formula("B1*2".to_string()));
        notes.native.insert((0, 3), NativeCell::DateTime(45_789.5));
        write_workbook(&path, &[notes]).expect("write notes");

        let store = TableStore::new(dir.path(), Catalog::standard());
        store
            .update_cell("hr_ct3", 0, "Operateurs Present", Value::Number(10.0))
            .expect("edit CT3");

        let sheets = read_workbook(&path).expect("read back");
        let notes = sheets
            .iter()
            .find(|sheet| sheet.name == "Notes")
            .expect("notes sheet kept");
        assert_eq!(notes.native.get(&(0, 0)), Some(&NativeCell::Bool(true)));
        assert_eq!(
            notes.native.get(&(0, 2)),
            Some(&NativeCell::Formula("B1*2".to_string()))
        );
        assert_eq!(notes.native.get(&(0, 3)), Some(&NativeCell::DateTime(45_789.5)));
        assert_eq!(notes.grid[0][1], Value::Number(2.0));
        assert_eq!(notes.grid[0][2], Value::Number(4.0));
        assert!(sheets.iter().any(|sheet| sheet.name == "CT3"));
    }

    #[test]
    fn staging_file_does_not_survive_a_write() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("CT9_data.xlsx");
        let sheets = vec![sheet("CT9", vec![vec![Value::text("Project")]])];

        write_workbook(&path, &sheets).expect("write workbook");

        let names = std::fs::read_dir(dir.path())
            .expect("list dir")
            .map(|entry| entry.expect("dir entry").file_name())
            .collect::<Vec<_>>();
        assert_eq!(names, [std::ffi::OsString::from("CT9_data.xlsx")]);
    }

    #[test]
    fn raw_table_names_blank_headers_and_skips_blank_rows() {
        let raw = raw_table(&sheet(
            "Sheet1",
            vec![
                vec![Value::text("Project"), Value::Null],
                vec![Value::Null, Value::Null],
                vec![Value::text("C8"), Value::Number(3.0)],
            ],
        ));

        assert_eq!(raw.columns(), ["Project".to_string(), "Unnamed: 1".to_string()]);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.value(0, "Unnamed: 1"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn unreadable_file_is_reported_not_raised() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").expect("write garbage");

        assert!(read_workbook(&path).is_err());
    }
}
