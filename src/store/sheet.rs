use crate::store::error::StoreError;
use crate::store::recompute::recompute;
use crate::store::schema::{ColumnKind, Layout, TableSchema, WeeklyLayout};
use crate::store::table::Table;
use crate::store::value::{Record, Value, excel_serial_to_date, parse_date, parse_number};
use crate::store::workbook::Sheet;

/// Decodes a persisted sheet into a schema-shaped table and recomputes it.
pub fn table_from_sheet(schema: &TableSchema, sheet: &Sheet) -> Result<Table, StoreError> {
    let malformed = |reason: String| StoreError::Malformed {
        table: schema.id.clone(),
        reason,
    };

    let mapping = header_mapping(schema, sheet).map_err(malformed)?;
    let mut decoded = Vec::new();

    for (row_number, row) in sheet.body().enumerate() {
        let mut record = Record::nulls(schema.columns().len());
        for (file_index, schema_index) in &mapping {
            let Some(schema_index) = schema_index else {
                continue;
            };
            let column = &schema.columns()[*schema_index];
            let raw = row.get(*file_index).cloned().unwrap_or_default();
            let value = coerce(column.kind, raw).map_err(|reason| {
                malformed(format!("row {}, column {}: {reason}", row_number + 1, column.name))
            })?;
            record.set(*schema_index, value);
        }
        decoded.push(record);
    }

    let rows = match schema.layout() {
        Layout::Append => decoded,
        Layout::Weekly(weekly) => day_rows(schema, weekly, decoded).map_err(malformed)?,
    };

    let mut table = Table::with_rows(schema.id.clone(), schema.column_names(), rows);
    recompute(schema, &mut table);
    Ok(table)
}

/// The freshly created state of a table: no rows, or one seeded row per day.
pub fn seeded_table(schema: &TableSchema) -> Table {
    let mut table = schema.empty_table();
    if let Layout::Weekly(weekly) = schema.layout() {
        for day in &weekly.days {
            table.push_row(seed_day(schema, weekly, day));
        }
    }
    recompute(schema, &mut table);
    table
}

pub fn coerce(kind: ColumnKind, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ColumnKind::Number | ColumnKind::Percent { .. }, Value::Number(number)) => {
            Ok(Value::Number(number))
        }
        (ColumnKind::Number | ColumnKind::Percent { .. }, Value::Text(text)) => parse_number(&text)
            .map(Value::Number)
            .ok_or_else(|| format!("'{text}' is not a number")),
        (ColumnKind::Number | ColumnKind::Percent { .. }, Value::Date(date)) => {
            Err(format!("date {date} where a number was expected"))
        }
        (ColumnKind::Text, value) => Ok(Value::text(value.to_string())),
        (ColumnKind::Date, Value::Date(date)) => Ok(Value::Date(date)),
        (ColumnKind::Date, Value::Text(text)) => parse_date(&text)
            .map(Value::Date)
            .ok_or_else(|| format!("'{text}' is not a date")),
        (ColumnKind::Date, Value::Number(serial)) => excel_serial_to_date(serial)
            .map(Value::Date)
            .ok_or_else(|| format!("{serial} is not a date serial")),
    }
}

fn seed_day(schema: &TableSchema, weekly: &WeeklyLayout, day: &str) -> Record {
    let mut record = Record::nulls(schema.columns().len());
    for (index, column) in schema.columns().iter().enumerate() {
        if column.name == weekly.key_column {
            record.set(index, Value::text(day));
        } else if column.kind == ColumnKind::Number && !schema.is_derived(&column.name) {
            record.set(index, Value::Number(0.0));
        }
    }

    for (column, value) in &weekly.defaults {
        if let Some(index) = schema.column_index(column) {
            record.set(index, value.clone());
        }
    }
    record
}

/// Pairs each file column with its schema column. Unnamed columns map to
/// `None` and must hold no data.
fn header_mapping(schema: &TableSchema, sheet: &Sheet) -> Result<Vec<(usize, Option<usize>)>, String> {
    let mut mapping = Vec::new();
    let mut seen = vec![false; schema.columns().len()];

    for (file_index, name) in sheet.header().into_iter().enumerate() {
        let Some(name) = name else {
            let holds_data = sheet
                .body()
                .any(|row| row.get(file_index).is_some_and(|cell| !cell.is_null()));
            if holds_data {
                return Err(format!("column {} has data but no header", file_index + 1));
            }
            mapping.push((file_index, None));
            continue;
        };

        let schema_index = schema
            .column_index(&name)
            .ok_or_else(|| format!("unexpected column '{name}'"))?;
        if std::mem::replace(&mut seen[schema_index], true) {
            return Err(format!("column '{name}' appears twice"));
        }
        mapping.push((file_index, Some(schema_index)));
    }

    Ok(mapping)
}

/// Keeps the day rows in day order, ignores persisted totals and re-seeds
/// missing days.
fn day_rows(schema: &TableSchema, weekly: &WeeklyLayout, decoded: Vec<Record>) -> Result<Vec<Record>, String> {
    let key_index = schema
        .column_index(&weekly.key_column)
        .ok_or_else(|| format!("key column '{}' is not declared", weekly.key_column))?;
    let mut days: Vec<Option<Record>> = vec![None; weekly.days.len()];

    for record in decoded {
        let label = record
            .get(key_index)
            .map(|value| value.to_string().trim().to_string())
            .unwrap_or_default();
        if weekly.is_total_label(&label) {
            continue;
        }

        let day = weekly
            .days
            .iter()
            .position(|day| day.eq_ignore_ascii_case(&label))
            .ok_or_else(|| format!("unexpected row '{label}' in {}", weekly.key_column))?;
        if days[day].is_some() {
            return Err(format!("day '{label}' appears twice"));
        }

        let mut record = record;
        record.set(key_index, Value::text(weekly.days[day].clone()));
        days[day] = Some(record);
    }

    Ok(days
        .into_iter()
        .zip(&weekly.days)
        .map(|(record, day)| record.unwrap_or_else(|| seed_day(schema, weekly, day)))
        .collect())
}
