use crate::store::schema::{ColumnKind, Derivation, Layout, TableSchema, TotalRow, WeeklyLayout};
use crate::store::table::Table;
use crate::store::value::{Record, Value};

/// Recomputes every derived column and, for weekly layouts, the total rows.
pub fn recompute(schema: &TableSchema, table: &mut Table) {
    match schema.layout() {
        Layout::Append => {
            for row in table.rows_mut() {
                apply_derivations(schema, row);
            }
        }
        Layout::Weekly(weekly) => {
            for row in table.rows_mut() {
                apply_constants(schema, weekly, row);
                apply_derivations(schema, row);
            }

            let totals = weekly
                .totals
                .iter()
                .map(|total| total_row(schema, weekly, table.rows(), total))
                .collect();
            table.set_totals(totals);
        }
    }
}

pub fn apply_derivations(schema: &TableSchema, record: &mut Record) {
    for derivation in schema.derivations() {
        let Some(target) = schema.column_index(derivation.target()) else {
            continue;
        };

        let raw = match derivation {
            Derivation::Ratio {
                numerator,
                denominator,
                ..
            } => percent(
                cell_number(schema, record, numerator),
                denominator
                    .iter()
                    .map(|column| cell_number(schema, record, column))
                    .sum(),
            ),
            Derivation::Availability {
                opening, stoppage, ..
            } => {
                let opening = cell_number(schema, record, opening);
                percent(opening - cell_number(schema, record, stoppage), opening)
            }
            Derivation::Sum { columns, .. } => columns
                .iter()
                .map(|column| cell_number(schema, record, column))
                .sum(),
            Derivation::Scale { source, factor, .. } => {
                round_half_up(cell_number(schema, record, source) * factor, 2)
            }
        };

        let value = match schema.columns()[target].kind {
            ColumnKind::Percent { decimals } => round_half_up(raw, decimals),
            _ => raw,
        };
        record.set(target, Value::number(value));
    }
}

/// `numerator / denominator * 100`; a zero denominator yields `0`.
pub fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

/// Rounds half away from zero, which is half-up for the non-negative values
/// the dashboards produce.
///
/// The halfway test runs on `value * 10^decimals` in binary floating point, not
/// on the decimal text: `1.005` at two decimals scales to `100.49999999999999`
/// and gives `1.0`, while `14.45` at one decimal scales to exactly `144.5` and
/// gives `14.5`.
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn cell_number(schema: &TableSchema, record: &Record, column: &str) -> f64 {
    schema
        .column_index(column)
        .and_then(|index| record.get(index))
        .and_then(Value::as_number)
        .unwrap_or(0.0)
}

fn apply_constants(schema: &TableSchema, weekly: &WeeklyLayout, record: &mut Record) {
    for (column, value) in &weekly.constants {
        if let Some(index) = schema.column_index(column) {
            record.set(index, value.clone());
        }
    }
}

fn total_row(schema: &TableSchema, weekly: &WeeklyLayout, days: &[Record], total: &TotalRow) -> Record {
    let mut record = Record::nulls(schema.columns().len());

    for (index, column) in schema.columns().iter().enumerate() {
        if column.name == weekly.key_column {
            record.set(index, Value::text(total.label.clone()));
        } else if column.kind == ColumnKind::Number && !schema.is_derived(&column.name) {
            let sum = days
                .iter()
                .filter_map(|day| day.get(index).and_then(Value::as_number))
                .sum::<f64>();
            let scaled = if total.scale == 1.0 {
                sum
            } else {
                round_half_up(sum * total.scale, 2)
            };
            record.set(index, Value::number(scaled));
        }
    }

    apply_constants(schema, weekly, &mut record);
    apply_derivations(schema, &mut record);
    record
}

#[cfg(test)]
mod tests {
    use super::{percent, recompute, round_half_up};
    use crate::catalog::Catalog;
    use crate::store::schema::{Column, Derivation, TableSchema, TotalRow, WeeklyLayout};
    use crate::store::table::Table;
    use crate::store::value::{Record, Value};

    fn machine() -> TableSchema {
        TableSchema::new(
            "machine_test",
            "Machine",
            "Suivi_Test.xlsx",
            "Test",
            vec![
                Column::text("Jour"),
                Column::number("Temps D'ouverture"),
                Column::number("Arrêt Machine (minutes)"),
                Column::percent("Disponibilité Machine", 1),
                Column::text("Interventions"),
            ],
        )
        .derive(Derivation::availability(
            "Disponibilité Machine",
            "Temps D'ouverture",
            "Arrêt Machine (minutes)",
        ))
        .weekly(WeeklyLayout::new(
            "Jour",
            vec![
                TotalRow::new("Total Minutes", 1.0),
                TotalRow::new("Total Heures", 1.0 / 60.0),
            ],
        ))
    }

    fn week(stops: [f64; 6]) -> Table {
        let rows = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi"]
            .iter()
            .zip(stops)
            .map(|(day, stop)| {
                Record::new(vec![
                    Value::text(*day),
                    Value::Number(1440.0),
                    Value::Number(stop),
                    Value::Null,
                    Value::Null,
                ])
            })
            .collect();
        Table::with_rows("machine_test", machine().column_names(), rows)
    }

    #[test]
    fn availability_rounds_to_one_decimal() {
        let schema = machine();
        let mut table = week([120.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        recompute(&schema, &mut table);

        assert_eq!(
            table.value(0, "Disponibilité Machine"),
            Some(&Value::Number(91.7))
        );
        assert_eq!(
            table.value(1, "Disponibilité Machine"),
            Some(&Value::Number(100.0))
        );
    }

    #[test]
    fn total_rows_sum_day_rows_exactly() {
        let schema = machine();
        let mut table = week([120.0, 30.0, 0.0, 45.0, 5.0, 0.0]);
        recompute(&schema, &mut table);

        let minutes = &table.totals()[0];
        assert_eq!(minutes.get(0), Some(&Value::text("Total Minutes")));
        assert_eq!(minutes.get(1), Some(&Value::Number(8640.0)));
        assert_eq!(minutes.get(2), Some(&Value::Number(200.0)));

        let hours = &table.totals()[1];
        assert_eq!(hours.get(1), Some(&Value::Number(144.0)));
        assert_eq!(hours.get(2), Some(&Value::Number(3.33)));
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn zero_opening_time_gives_zero_availability() {
        let schema = machine();
        let mut table = week([0.0; 6]);
        table.rows_mut()[2].set(1, Value::Number(0.0));
        recompute(&schema, &mut table);

        assert_eq!(
            table.value(2, "Disponibilité Machine"),
            Some(&Value::Number(0.0))
        );
    }

    #[test]
    fn headcount_ratios_use_present_plus_absent_through_the_week() {
        let catalog = Catalog::standard();
        let schema = catalog.get("hr_ct3").expect("CT3 section");
        let counts = [
            (18.0, 2.0, 1.0),
            (0.0, 0.0, 0.0),
            (20.0, 0.0, 0.0),
            (20.0, 0.0, 0.0),
            (20.0, 0.0, 0.0),
            (20.0, 0.0, 0.0),
        ];
        let rows = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi"]
            .iter()
            .zip(counts)
            .map(|(day, (present, absent, left))| {
                Record::new(vec![
                    Value::text(*day),
                    Value::Number(present),
                    Value::Number(absent),
                    Value::Null,
                    Value::Number(left),
                    Value::Null,
                    Value::Number(0.0),
                    Value::Null,
                    Value::Null,
                ])
            })
            .collect();
        let mut table = Table::with_rows("hr_ct3", schema.column_names(), rows);
        recompute(schema, &mut table);

        assert_eq!(table.value(0, "% Absent"), Some(&Value::Number(10.0)));
        assert_eq!(table.value(0, "% Sortie"), Some(&Value::Number(5.0)));
        assert_eq!(table.value(1, "% Absent"), Some(&Value::Number(0.0)));
        assert_eq!(table.value(1, "Section"), Some(&Value::text("CT3")));

        assert_eq!(table.totals().len(), 1);
        let total = &table.totals()[0];
        let cell = |name: &str| total.get(schema.column_index(name).expect("column")).cloned();
        assert_eq!(cell("Jour"), Some(Value::text("Total Semaine")));
        assert_eq!(cell("Operateurs Present"), Some(Value::Number(98.0)));
        assert_eq!(cell("Operateurs Absent"), Some(Value::Number(2.0)));
        assert_eq!(cell("% Absent"), Some(Value::Number(2.0)));
        assert_eq!(cell("% Sortie"), Some(Value::Number(1.0)));
        assert_eq!(cell("% Embauchés"), Some(Value::Number(0.0)));
        assert_eq!(cell("Section"), Some(Value::text("CT3")));
    }

    #[test]
    fn ratio_helpers_never_divide_by_zero() {
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(50.0, 100.0), 50.0);
        assert_eq!(round_half_up(12.345, 1), 12.3);
        assert_eq!(round_half_up(0.25, 1), 0.3);
        assert_eq!(round_half_up(-0.01, 1), 0.0);
        assert_eq!(round_half_up(14.45, 1), 14.5);
        assert_eq!(round_half_up(1.005, 2), 1.0);
    }
}
