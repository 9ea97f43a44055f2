use crate::store::schema::{Column, ColumnKind, FieldDefault, TableSchema};
use crate::store::value::{Record, Value, parse_date, parse_number};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Submitted form fields keyed by column name.
pub type FormInput = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldProblem {
    pub field: String,
    pub message: String,
}

/// Every problem found in one submission; nothing is written when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("invalid form: {}", describe(.problems))]
pub struct ValidationError {
    pub problems: Vec<FieldProblem>,
}

fn describe(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(|problem| format!("{} {}", problem.field, problem.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turns submitted fields into one record of `schema`.
///
/// Absent fields take the column default; derived columns are left for the
/// store to compute.
pub fn build_record(
    schema: &TableSchema,
    input: &FormInput,
    today: NaiveDate,
) -> Result<Record, ValidationError> {
    let mut problems = Vec::new();
    let mut problem = |field: &str, message: String| {
        problems.push(FieldProblem {
            field: field.to_string(),
            message,
        })
    };

    let editable = schema.editable_columns();
    for field in input.keys() {
        if !schema.has_column(field) {
            problem(field, "is not a column of this table".to_string());
        } else if schema.is_derived(field) {
            problem(field, "is computed automatically".to_string());
        } else if !editable.iter().any(|column| &column.name == field) {
            problem(field, "cannot be set from a form".to_string());
        }
    }

    // Columns whose choices depend on another column are settled last, once the
    // parent value is known.
    let (independent, dependent): (Vec<&Column>, Vec<&Column>) = editable
        .iter()
        .copied()
        .partition(|column| column.depends_on.is_none());

    let mut record = Record::nulls(schema.columns().len());
    for column in independent.into_iter().chain(dependent) {
        let mut value = match input.get(&column.name) {
            Some(raw) => match parse_field(column, raw) {
                Ok(value) => value,
                Err(message) => {
                    problem(&column.name, message);
                    continue;
                }
            },
            None => default_value(column, today),
        };

        if let Some((parent, allowed)) = dependent_choices(schema, column, &record) {
            if value.is_null() && allowed.len() == 1 {
                value = Value::text(allowed[0].clone());
            } else if value.is_null() {
                problem(
                    &column.name,
                    format!("must be chosen for {parent}: {}", allowed.join(", ")),
                );
                continue;
            } else if let Value::Text(text) = &value {
                if !allowed.contains(text) {
                    problem(
                        &column.name,
                        format!("must be one of {} for {parent}", allowed.join(", ")),
                    );
                    continue;
                }
            }
        }

        if let Value::Text(text) = &value {
            if !column.choices.is_empty() && !column.choices.contains(text) {
                problem(
                    &column.name,
                    format!("must be one of: {}", column.choices.join(", ")),
                );
                continue;
            }
        }
        if column.required && value.is_null() {
            problem(&column.name, "is required".to_string());
            continue;
        }

        if let Some(index) = schema.column_index(&column.name) {
            record.set(index, value);
        }
    }

    if problems.is_empty() {
        Ok(record)
    } else {
        Err(ValidationError { problems })
    }
}

/// The parent value already in `record` and the choices it leaves for `column`.
fn dependent_choices<'a>(
    schema: &TableSchema,
    column: &'a Column,
    record: &Record,
) -> Option<(String, &'a [String])> {
    let dependency = column.depends_on.as_ref()?;
    let parent = schema
        .column_index(&dependency.column)
        .and_then(|index| record.get(index))?;
    let allowed = column.choices_for(parent)?;
    Some((format!("{} {parent}", dependency.column), allowed))
}

/// Parses one submitted value according to the column kind and bounds.
pub fn parse_field(column: &Column, raw: &JsonValue) -> Result<Value, String> {
    if let JsonValue::String(text) = raw {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
    }

    let value = match (column.kind, raw) {
        (_, JsonValue::Null) => Ok(Value::Null),
        (ColumnKind::Number | ColumnKind::Percent { .. }, JsonValue::Number(number)) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .map(Value::Number)
            .ok_or_else(|| format!("{number} is not a usable number")),
        (ColumnKind::Number | ColumnKind::Percent { .. }, JsonValue::String(text)) => {
            parse_number(text)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", text.trim()))
        }
        (ColumnKind::Text, JsonValue::String(text)) => Ok(Value::text(text.trim())),
        (ColumnKind::Text, JsonValue::Number(number)) => Ok(Value::text(number.to_string())),
        (ColumnKind::Date, JsonValue::String(text)) => parse_date(text)
            .map(Value::Date)
            .ok_or_else(|| format!("'{}' is not a date (YYYY-MM-DD or DD/MM/YYYY)", text.trim())),
        (kind, other) => Err(format!("{other} does not fit a {} field", kind_name(kind))),
    }?;

    column.check_bounds(&value)?;
    Ok(value)
}

pub fn default_value(column: &Column, today: NaiveDate) -> Value {
    match &column.default {
        Some(FieldDefault::Today) => Value::Date(today),
        Some(FieldDefault::CurrentIsoWeek) => Value::Number(f64::from(today.iso_week().week())),
        None => Value::Null,
    }
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Number => "number",
        ColumnKind::Percent { .. } => "percent",
        ColumnKind::Text => "text",
        ColumnKind::Date => "date",
    }
}

#[cfg(test)]
mod tests {
    use super::{FormInput, build_record, parse_field};
    use crate::catalog::Catalog;
    use crate::store::schema::Column;
    use crate::store::value::Value;
    use chrono::NaiveDate;
    use serde_json::json;

    fn input(value: serde_json::Value) -> FormInput {
        value.as_object().cloned().expect("object literal")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 14).expect("valid date")
    }

    #[test]
    fn complaint_takes_defaults_for_week_and_date() {
        let catalog = Catalog::standard();
        let schema = catalog.get("quality_clients").expect("quality table");
        let record = build_record(
            schema,
            &input(json!({
                "Clients": " Stellantis ",
                "Projets": "C8",
                "Descriptions": "Agrafe manquante",
                "Status": "Nouveau"
            })),
            today(),
        )
        .expect("valid complaint");

        let value = |name: &str| record.get(schema.column_index(name).expect("column")).cloned();
        assert_eq!(value("Clients"), Some(Value::text("Stellantis")));
        assert_eq!(value("Semaine"), Some(Value::Number(20.0)));
        assert_eq!(value("Date"), Some(Value::Date(today())));
        assert_eq!(value("Causes"), Some(Value::Null));
    }

    #[test]
    fn every_problem_is_reported_at_once() {
        let catalog = Catalog::standard();
        let schema = catalog.get("quality_clients").expect("quality table");
        let error = build_record(
            schema,
            &input(json!({
                "Clients": "",
                "Status": "Perdu",
                "Date": "demain",
                "Couleur": "rouge"
            })),
            today(),
        )
        .expect_err("invalid complaint");

        let fields = error
            .problems
            .iter()
            .map(|problem| problem.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            fields,
            ["Couleur", "Clients", "Projets", "Date", "Descriptions", "Status"]
        );
        assert!(error.to_string().contains("Status must be one of"));
    }

    #[test]
    fn complaint_week_stays_within_the_year() {
        let catalog = Catalog::standard();
        let schema = catalog.get("quality_clients").expect("quality table");
        let error = build_record(
            schema,
            &input(json!({
                "Clients": "Stellantis",
                "Projets": "C8",
                "Semaine": 54,
                "Descriptions": "Agrafe manquante"
            })),
            today(),
        )
        .expect_err("week 54");

        assert_eq!(error.problems.len(), 1);
        assert_eq!(error.problems[0].field, "Semaine");
        assert_eq!(error.problems[0].message, "must be at most 53");
    }

    #[test]
    fn derived_columns_cannot_be_submitted() {
        let catalog = Catalog::standard();
        let schema = catalog.get("ct1_ct4").expect("production table");
        let error = build_record(
            schema,
            &input(json!({"Project": "D5", "%": 100})),
            today(),
        )
        .expect_err("derived column");

        assert_eq!(error.problems.len(), 1);
        assert_eq!(error.problems[0].field, "%");
    }

    #[test]
    fn numbers_accept_comma_decimals_and_percent_signs() {
        assert_eq!(
            parse_field(&Column::number("Nbr heures"), &json!("1,5")),
            Ok(Value::Number(1.5))
        );
        assert_eq!(
            parse_field(&Column::percent("%", 2), &json!("87.5%")),
            Ok(Value::Number(87.5))
        );
        assert_eq!(
            parse_field(&Column::number("Réaliser"), &json!(40)),
            Ok(Value::Number(40.0))
        );
        assert!(parse_field(&Column::number("Réaliser"), &json!("NaN")).is_err());
        assert!(parse_field(&Column::number("Réaliser"), &json!(true)).is_err());
    }

    #[test]
    fn family_must_belong_to_the_selected_project() {
        let catalog = Catalog::standard();
        let schema = catalog.get("ct1_ct4").expect("production table");
        let error = build_record(
            schema,
            &input(json!({"Project": "C8", "Familles": "SEIPO SK38"})),
            today(),
        )
        .expect_err("family of another project");

        assert_eq!(error.problems.len(), 1);
        assert_eq!(error.problems[0].field, "Familles");
        assert!(error.problems[0].message.contains("for Project C8"));

        let error = build_record(schema, &input(json!({"Project": "C8"})), today())
            .expect_err("C8 has several families");
        assert!(error.problems[0].message.starts_with("must be chosen"));
    }

    #[test]
    fn single_family_projects_fill_the_family_in() {
        let catalog = Catalog::standard();
        let schema = catalog.get("ct9").expect("ct9 table");
        let record = build_record(schema, &input(json!({"Project": "BMW"})), today())
            .expect("family filled in");

        let familles = schema.column_index("Familles").expect("Familles column");
        assert_eq!(record.get(familles), Some(&Value::text("G6X")));
    }

    #[test]
    fn counts_and_percentages_stay_in_range() {
        let catalog = Catalog::standard();
        let schema = catalog.get("ct9").expect("ct9 table");
        let error = build_record(
            schema,
            &input(json!({
                "Project": "BMW",
                "Réaliser": -50,
                "Objecti Semaine": -10,
                "%": 250,
                "Lundi": "-3"
            })),
            today(),
        )
        .expect_err("negative counts");

        let fields = error
            .problems
            .iter()
            .map(|problem| problem.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, ["Objecti Semaine", "Réaliser", "%", "Lundi"]);
        assert_eq!(error.problems[2].message, "must be at most 100");
    }

    #[test]
    fn dates_accept_both_day_orders() {
        let expected = Value::Date(NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date"));
        let column = Column::date("DATE");
        assert_eq!(parse_field(&column, &json!("2025-03-04")), Ok(expected.clone()));
        assert_eq!(parse_field(&column, &json!("04/03/2025")), Ok(expected));
        assert_eq!(parse_field(&column, &json!("  ")), Ok(Value::Null));
    }
}
