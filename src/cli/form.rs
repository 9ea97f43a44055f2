use crate::forms::{FormInput, build_record, default_value, parse_field};
use crate::store::schema::{Column, TableSchema, WeeklyLayout};
use crate::store::value::Value as StoreValue;
use crate::store::{Table, TableStore};
use anyhow::{Context, Result, bail};
use chrono::Local;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use serde_json::Value;

const EMPTY_CHOICE: &str = "(leave empty)";

/// Asks for every field of `table_id` and submits the result.
pub fn run_form(store: &TableStore, table_id: &str) -> Result<Option<Table>> {
    let schema = store.schema(table_id)?;
    let theme = ColorfulTheme::default();

    println!("──────────────────────────────────────────");
    println!("  {} ({})", schema.title, schema.file);
    println!("──────────────────────────────────────────");

    match schema.weekly_layout() {
        Some(weekly) => edit_week(store, schema, weekly, &theme),
        None => fill_record(store, schema, &theme),
    }
}

fn fill_record(store: &TableStore, schema: &TableSchema, theme: &ColorfulTheme) -> Result<Option<Table>> {
    let today = Local::now().date_naive();
    let mut input = FormInput::new();

    for column in schema.editable_columns() {
        let answer = match dependent_choices(column, &input) {
            Some([only]) => {
                println!("  {}: {only}", column.name);
                only.clone()
            }
            Some(allowed) => ask_choice(column, allowed, theme)?,
            None if column.choices.is_empty() => {
                let default = default_value(column, today).to_string();
                ask_text(column, &default, theme)?
            }
            None => ask_choice(column, &column.choices, theme)?,
        };
        input.insert(column.name.clone(), Value::String(answer));
    }

    let record = match build_record(schema, &input, today) {
        Ok(record) => record,
        Err(error) => {
            for problem in &error.problems {
                println!("  ! {} {}", problem.field, problem.message);
            }
            bail!("Form was not saved");
        }
    };

    let confirmed = Confirm::with_theme(theme)
        .with_prompt(format!("  Append this row to {}?", schema.id))
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;
    if !confirmed {
        println!("  ✓ Nothing written");
        return Ok(None);
    }

    let table = store.append(&schema.id, record)?;
    println!("  ✓ Row saved ({} rows)", table.len());
    Ok(Some(table))
}

fn edit_week(
    store: &TableStore,
    schema: &TableSchema,
    weekly: &WeeklyLayout,
    theme: &ColorfulTheme,
) -> Result<Option<Table>> {
    let editable = schema.editable_columns();
    let names = editable
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();

    loop {
        let row = Select::with_theme(theme)
            .with_prompt("  Day")
            .default(0)
            .items(&weekly.days)
            .interact()
            .context("Failed to select a day")?;
        let column_index = Select::with_theme(theme)
            .with_prompt("  Field")
            .default(0)
            .items(&names)
            .interact()
            .context("Failed to select a field")?;
        let column = editable[column_index];

        let raw = ask_text(column, "", theme)?;
        let value = parse_field(column, &Value::String(raw))
            .map_err(|message| anyhow::anyhow!("{}: {message}", column.name))?;

        let table = store.update_cell(&schema.id, row, &column.name, value)?;
        print_week(&table);

        let again = Confirm::with_theme(theme)
            .with_prompt("  Edit another cell?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !again {
            return Ok(Some(table));
        }
    }
}

fn ask_text(column: &Column, default: &str, theme: &ColorfulTheme) -> Result<String> {
    let marker = if column.required { "*" } else { "" };
    let mut prompt = Input::<String>::with_theme(theme)
        .with_prompt(format!("  {}{marker}", column.name))
        .allow_empty(true)
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            parse_field(column, &Value::String(input.clone())).map(|_| ())
        });
    if !default.is_empty() {
        prompt = prompt.default(default.to_string());
    }

    prompt
        .interact_text()
        .with_context(|| format!("Failed to read {}", column.name))
}

/// Choices left by the answer already given for the column this one depends on.
fn dependent_choices<'a>(column: &'a Column, input: &FormInput) -> Option<&'a [String]> {
    let dependency = column.depends_on.as_ref()?;
    match input.get(&dependency.column) {
        Some(Value::String(parent)) => column.choices_for(&StoreValue::text(parent.as_str())),
        _ => None,
    }
}

fn ask_choice(column: &Column, choices: &[String], theme: &ColorfulTheme) -> Result<String> {
    let mut items = choices.to_vec();
    if !column.required && column.depends_on.is_none() {
        items.push(EMPTY_CHOICE.to_string());
    }

    let selected = Select::with_theme(theme)
        .with_prompt(format!("  {}", column.name))
        .default(0)
        .items(&items)
        .interact()
        .with_context(|| format!("Failed to select {}", column.name))?;

    Ok(items
        .get(selected)
        .filter(|item| item.as_str() != EMPTY_CHOICE)
        .cloned()
        .unwrap_or_default())
}

pub fn print_week(table: &Table) {
    println!("  {}", table.columns().join(" | "));
    for row in table.rows().iter().chain(table.totals()) {
        let cells = row
            .values()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!("  {}", cells.join(" | "));
    }
}
