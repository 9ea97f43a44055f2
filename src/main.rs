mod analyzer;
mod api;
mod catalog;
mod cli;
mod config;
mod forms;
mod store;

use crate::analyzer::report::{SectionOutcome, build_dashboard};
use crate::catalog::Catalog;
use crate::cli::form::{print_week, run_form};
use crate::cli::init::run_init;
use crate::cli::{Cli, Commands, ConfigCommands, parse_assignments};
use crate::config::Config;
use crate::forms::{build_record, parse_field};
use crate::store::{Layout, StoreError, TableStore};
use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Init { create_tables } => {
            let _ = run_init(create_tables)?;
            Ok(())
        }
        Commands::Tables => handle_tables(data_dir),
        Commands::Show { table, limit } => handle_show(data_dir, &table, limit),
        Commands::Append { table, values } => handle_append(data_dir, &table, &values),
        Commands::Edit {
            table,
            day,
            column,
            value,
        } => handle_edit(data_dir, &table, &day, &column, &value),
        Commands::Form { table } => {
            let (_, store) = open_store(data_dir)?;
            let _ = run_form(&store, &table)?;
            Ok(())
        }
        Commands::Recompute { table } => handle_recompute(data_dir, &table),
        Commands::Summary => handle_summary(data_dir),
        Commands::Report => handle_report(data_dir),
        Commands::Serve { port } => handle_serve(data_dir, port).await,
        Commands::Config { command } => handle_config_command(command),
        Commands::Doctor => handle_doctor(data_dir),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load_or_default()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = Config::load_or_default()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_tables(data_dir: Option<PathBuf>) -> Result<()> {
    let (_, store) = open_store(data_dir)?;

    println!("Tables in {}", store.root().display());
    for schema in store.catalog().tables() {
        let layout = match schema.layout() {
            Layout::Append => "append",
            Layout::Weekly(_) => "weekly",
        };
        let state = if store.path_for(schema).exists() {
            "present"
        } else {
            "not created"
        };
        println!(
            "- {:<22} {:<7} {} / {} ({state})",
            schema.id, layout, schema.file, schema.sheet
        );
    }

    Ok(())
}

fn handle_show(data_dir: Option<PathBuf>, table_id: &str, limit: Option<usize>) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let table = store.open(table_id)?;
    let limit = limit.unwrap_or(config.preview_rows);

    println!("{} ({} rows)", table_id, table.len());
    if table.is_empty() && table.totals().is_empty() {
        println!("No rows yet. Add one with `plantboard form {table_id}`.");
        return Ok(());
    }
    println!("{}", table.columns().join(" | "));
    for row in table.head(limit).iter().chain(table.totals()) {
        let cells = row
            .values()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!("{}", cells.join(" | "));
    }
    if table.len() > limit {
        println!("... {} more rows", table.len() - limit);
    }

    Ok(())
}

fn handle_append(data_dir: Option<PathBuf>, table_id: &str, values: &[String]) -> Result<()> {
    let (_, store) = open_store(data_dir)?;
    let schema = store.schema(table_id)?;
    let input = parse_assignments(values)?;

    let record = build_record(schema, &input, Local::now().date_naive())?;
    let table = store.append(table_id, record)?;

    println!("Row appended to {table_id} ({} rows)", table.len());
    Ok(())
}

fn handle_edit(
    data_dir: Option<PathBuf>,
    table_id: &str,
    day: &str,
    column: &str,
    value: &str,
) -> Result<()> {
    let (_, store) = open_store(data_dir)?;
    let schema = store.schema(table_id)?;
    let Some(weekly) = schema.weekly_layout() else {
        return Err(StoreError::LayoutMismatch {
            table: table_id.to_string(),
            operation: "cell update",
        }
        .into());
    };

    let Some(row) = weekly.day_index(day) else {
        bail!("Unknown day: {day}. Use one of {}", weekly.days.join(", "));
    };
    let target = schema
        .column(column)
        .with_context(|| format!("Unknown column for {table_id}: {column}"))?;
    let parsed = parse_field(target, &JsonValue::String(value.to_string()))
        .map_err(|message| anyhow::anyhow!("{column}: {message}"))?;

    let table = store.update_cell(table_id, row, column, parsed)?;
    print_week(&table);
    Ok(())
}

fn handle_recompute(data_dir: Option<PathBuf>, table_id: &str) -> Result<()> {
    let (_, store) = open_store(data_dir)?;
    let table = store.load(table_id)?;
    let saved = store.save(table_id, &table)?;

    println!("Recomputed {table_id} ({} rows)", saved.len());
    Ok(())
}

fn handle_summary(data_dir: Option<PathBuf>) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let dashboard = build_dashboard(&store, config.preview_rows)?;

    if dashboard.sections.is_empty() {
        println!("No data: no spreadsheet files in {}", dashboard.data_dir);
        return Ok(());
    }

    for section in &dashboard.sections {
        let sheet = section.sheet.as_deref().unwrap_or("-");
        match &section.outcome {
            SectionOutcome::Failed { error } => {
                println!("{} / {sheet}: failed: {error}", section.file);
            }
            SectionOutcome::Ready(report) => {
                println!("{} / {sheet}: {} rows", section.file, report.row_count);
                for metric in report.summary.metrics() {
                    println!("  - {}: {}", metric.label, metric.value);
                }
            }
        }
    }

    Ok(())
}

fn handle_report(data_dir: Option<PathBuf>) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let (dashboard, saved) = analyzer::generate_and_store_report(&config, &store)?;

    println!("Report generated: {}", dashboard.date);
    println!("- Markdown: {}", saved.markdown_path.display());
    println!("- JSON: {}", saved.json_path.display());

    Ok(())
}

async fn handle_serve(data_dir: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let (mut config, store) = open_store(data_dir)?;
    if let Some(port) = port {
        config.api_port = port;
    }
    config.ensure_bootstrap_files()?;

    let shared_config = Arc::new(config);
    let shared_store = Arc::new(store);

    tokio::select! {
        api_result = api::run_server(shared_config, shared_store) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn handle_doctor(data_dir: Option<PathBuf>) -> Result<()> {
    let config_path = Config::config_path();
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let (config, store) = open_store(data_dir)?;

    for (label, dir) in [("data dir", store.root()), ("report dir", config.report_dir.as_path())] {
        if dir.is_dir() {
            println!("[OK] {label} exists: {}", dir.display());
        } else {
            println!("[WARN] {label} missing: {}", dir.display());
            issues.push(format!("{label} missing"));
        }
    }

    for schema in store.catalog().tables() {
        match store.load(&schema.id) {
            Ok(table) => println!("[OK] {}: {} rows", schema.id, table.len()),
            Err(StoreError::NotFound { .. }) => {
                println!("[OK] {}: not created yet", schema.id);
            }
            Err(error) => {
                println!("[WARN] {}: {error}", schema.id);
                issues.push(format!("{} unreadable", schema.id));
            }
        }
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

/// The saved (or default) config with the `--data-dir` override applied, and a
/// store rooted at its data directory.
fn open_store(data_dir: Option<PathBuf>) -> Result<(Config, TableStore)> {
    let mut config = Config::load_or_default()?;
    if let Some(data_dir) = data_dir {
        config.data_dir = config::expand_home(&data_dir.to_string_lossy());
    }

    let store = TableStore::new(config.data_dir.clone(), Catalog::standard());
    Ok((config, store))
}
