use crate::catalog::Catalog;
use crate::config::{Config, expand_home};
use crate::store::TableStore;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

pub fn run_init(create_tables_flag: bool) -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to plantboard setup.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let defaults = Config::load_or_default()?;

    println!("\n[1/3] Data directory");
    println!("  Every input table is kept as a spreadsheet in this folder.");
    let data_dir_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder for spreadsheets")
        .default(defaults.data_dir.display().to_string())
        .interact_text()
        .context("Failed to read data directory")?;
    let data_dir = expand_home(&data_dir_input);
    println!("  ✓ {}", data_dir.display());

    println!("\n[2/3] Report output directory");
    let report_dir_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder where dashboard reports will be saved")
        .default(defaults.report_dir.display().to_string())
        .interact_text()
        .context("Failed to read report directory")?;
    let report_dir = expand_home(&report_dir_input);
    println!("  ✓ {}", report_dir.display());

    let config = Config {
        data_dir,
        report_dir,
        ..defaults
    };
    config.ensure_bootstrap_files()?;
    config.save()?;

    println!("\n[3/3] Create spreadsheets");
    let create_tables = if create_tables_flag {
        true
    } else {
        Confirm::with_theme(&theme)
            .with_prompt("  Create an empty spreadsheet for every table now?")
            .default(true)
            .interact()
            .context("Failed to read table creation input")?
    };

    if create_tables {
        let created = create_all_tables(&TableStore::new(&config.data_dir, Catalog::standard()))?;
        println!("  ✓ {created} tables ready");
    } else {
        println!("  ✓ Tables will be created on first use");
    }

    println!("\n──────────────────────────────────────────");
    println!("  Config saved to {}", Config::config_path().display());
    println!("  Next: `plantboard tables`, `plantboard form <table>`, `plantboard serve`");
    println!("──────────────────────────────────────────");

    Ok(config)
}

/// Opens every catalog table, creating missing files and sheets.
pub fn create_all_tables(store: &TableStore) -> Result<usize> {
    store
        .catalog()
        .tables()
        .iter()
        .try_fold(0, |count, schema| {
            store
                .open(&schema.id)
                .with_context(|| format!("Failed to create table {}", schema.id))
                .map(|_| count + 1)
        })
}
