pub mod form;
pub mod init;

use crate::forms::FormInput;
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "plantboard",
    about = "Spreadsheet-backed shop-floor records and dashboard"
)]
pub struct Cli {
    /// Read and write spreadsheets here instead of the configured data directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Init {
        #[arg(long, default_value_t = false)]
        create_tables: bool,
    },
    Tables,
    Show {
        table: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Append {
        table: String,
        #[arg(long = "set", value_name = "COLUMN=VALUE")]
        values: Vec<String>,
    },
    Edit {
        table: String,
        day: String,
        column: String,
        value: String,
    },
    Form {
        table: String,
    },
    /// Rewrites a table with fresh derived columns, totals and header.
    Recompute {
        table: String,
    },
    Summary,
    Report,
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

/// Turns repeated `COLUMN=VALUE` arguments into form input. Only the first `=`
/// separates, so values may contain `=`.
pub fn parse_assignments(values: &[String]) -> Result<FormInput> {
    let mut input = FormInput::new();
    for raw in values {
        let Some((column, value)) = raw.split_once('=') else {
            bail!("Expected COLUMN=VALUE, got: {raw}");
        };
        let column = column.trim();
        if column.is_empty() {
            bail!("Missing column name in: {raw}");
        }
        if input
            .insert(column.to_string(), Value::String(value.to_string()))
            .is_some()
        {
            bail!("Column given twice: {column}");
        }
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, parse_assignments};
    use clap::Parser;
    use serde_json::Value;

    #[test]
    fn assignments_split_on_the_first_equals_sign() {
        let input = parse_assignments(&[
            "Projet=C8".to_string(),
            "Actions=a=b".to_string(),
        ])
        .expect("valid assignments");

        assert_eq!(input.get("Projet"), Some(&Value::String("C8".to_string())));
        assert_eq!(input.get("Actions"), Some(&Value::String("a=b".to_string())));
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        assert!(parse_assignments(&["Projet".to_string()]).is_err());
        assert!(parse_assignments(&["=C8".to_string()]).is_err());
        assert!(parse_assignments(&["A=1".to_string(), "A=2".to_string()]).is_err());
    }

    #[test]
    fn recompute_takes_one_table() {
        let cli = Cli::parse_from(["plantboard", "recompute", "hr_ct3"]);
        assert!(cli.data_dir.is_none());
        assert!(matches!(cli.command, Commands::Recompute { table } if table == "hr_ct3"));
    }

    #[test]
    fn global_data_dir_flag_parses_after_the_command() {
        let cli = Cli::parse_from([
            "plantboard",
            "append",
            "quality_clients",
            "--set",
            "Clients=Renault",
            "--data-dir",
            "/tmp/plant",
        ]);

        assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/plant")));
        match cli.command {
            Commands::Append { table, values } => {
                assert_eq!(table, "quality_clients");
                assert_eq!(values, ["Clients=Renault"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
