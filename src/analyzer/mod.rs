pub mod metrics;
pub mod report;

use crate::analyzer::report::{Dashboard, SavedReport};
use crate::config::Config;
use crate::store::TableStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SPREADSHEET_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];
const HIDDEN_PREFIXES: [&str; 3] = [".", "__", "~$"];

/// Spreadsheet files directly under `dir`, sorted by path. The directory is
/// created when missing, so a fresh install reports "no data".
pub fn discover_tables(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

    let mut files = fs::read_dir(dir)
        .with_context(|| format!("Failed to list data directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_spreadsheet(path))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

fn is_spreadsheet(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if HIDDEN_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }

    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}

pub fn generate_and_store_report(
    config: &Config,
    store: &TableStore,
) -> Result<(Dashboard, SavedReport)> {
    let dashboard = report::build_dashboard(store, config.preview_rows)?;
    let saved = report::save_report_files(&dashboard, &config.report_dir)?;

    info!(
        sections = dashboard.sections.len(),
        markdown = %saved.markdown_path.display(),
        "dashboard report saved"
    );
    Ok((dashboard, saved))
}

#[cfg(test)]
mod tests {
    use super::discover_tables;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_skips_hidden_lock_and_foreign_files() {
        let dir = tempdir().expect("temp dir");
        for name in [
            "Suivi_RH.xlsx",
            "CT9_data.XLSX",
            "old.xls",
            "notes.txt",
            ".Suivi_RH.xlsx.123.tmp",
            "__template.xlsx",
            "~$Suivi_RH.xlsx",
        ] {
            fs::write(dir.path().join(name), b"").expect("write fixture");
        }
        fs::create_dir(dir.path().join("archive.xlsx")).expect("create dir");

        let names = discover_tables(dir.path())
            .expect("discover")
            .into_iter()
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        assert_eq!(names, ["CT9_data.XLSX", "Suivi_RH.xlsx", "old.xls"]);
    }

    #[test]
    fn missing_directory_is_created_empty() {
        let dir = tempdir().expect("temp dir");
        let data = dir.path().join("data");

        assert!(discover_tables(&data).expect("discover").is_empty());
        assert!(data.is_dir());
    }
}
