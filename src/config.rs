use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = ".plantboard";
const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_API_PORT: u16 = 8501;
pub const DEFAULT_PREVIEW_ROWS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub report_dir: PathBuf,
    pub api_port: u16,
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            data_dir: root.join("data"),
            report_dir: root.join("reports"),
            api_port: DEFAULT_API_PORT,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        default_root_dir().join(CONFIG_FILE)
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// The saved config, or the defaults when none has been written yet.
    pub fn load_or_default() -> Result<Self> {
        if Self::config_path().exists() {
            Self::load()
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.report_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "data_dir" => {
                self.data_dir = expand_home(value.trim());
            }
            "report_dir" => {
                self.report_dir = expand_home(value.trim());
            }
            "api_port" => {
                let port = value
                    .trim()
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| anyhow!("api_port must be a number between 1 and 65535"))?;
                self.api_port = port;
            }
            "preview_rows" => {
                let rows = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow!("preview_rows must be a number"))?;
                if rows == 0 {
                    bail!("preview_rows must be at least 1");
                }
                self.preview_rows = rows;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: data_dir|data.dir, report_dir|report.dir, api_port|api.port, preview_rows|preview.rows"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "data_dir" => Some(self.data_dir.display().to_string()),
            "report_dir" => Some(self.report_dir.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "preview_rows" => Some(self.preview_rows.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "data_dir" | "data.dir" => "data_dir",
        "report_dir" | "report.dir" => "report_dir",
        "api_port" | "api.port" => "api_port",
        "preview_rows" | "preview.rows" => "preview_rows",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::{Config, expand_home};
    use std::path::PathBuf;

    #[test]
    fn dotted_aliases_reach_the_same_fields() {
        let mut config = Config::default();
        config.set_value("data.dir", "/srv/plant/data").expect("set data dir");
        config.set_value("api_port", "9000").expect("set port");

        assert_eq!(config.data_dir, PathBuf::from("/srv/plant/data"));
        assert_eq!(config.get_value("data_dir").as_deref(), Some("/srv/plant/data"));
        assert_eq!(config.get_value("api.port").as_deref(), Some("9000"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(config.set_value("api.port", "port").is_err());
        assert!(config.set_value("preview.rows", "0").is_err());
        assert!(config.set_value("retention.days", "3").is_err());
        assert_eq!(config.preview_rows, 30);
        assert!(config.get_value("retention.days").is_none());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"api_port": 8600}"#).expect("parse");
        assert_eq!(config.api_port, 8600);
        assert_eq!(config.preview_rows, 30);
        assert!(config.data_dir.ends_with("data"));
    }

    #[test]
    fn home_prefix_is_expanded() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/plant"), home.join("plant"));
        }
    }
}
