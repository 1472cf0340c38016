//! Runtime settings: defaults, then an optional TOML file, then environment.
//!
//! CLI flags are applied on top by the binaries.

use crate::export::ExportFormat;
use crate::preview::DEFAULT_ROWS_PER_PAGE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "CATALOG_MERGE_DB";
pub const ENV_SERVER_ADDR: &str = "CATALOG_MERGE_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding the uploaded files between sessions
    pub db_path: PathBuf,

    /// Rows per preview page
    pub rows_per_page: usize,

    /// Output format when the output path has no recognised extension
    pub default_format: ExportFormat,

    /// Directory merged files are written to when no output path is given
    pub output_dir: PathBuf,

    /// Listen address for the HTTP server
    pub server_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("catalog_merge.db"),
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            default_format: ExportFormat::Csv,
            output_dir: PathBuf::from("."),
            server_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid by `path` when given, overlaid by environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(text)?;
        config.rows_per_page = config.rows_per_page.max(1);
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.db_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup(ENV_SERVER_ADDR).filter(|v| !v.is_empty()) {
            self.server_addr = addr;
        }
        self
    }

    /// Where a merge goes when the user gives no output path.
    pub fn default_output(&self, format: ExportFormat) -> PathBuf {
        self.output_dir.join(format.default_file_name())
    }
}
