use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::{ErrorPolicy, ImportSettings, RevisitPolicy, TimeFormat, DEFAULT_TIME_FORMAT};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Import pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// File or directory to import; may be supplied on the command line instead
    pub input_path: Option<PathBuf>,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub revisit_policy: RevisitPolicy,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            time_format: default_time_format(),
            extension: default_extension(),
            delimiter: default_delimiter(),
            revisit_policy: RevisitPolicy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_time_format() -> String {
    DEFAULT_TIME_FORMAT.to_string()
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("trajectories.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in TRAJLOAD_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (defaults are used when absent)
    ///
    /// Values are not validated here; see [`Config::with_overrides`].
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config = match std::env::var("TRAJLOAD_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new("config.toml").exists() => {
                Self::from_file(Path::new("config.toml"))?
            }
            Err(_) => {
                log::debug!("No config.toml found, using defaults");
                Config::default()
            }
        };

        Ok(config)
    }

    /// Apply command-line overrides, then validate the merged configuration
    pub fn with_overrides(
        mut self,
        input: Option<PathBuf>,
        time_format: Option<String>,
    ) -> Result<Self> {
        if let Some(input) = input {
            self.import.input_path = Some(input);
        }
        if let Some(time_format) = time_format {
            self.import.time_format = time_format;
        }
        self.validate()?;
        Ok(self)
    }

    /// Read and parse a config file without validating it
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse config text. Mistyped or unknown keys fail here.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    /// Validate configuration values before any file is touched
    pub fn validate(&self) -> Result<()> {
        self.import.settings()?;

        if !matches!(
            self.storage.log_level.to_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace" | "off"
        ) {
            anyhow::bail!("storage.log_level is not a log level: {}", self.storage.log_level);
        }

        Ok(())
    }

    /// The configured input path, failing when none was supplied
    pub fn input_path(&self) -> Result<&Path> {
        self.import
            .input_path
            .as_deref()
            .context("import.input_path is not set (use config.toml or --input)")
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.storage.db_path
    }
}

impl ImportConfig {
    /// Build validated pipeline settings
    pub fn settings(&self) -> Result<ImportSettings> {
        let extension = self.extension.trim().trim_start_matches('.');
        if extension.is_empty() {
            anyhow::bail!("import.extension must not be empty");
        }

        let delimiter = match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ if self.delimiter == "\\t" => b'\t',
            _ => anyhow::bail!(
                "import.delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            ),
        };

        let time_format = TimeFormat::new(&self.time_format)
            .with_context(|| format!("Invalid import.time_format '{}'", self.time_format))?;

        Ok(ImportSettings {
            time_format,
            extension: extension.to_string(),
            delimiter,
            revisit_policy: self.revisit_policy,
            error_policy: self.error_policy,
        })
    }
}
