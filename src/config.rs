//! Configuration for capstore
//!
//! A [`StoreConfig`] names the sources to load and the persistence sinks to
//! save into. It is read from a TOML file in the user's config directory and
//! may be overridden by `CAPSTORE_*` environment variables.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CAPSTORE";

fn default_max_workers() -> usize {
    1
}

const fn default_recursive() -> bool {
    true
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp", "bmp", "gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Store configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// JSON database files or image directories to load, in order
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Database file written by the database sink
    #[serde(default)]
    pub database_file: Option<PathBuf>,

    /// Enable the database sink
    #[serde(default)]
    pub write_to_database: bool,

    /// Enable the sidecar caption sink
    #[serde(default)]
    pub write_to_txt: bool,

    /// Records per page; unset shows everything on one page
    #[serde(default)]
    pub chunk_size: Option<usize>,

    /// Worker threads for batch edits
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Descend into subdirectories when scanning image directories
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Formalize every caption on open and mark all records dirty
    #[serde(default)]
    pub formalize_caption: bool,

    /// Image file extensions picked up by directory scans
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            database_file: None,
            write_to_database: false,
            write_to_txt: false,
            chunk_size: None,
            max_workers: default_max_workers(),
            recursive: default_recursive(),
            formalize_caption: false,
            image_extensions: default_image_extensions(),
        }
    }
}

impl StoreConfig {
    /// Get the path to the default config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the system config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Message("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("capstore").join("config.toml"))
    }

    /// Load the default config file, creating it if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read, parsed, or created.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, overlaid by `CAPSTORE_*` variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if the
    /// result fails [`StoreConfig::validate`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the text is not valid TOML for this structure,
    /// or if the result fails [`StoreConfig::validate`].
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the parent directory cannot be created, the
    /// configuration cannot be serialized to TOML, or the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Message(format!("Failed to create config directory: {e}")))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Check that every enabled sink has what it needs
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` if the database sink is enabled without
    /// a database file, or if `max_workers` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_to_database && self.database_file.is_none() {
            return Err(ConfigError::Message(
                "write_to_database is enabled but no database_file is set".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Message("max_workers must be at least 1".to_string()));
        }
        Ok(())
    }
}
