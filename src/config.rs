//! Configuration for cip-gis

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::GisError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cip-gis")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the planner database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// SQLite file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Top of the derived score scale
    #[serde(default = "default_max_score")]
    pub max_score: f64,

    /// tracing-subscriber filter directive
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database_file() -> String {
    "planner.db".to_string()
}

fn default_max_score() -> f64 {
    5.0
}

fn default_log_filter() -> String {
    "cip_gis=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            max_score: default_max_score(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GisError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| GisError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GisError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GisError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `<storage_dir>/config.toml`, writing the defaults there first if
    /// the file does not exist yet
    pub fn load_or_init<P: AsRef<Path>>(storage_dir: P) -> Result<Self, GisError> {
        let storage_dir = storage_dir.as_ref();
        let mut config = Self {
            storage_dir: storage_dir.to_path_buf(),
            ..Self::default()
        };

        let config_path = config.config_path();
        if config_path.exists() {
            config = Self::load(&config_path)?;
            // the directory the file was found in wins over a stale entry
            config.storage_dir = storage_dir.to_path_buf();
        } else {
            std::fs::create_dir_all(storage_dir)?;
            config.save(&config_path)?;
            tracing::info!(path = %config_path.display(), "Created default config");
        }
        Ok(config)
    }

    /// Reject values the scoring policy cannot work with
    pub fn validate(&self) -> Result<(), GisError> {
        if !self.max_score.is_finite() || self.max_score <= 0.0 {
            return Err(GisError::Config(format!(
                "max_score must be a positive number, got {}",
                self.max_score
            )));
        }
        if self.database_file.is_empty() {
            return Err(GisError::Config("database_file must not be empty".into()));
        }
        Ok(())
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
