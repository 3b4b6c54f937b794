//! Configuration management
//!
//! This module handles loading, validation, and management of the screener
//! configuration. Configuration is stored in TOML format at
//! ~/.screener/config.toml unless a path is given on the command line.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, database file name
//! - **review**: Per-document cap and per-reviewer quota
//! - **access**: Names of the environment variables holding the access keys
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Creates the data directory if it doesn't exist
//!
//! # Examples
//!
//! ```no_run
//! use screener_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Database: {:?}", config.database_path());
//! println!("Cap per document: {}", config.review.max_reviews_per_document);
//! # Ok(())
//! # }
//! ```

use sdk::errors::ScreenerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Assignment limits
    #[serde(default)]
    pub review: ReviewConfig,

    /// Access key sources
    #[serde(default)]
    pub access: AccessConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite file name inside `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

/// Assignment limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Responses a single document may receive across all reviewers
    #[serde(default = "default_max_reviews_per_document")]
    pub max_reviews_per_document: u32,

    /// Responses each reviewer is expected to submit
    #[serde(default = "default_max_reviews_per_reviewer")]
    pub max_reviews_per_reviewer: u32,

    /// Optional override of the per-reviewer quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_reviews: Option<u32>,
}

/// The two limits the assignment engine works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewLimits {
    pub max_reviews_per_document: u32,
    pub required_reviews: u32,
}

impl ReviewConfig {
    /// Resolve the effective limits
    pub fn limits(&self) -> ReviewLimits {
        ReviewLimits {
            max_reviews_per_document: self.max_reviews_per_document,
            required_reviews: self
                .required_reviews
                .unwrap_or(self.max_reviews_per_reviewer),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_reviews_per_document: default_max_reviews_per_document(),
            max_reviews_per_reviewer: default_max_reviews_per_reviewer(),
            required_reviews: None,
        }
    }
}

/// Environment variables holding the shared access keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_reviewer_key_env")]
    pub reviewer_key_env: String,

    #[serde(default = "default_admin_key_env")]
    pub admin_key_env: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            reviewer_key_env: default_reviewer_key_env(),
            admin_key_env: default_admin_key_env(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.screener")
}

fn default_database_file() -> String {
    "screener.db".to_string()
}

fn default_max_reviews_per_document() -> u32 {
    3
}

fn default_max_reviews_per_reviewer() -> u32 {
    15
}

fn default_reviewer_key_env() -> String {
    "SCREENER_REVIEWER_KEY".to_string()
}

fn default_admin_key_env() -> String {
    "SCREENER_ADMIN_KEY".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.screener/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ScreenerError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there first if missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, ScreenerError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ScreenerError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ScreenerError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ScreenerError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ScreenerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ScreenerError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ path
        let mut config = Self::default_config();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ScreenerError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ScreenerError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.screener/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ScreenerError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ScreenerError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".screener").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
                database_file: default_database_file(),
            },
            review: ReviewConfig::default(),
            access: AccessConfig::default(),
        }
    }

    /// Full path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join(&self.core.database_file)
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level, limits and key variable names
    /// - Expands ~ in the data directory
    /// - Creates the data directory if it doesn't exist
    pub fn validate_and_process(&mut self) -> Result<(), ScreenerError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ScreenerError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.database_file.trim().is_empty() {
            return Err(ScreenerError::Config(
                "core.database_file must not be empty".to_string(),
            ));
        }

        if self.review.max_reviews_per_document == 0 {
            return Err(ScreenerError::Config(
                "review.max_reviews_per_document must be at least 1".to_string(),
            ));
        }
        if self.review.max_reviews_per_reviewer == 0 {
            return Err(ScreenerError::Config(
                "review.max_reviews_per_reviewer must be at least 1".to_string(),
            ));
        }
        if self.review.required_reviews == Some(0) {
            return Err(ScreenerError::Config(
                "review.required_reviews must be at least 1".to_string(),
            ));
        }

        if self.access.reviewer_key_env.trim().is_empty() {
            return Err(ScreenerError::Config(
                "access.reviewer_key_env must not be empty".to_string(),
            ));
        }
        if self.access.admin_key_env.trim().is_empty() {
            return Err(ScreenerError::Config(
                "access.admin_key_env must not be empty".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                ScreenerError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, ScreenerError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ScreenerError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ScreenerError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ScreenerError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default_config();
        config.core.data_dir = dir.path().join("data");
        config
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.core.database_file, "screener.db");
        assert_eq!(config.review.max_reviews_per_document, 3);
        assert_eq!(config.review.max_reviews_per_reviewer, 15);
        assert_eq!(config.review.required_reviews, None);
        assert_eq!(config.access.reviewer_key_env, "SCREENER_REVIEWER_KEY");
        assert_eq!(config.access.admin_key_env, "SCREENER_ADMIN_KEY");
    }

    #[test]
    fn test_limits_default_to_reviewer_quota() {
        let review = ReviewConfig::default();
        assert_eq!(
            review.limits(),
            ReviewLimits {
                max_reviews_per_document: 3,
                required_reviews: 15,
            }
        );
    }

    #[test]
    fn test_limits_use_required_override() {
        let review = ReviewConfig {
            required_reviews: Some(2),
            ..ReviewConfig::default()
        };
        assert_eq!(review.limits().required_reviews, 2);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.core.log_level = "loud".to_string();

        let err = config.validate_and_process().unwrap_err();
        assert!(matches!(err, ScreenerError::Config(msg) if msg.contains("loud")));
    }

    #[test]
    fn test_zero_caps_rejected() {
        let dir = TempDir::new().unwrap();

        let mut config = config_in(&dir);
        config.review.max_reviews_per_document = 0;
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("max_reviews_per_document"));

        let mut config = config_in(&dir);
        config.review.max_reviews_per_reviewer = 0;
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("max_reviews_per_reviewer"));

        let mut config = config_in(&dir);
        config.review.required_reviews = Some(0);
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("required_reviews"));
    }

    #[test]
    fn test_empty_key_env_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.access.admin_key_env = " ".to_string();

        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("admin_key_env"));
    }

    #[test]
    fn test_validation_creates_data_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);

        config.validate_and_process().unwrap();
        assert!(dir.path().join("data").is_dir());
        assert_eq!(
            config.database_path(),
            dir.path().join("data").join("screener.db")
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let data_dir = dir.path().join("data");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n\n[review]\nrequired_reviews = 4\n",
                data_dir.to_str().unwrap()
            ),
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.review.max_reviews_per_document, 3);
        assert_eq!(config.review.limits().required_reviews, 4);
        assert_eq!(config.access.reviewer_key_env, "SCREENER_REVIEWER_KEY");
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::load_or_create_at(&path).unwrap();
        assert!(path.exists());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("max_reviews_per_document = 3"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.review.max_reviews_per_reviewer,
            deserialized.review.max_reviews_per_reviewer
        );
    }
}
