//! Configuration management for biblionetka-meta.
//!
//! Settings live in a TOML file in the platform config directory. Missing
//! keys fall back to defaults, and a default file is written on first load.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "biblionetka-meta";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Default site root.
pub const DEFAULT_BASE_URL: &str = "http://www.biblionetka.pl";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search and identify settings.
    pub search: SearchConfig,

    /// Cover download settings.
    pub covers: CoversConfig,

    /// Per-field enable flags.
    pub fields: FieldsConfig,
}

/// Search and identify settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of detail pages parsed per identify run.
    pub max_results: usize,

    /// Include authors in the search phrase and in result matching.
    pub authors_search: bool,

    /// Use only the first author for searching.
    pub only_first_author: bool,

    /// Per-request HTTP timeout in seconds.
    pub timeout_sec: u64,

    /// Site root, without a trailing slash.
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 2,
            authors_search: true,
            only_first_author: false,
            timeout_sec: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Cover download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoversConfig {
    /// Download covers at all.
    pub covers: bool,

    /// Maximum number of cover images downloaded.
    pub max_covers: usize,

    /// Download several covers concurrently.
    pub threads: bool,

    /// Maximum number of downloads in flight.
    pub max_threads: usize,

    /// Delay in seconds between launching consecutive downloads.
    pub thread_delay: f64,
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            covers: true,
            max_covers: 5,
            threads: true,
            max_threads: 3,
            thread_delay: 0.1,
        }
    }
}

/// One flag per optional metadata field.
///
/// The orchestrator checks these before calling an extractor; the
/// extractors themselves never look at configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub title: bool,
    pub authors: bool,
    pub pubdate: bool,
    pub comments: bool,
    pub languages: bool,
    pub rating: bool,
    pub tags: bool,
    pub identifier: bool,
    pub series: bool,
    /// Translators, embedded in the comment.
    pub translators: bool,
    /// Original title, embedded in the comment.
    pub original_title: bool,
    /// Category, embedded in the comment.
    pub categories: bool,
    /// Genre, embedded in the comment.
    pub genres: bool,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self::all(true)
    }
}

impl FieldsConfig {
    /// Returns a config with every field set to `enabled`.
    pub fn all(enabled: bool) -> Self {
        Self {
            title: enabled,
            authors: enabled,
            pubdate: enabled,
            comments: enabled,
            languages: enabled,
            rating: enabled,
            tags: enabled,
            identifier: enabled,
            series: enabled,
            translators: enabled,
            original_title: enabled,
            categories: enabled,
            genres: enabled,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_results == 0 {
            return Err(invalid("search.max_results", "must be greater than 0"));
        }

        if self.search.timeout_sec == 0 {
            return Err(invalid("search.timeout_sec", "must be greater than 0"));
        }

        if url::Url::parse(&self.search.base_url).is_err() {
            return Err(invalid("search.base_url", "must be an absolute URL"));
        }

        if self.covers.max_threads == 0 {
            return Err(invalid("covers.max_threads", "must be greater than 0"));
        }

        if !self.covers.thread_delay.is_finite() || self.covers.thread_delay < 0.0 {
            return Err(invalid("covers.thread_delay", "must be a non-negative number"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
