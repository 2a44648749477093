//! Configuration system for statusdex.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/statusdex/config.toml`
//! 3. **Environment variables** - `STATUSDEX_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/.local/share/statusdex/statusdex.db"
//! index = "~/.local/share/statusdex/statusdex_index"
//!
//! [index]
//! refresh_interval = "15m"
//! batch_size = 1000
//! writer_heap_mb = 128
//! jobs = 0
//!
//! [search]
//! default_limit = 20
//!
//! [filters]
//! cache_size = 256
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analysis::DEFAULT_REFRESH_INTERVAL;
use crate::error::{Result, StatusdexError};

/// Main configuration structure for statusdex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Indexing behavior configuration.
    pub index: IndexConfig,
    /// Search behavior configuration.
    pub search: SearchConfig,
    /// Filter evaluation configuration.
    pub filters: FiltersConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration for database and index locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `STATUSDEX_DB`
    pub db: Option<PathBuf>,

    /// Path to the Tantivy search index directory.
    /// Environment variable: `STATUSDEX_INDEX`
    pub index: Option<PathBuf>,
}

/// Indexing behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// How long committed documents may stay invisible to searchers.
    /// Environment variable: `STATUSDEX_REFRESH_INTERVAL`
    #[serde(with = "duration_str")]
    pub refresh_interval: Duration,

    /// Posts per indexing batch (one crutch load per batch).
    /// Environment variable: `STATUSDEX_BATCH_SIZE`
    pub batch_size: usize,

    /// Memory budget for the index writer (in MB).
    pub writer_heap_mb: usize,

    /// Document builder threads (0 = auto).
    /// Environment variable: `STATUSDEX_JOBS`
    pub jobs: usize,
}

/// Search behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results to return.
    /// Environment variable: `STATUSDEX_LIMIT`
    pub default_limit: usize,
}

/// Filter evaluation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Distinct compiled rule sets kept in memory.
    pub cache_size: usize,
}

/// Output formatting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            batch_size: 1000,
            writer_heap_mb: 128,
            jobs: 0, // Auto-detect
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            cache_size: crate::filter::DEFAULT_CACHE_SIZE,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/statusdex/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load from user config file
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Override from environment variables
        config.apply_env_overrides(|key| std::env::var(key).ok());

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &PathBuf) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("statusdex").join("config.toml"))
    }

    /// Apply environment variable overrides read through `var`.
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Path overrides
        if let Some(db) = var("STATUSDEX_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Some(index) = var("STATUSDEX_INDEX") {
            self.paths.index = Some(PathBuf::from(index));
        }

        // Index overrides
        if let Some(interval) = var("STATUSDEX_REFRESH_INTERVAL") {
            match parse_duration(&interval) {
                Ok(d) => self.index.refresh_interval = d,
                Err(e) => warn!("Ignoring STATUSDEX_REFRESH_INTERVAL: {e}"),
            }
        }
        if let Some(n) = var("STATUSDEX_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.index.batch_size = n;
        }
        if let Some(n) = var("STATUSDEX_JOBS").and_then(|v| v.parse().ok()) {
            self.index.jobs = n;
        }

        // Search overrides
        if let Some(n) = var("STATUSDEX_LIMIT").and_then(|v| v.parse().ok()) {
            self.search.default_limit = n;
        }

        // Output overrides
        if let Some(format) = var("STATUSDEX_FORMAT") {
            self.output.format = format;
        }
        if var("STATUSDEX_NO_COLOR").is_some() || var("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if var("STATUSDEX_QUIET").is_some() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        // Paths
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }
        if other.paths.index.is_some() {
            self.paths.index = other.paths.index;
        }

        self.index = other.index;
        self.search = other.search;
        self.filters = other.filters;
        self.output = other.output;
    }

    /// Set one dotted key from a string value.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::InvalidArgument`] for unknown keys or values
    /// that do not parse.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| StatusdexError::InvalidArgument {
                reason: format!("invalid value '{value}' for {key}"),
            })
        }

        match key {
            "paths.db" => self.paths.db = Some(PathBuf::from(value)),
            "paths.index" => self.paths.index = Some(PathBuf::from(value)),
            "index.refresh_interval" => self.index.refresh_interval = parse_duration(value)?,
            "index.batch_size" => self.index.batch_size = parse(key, value)?,
            "index.writer_heap_mb" => self.index.writer_heap_mb = parse(key, value)?,
            "index.jobs" => self.index.jobs = parse(key, value)?,
            "search.default_limit" => self.search.default_limit = parse(key, value)?,
            "filters.cache_size" => self.filters.cache_size = parse(key, value)?,
            "output.format" => self.output.format = value.to_string(),
            "output.colors" => self.output.colors = parse(key, value)?,
            "output.quiet" => self.output.quiet = parse(key, value)?,
            other => {
                return Err(StatusdexError::InvalidArgument {
                    reason: format!("unknown config key '{other}'"),
                });
            }
        }
        Ok(())
    }

    /// Get the database path, using defaults if not configured.
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db
            .clone()
            .unwrap_or_else(crate::default_db_path)
    }

    /// Get the index path, using defaults if not configured.
    pub fn index_path(&self) -> PathBuf {
        self.paths
            .index
            .clone()
            .unwrap_or_else(crate::default_index_path)
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<()> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Parse a human duration such as `500ms`, `30s`, `15m`, `1h`.
///
/// A bare number is read as seconds.
///
/// # Errors
///
/// Returns [`StatusdexError::InvalidDuration`] for anything else.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let invalid = || StatusdexError::InvalidDuration {
        value: value.to_string(),
    };
    let n: u64 = number.parse().map_err(|_| invalid())?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(n)),
        "" | "s" => Ok(Duration::from_secs(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid),
        "h" => n
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Render a duration in the largest unit that divides it exactly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Serde adapter storing a [`Duration`] as a human string.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// # Errors
    ///
    /// Never fails for valid serializers.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    /// # Errors
    ///
    /// Fails when the string is not a recognised duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.index.refresh_interval, Duration::from_secs(900));
        assert!(config.output.colors);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("refresh_interval = \"15m\""));
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.search.default_limit = 50;
        other.paths.db = Some(PathBuf::from("/custom/path"));

        base.merge(other);

        assert_eq!(base.search.default_limit, 50);
        assert_eq!(base.paths.db, Some(PathBuf::from("/custom/path")));
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[index]"));
        assert!(content.contains("[search]"));
        assert!(content.contains("[filters]"));
        assert!(content.contains("[output]"));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STATUSDEX_DB", "/tmp/s.db"),
            ("STATUSDEX_REFRESH_INTERVAL", "30s"),
            ("STATUSDEX_BATCH_SIZE", "64"),
            ("STATUSDEX_LIMIT", "not-a-number"),
            ("NO_COLOR", "1"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.paths.db, Some(PathBuf::from("/tmp/s.db")));
        assert_eq!(config.index.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.index.batch_size, 64);
        assert_eq!(config.search.default_limit, 20);
        assert!(!config.output.colors);
    }

    #[test]
    fn set_key_updates_and_rejects() {
        let mut config = Config::default();
        config.set_key("filters.cache_size", "8").unwrap();
        config.set_key("index.refresh_interval", "1h").unwrap();
        assert_eq!(config.filters.cache_size, 8);
        assert_eq!(config.index.refresh_interval, Duration::from_secs(3600));

        assert!(config.set_key("index.batch_size", "many").is_err());
        assert!(config.set_key("nope.key", "1").is_err());
    }

    #[test]
    fn every_valid_key_is_settable() {
        for key in crate::error::VALID_CONFIG_KEYS {
            let value = match *key {
                "index.refresh_interval" => "5m",
                "output.colors" | "output.quiet" => "true",
                "output.format" | "paths.db" | "paths.index" => "x",
                _ => "3",
            };
            Config::default().set_key(key, value).unwrap();
        }
    }

    #[test]
    fn durations_parse_and_format() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5d").is_err());

        assert_eq!(format_duration(Duration::from_secs(900)), "15m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
