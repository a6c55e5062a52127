//! Settings resolution for the cookbook store.
//!
//! Settings come from four layers, later layers winning:
//!
//! 1. built-in defaults ([`Settings::default`]),
//! 2. an optional YAML settings file ([`SettingsFile`]),
//! 3. environment variables (`COOKBOOK_STORE_*`),
//! 4. command-line overrides ([`Overrides`]).
//!
//! # Example YAML
//!
//! ```yaml
//! database: /var/lib/cookbooks/store.db
//! prefix: cb_
//! busy_timeout_ms: 2500
//! log_level: debug
//! log_format: json
//! ```

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Environment variable naming the database file.
pub const ENV_DATABASE: &str = "COOKBOOK_STORE_DB";
/// Environment variable naming the table prefix.
pub const ENV_PREFIX: &str = "COOKBOOK_STORE_PREFIX";
/// Environment variable holding the busy timeout in milliseconds.
pub const ENV_BUSY_TIMEOUT_MS: &str = "COOKBOOK_STORE_BUSY_TIMEOUT_MS";
/// Environment variable holding the log level filter.
pub const ENV_LOG: &str = "COOKBOOK_STORE_LOG";

/// Output format of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(DatabaseError::InvalidSetting {
                key: "log_format".into(),
                value: s.into(),
                reason: "expected 'text' or 'json'".into(),
            }),
        }
    }
}

/// Fully resolved settings.
///
/// # Examples
///
/// ```
/// use cookbook_store_db::{Overrides, Settings};
///
/// let settings = Settings::resolve(None, |_| None, &Overrides::default()).unwrap();
/// assert_eq!(settings.prefix, "cb_");
/// assert_eq!(settings.busy_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file (`:memory:` for a throwaway store).
    pub database: PathBuf,
    /// Table name prefix.
    pub prefix: String,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Log level filter directive (`info`, `debug`, `cookbook_store_sqlite=trace`, ...).
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cookbooks.db"),
            prefix: "cb_".to_string(),
            busy_timeout_ms: 5000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

/// Partial settings read from a YAML file. Absent keys keep lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
}

impl SettingsFile {
    /// Loads a settings file from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails (including unknown keys).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let settings = serde_yaml::from_reader(reader)?;
        Ok(settings)
    }

    /// Saves the settings file as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}

/// Values given on the command line. `None` leaves lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub prefix: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl Settings {
    /// Resolves settings from an optional file, an environment lookup and
    /// command-line overrides.
    ///
    /// `env` is called with each `COOKBOOK_STORE_*` variable name; pass
    /// `|key| std::env::var(key).ok()` for the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidSetting`] if an environment value
    /// cannot be parsed or a resolved value is unusable (empty prefix or
    /// database path).
    pub fn resolve<F>(file: Option<&SettingsFile>, env: F, overrides: &Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(file) = file {
            settings.apply_file(file);
        }
        settings.apply_env(env)?;
        settings.apply_overrides(overrides);
        settings.check()?;

        Ok(settings)
    }

    /// Resolves settings against the process environment, reading the YAML
    /// file at `path` if one is given.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = path.map(SettingsFile::load).transpose()?;
        Self::resolve(file.as_ref(), |key| std::env::var(key).ok(), overrides)
    }

    fn apply_file(&mut self, file: &SettingsFile) {
        if let Some(database) = &file.database {
            self.database = database.clone();
        }
        if let Some(prefix) = &file.prefix {
            self.prefix = prefix.clone();
        }
        if let Some(timeout) = file.busy_timeout_ms {
            self.busy_timeout_ms = timeout;
        }
        if let Some(level) = &file.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = file.log_format {
            self.log_format = format;
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = env(ENV_DATABASE) {
            self.database = PathBuf::from(database);
        }
        if let Some(prefix) = env(ENV_PREFIX) {
            self.prefix = prefix;
        }
        if let Some(raw) = env(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = raw.trim().parse().map_err(|_| DatabaseError::InvalidSetting {
                key: ENV_BUSY_TIMEOUT_MS.into(),
                value: raw.clone(),
                reason: "expected a non-negative number of milliseconds".into(),
            })?;
        }
        if let Some(level) = env(ENV_LOG) {
            self.log_level = level;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(database) = &overrides.database {
            self.database = database.clone();
        }
        if let Some(prefix) = &overrides.prefix {
            self.prefix = prefix.clone();
        }
        if let Some(timeout) = overrides.busy_timeout_ms {
            self.busy_timeout_ms = timeout;
        }
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
    }

    fn check(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(DatabaseError::InvalidSetting {
                key: "database".into(),
                value: String::new(),
                reason: "database path cannot be empty".into(),
            });
        }
        if self.prefix.is_empty() {
            return Err(DatabaseError::InvalidSetting {
                key: "prefix".into(),
                value: String::new(),
                reason: "table prefix cannot be empty".into(),
            });
        }
        Ok(())
    }
}
