//! Configuration for the time tracker.
//!
//! Settings are read from `config.toml` in the tracker home directory
//! (`$TIME_TRACKER_HOME`, or `~/.time-tracker`). Every field is optional;
//! a missing file yields the defaults.
//!
//! # Example
//!
//! ```
//! use time_tracker::config::TrackerConfig;
//!
//! let config: TrackerConfig = toml::from_str("work_minutes = 50").unwrap();
//! assert_eq!(config.work_minutes, 50);
//! assert_eq!(config.break_minutes, 5);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the tracker home directory.
pub const HOME_ENV: &str = "TIME_TRACKER_HOME";

/// Home directory name under the user's home.
const DEFAULT_HOME_DIR: &str = ".time-tracker";

/// Configuration file name inside the tracker home.
pub const CONFIG_FILE_NAME: &str = "config.toml";

fn default_work_minutes() -> u32 {
    25
}

fn default_break_minutes() -> u32 {
    5
}

fn default_long_break_minutes() -> u32 {
    15
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither `$TIME_TRACKER_HOME` nor a home directory is available
    #[error("Cannot determine home directory; set {HOME_ENV}")]
    HomeDirectoryNotFound,

    /// The config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// TOML error
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its allowed range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Daemon socket path; defaults to `<home>/tracker.sock`
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Data file path; defaults to `<home>/data.json`
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Webhook receiving finished sessions
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Default work interval in minutes (1-120)
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u32,

    /// Default break in minutes (1-60)
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u32,

    /// Default long break in minutes (1-60)
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,

    /// Resolved tracker home; not part of the file
    #[serde(skip)]
    home: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            data_path: None,
            webhook_url: None,
            work_minutes: default_work_minutes(),
            break_minutes: default_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            home: PathBuf::from(DEFAULT_HOME_DIR),
        }
    }
}

impl TrackerConfig {
    /// Resolves the tracker home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn home_dir() -> Result<PathBuf, ConfigError> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_HOME_DIR))
            .ok_or(ConfigError::HomeDirectoryNotFound)
    }

    /// Loads the configuration from `path`, or from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let home = Self::home_dir()?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.join(CONFIG_FILE_NAME));

        let mut config = Self::load_file(&path)?;
        config.home = home;
        config.validate()?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reads `path`, returning defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Creates a configuration rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Validates ranges and the webhook URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=120).contains(&self.work_minutes) {
            return Err(ConfigError::Invalid(
                "work_minutes must be between 1 and 120".to_string(),
            ));
        }
        if !(1..=60).contains(&self.break_minutes) {
            return Err(ConfigError::Invalid(
                "break_minutes must be between 1 and 60".to_string(),
            ));
        }
        if !(1..=60).contains(&self.long_break_minutes) {
            return Err(ConfigError::Invalid(
                "long_break_minutes must be between 1 and 60".to_string(),
            ));
        }
        if let Some(url) = self.webhook_url() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "webhook_url must be an http(s) URL: {}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// Tracker home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Effective daemon socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.home.join("tracker.sock"))
    }

    /// Effective data file path.
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| self.home.join("data.json"))
    }

    /// Configured webhook URL, ignoring blank values.
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
