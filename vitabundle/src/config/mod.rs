//! User configuration stored in `config.ini`.
//!
//! ```ini
//! [paths]
//! base_dir = ~/.local/share/vitabundle/APP
//! app_dir = ~/.local/share/vitabundle/bundles
//!
//! [pipeline]
//! trim_app = true
//! ```
//!
//! [`ConfigFile`] is the typed view of the file and [`ConfigKey`] addresses
//! single settings for the `config get`/`config set` commands.

mod file;
mod keys;

use std::path::PathBuf;

use thiserror::Error;

pub use file::{
    ConfigFile, DownloadSettings, LoggingSettings, PathsSettings, PipelineSettings, ToolSettings,
};
pub use keys::ConfigKey;

/// Application directory name below the platform config and data dirs.
pub const APP_DIR_NAME: &str = "vitabundle";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.ini";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or written.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("cannot parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Unknown `section.key`.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// A value does not fit its key.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Directory holding `config.ini` and `credentials.ini`.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Directory holding cached artifacts, bundles and logs by default.
pub fn data_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE)
}
