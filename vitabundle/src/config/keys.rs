//! Addressable configuration settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{parse_bool, ConfigFile};
use super::ConfigError;

/// A single `section.key` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    PathsBaseDir,
    PathsAppDir,
    PathsPrimaryBundle,
    PipelineTrimApp,
    DownloadTimeout,
    ToolsPkg2zip,
    ToolsPsvimgCreate,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::PathsBaseDir,
            Self::PathsAppDir,
            Self::PathsPrimaryBundle,
            Self::PipelineTrimApp,
            Self::DownloadTimeout,
            Self::ToolsPkg2zip,
            Self::ToolsPsvimgCreate,
            Self::LoggingDirectory,
        ]
    }

    /// INI section.
    pub fn section(self) -> &'static str {
        match self {
            Self::PathsBaseDir | Self::PathsAppDir | Self::PathsPrimaryBundle => "paths",
            Self::PipelineTrimApp => "pipeline",
            Self::DownloadTimeout => "download",
            Self::ToolsPkg2zip | Self::ToolsPsvimgCreate => "tools",
            Self::LoggingDirectory => "logging",
        }
    }

    /// Key within the section.
    pub fn key_name(self) -> &'static str {
        match self {
            Self::PathsBaseDir => "base_dir",
            Self::PathsAppDir => "app_dir",
            Self::PathsPrimaryBundle => "primary_bundle",
            Self::PipelineTrimApp => "trim_app",
            Self::DownloadTimeout => "timeout",
            Self::ToolsPkg2zip => "pkg2zip",
            Self::ToolsPsvimgCreate => "psvimg_create",
            Self::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(self, config: &ConfigFile) -> String {
        match self {
            Self::PathsBaseDir => config.paths.base_dir.display().to_string(),
            Self::PathsAppDir => config.paths.app_dir.display().to_string(),
            Self::PathsPrimaryBundle => config
                .paths
                .primary_bundle
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Self::PipelineTrimApp => config.pipeline.trim_app.to_string(),
            Self::DownloadTimeout => config.download.timeout.to_string(),
            Self::ToolsPkg2zip => config.tools.pkg2zip.clone(),
            Self::ToolsPsvimgCreate => config.tools.psvimg_create.clone(),
            Self::LoggingDirectory => config.logging.directory.display().to_string(),
        }
    }

    /// Validate and store `value`.
    pub fn set(self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let value = value.trim();

        match self {
            Self::PathsPrimaryBundle => {
                config.paths.primary_bundle = (!value.is_empty()).then(|| PathBuf::from(value));
                return Ok(());
            }
            Self::PipelineTrimApp => {
                config.pipeline.trim_app =
                    parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
                return Ok(());
            }
            Self::DownloadTimeout => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| invalid("expected a number of seconds"))?;
                if secs == 0 {
                    return Err(invalid("timeout must be positive"));
                }
                config.download.timeout = secs;
                return Ok(());
            }
            _ => {}
        }

        if value.is_empty() {
            return Err(invalid("value must not be empty"));
        }
        match self {
            Self::PathsBaseDir => config.paths.base_dir = PathBuf::from(value),
            Self::PathsAppDir => config.paths.app_dir = PathBuf::from(value),
            Self::ToolsPkg2zip => config.tools.pkg2zip = value.to_string(),
            Self::ToolsPsvimgCreate => config.tools.psvimg_create = value.to_string(),
            Self::LoggingDirectory => config.logging.directory = PathBuf::from(value),
            Self::PathsPrimaryBundle | Self::PipelineTrimApp | Self::DownloadTimeout => {}
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == name)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
