//! Loading and saving `config.ini`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use super::{config_file_path, data_directory, ConfigError};
use crate::manager::download::DEFAULT_TIMEOUT_SECS;
use crate::manager::PipelineConfig;

/// `[paths]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsSettings {
    /// Cached artifacts and the primary tree.
    pub base_dir: PathBuf,
    /// Directory scanned for bundle archives.
    pub app_dir: PathBuf,
    /// Primary bundle archive; `None` means `<app_dir>/h-encore.zip`.
    pub primary_bundle: Option<PathBuf>,
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub trim_app: bool,
}

/// `[download]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// HTTP timeout in seconds.
    pub timeout: u64,
}

/// `[tools]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub pkg2zip: String,
    pub psvimg_create: String,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
}

/// Typed contents of `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub paths: PathsSettings,
    pub pipeline: PipelineSettings,
    pub download: DownloadSettings,
    pub tools: ToolSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let data = data_directory();
        Self {
            paths: PathsSettings {
                base_dir: data.join("APP"),
                app_dir: data.join("bundles"),
                primary_bundle: None,
            },
            pipeline: PipelineSettings { trim_app: true },
            download: DownloadSettings {
                timeout: DEFAULT_TIMEOUT_SECS,
            },
            tools: ToolSettings {
                pkg2zip: "pkg2zip".to_string(),
                psvimg_create: "psvimg-create".to_string(),
            },
            logging: LoggingSettings {
                directory: data.join("logs"),
            },
        }
    }
}

pub(super) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigFile {
    /// Load the configuration from its default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = match Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(ini::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(ini::Error::Io(e)) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            Err(ini::Error::Parse(e)) => {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        Self::from_ini(&ini)
    }

    /// Build the configuration from parsed INI, falling back to defaults
    /// for absent keys.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in super::ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Render the configuration as INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in super::ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Save the configuration to its default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        self.to_ini().write_to_file(path).map_err(io_error)
    }

    /// Primary bundle archive, resolved against the bundle directory.
    pub fn primary_bundle(&self) -> PathBuf {
        self.paths
            .primary_bundle
            .clone()
            .unwrap_or_else(|| self.paths.app_dir.join("h-encore.zip"))
    }

    /// Pipeline settings derived from this file.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.paths.base_dir.clone())
            .with_app_dir(self.paths.app_dir.clone())
            .with_primary_bundle(self.primary_bundle())
            .with_trim_app(self.pipeline.trim_app)
            .with_timeout(Duration::from_secs(self.download.timeout))
            .with_tools(
                PathBuf::from(&self.tools.pkg2zip),
                PathBuf::from(&self.tools.psvimg_create),
            )
    }
}
