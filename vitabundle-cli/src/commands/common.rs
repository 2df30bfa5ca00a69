//! Options and setup shared by the pipeline commands.

use std::path::PathBuf;

use clap::Args;
use vitabundle::config::ConfigFile;
use vitabundle::credentials::CredentialStore;
use vitabundle::manager::{BundleCatalog, PipelineConfig, ZipExtractor};
use vitabundle::pipeline::{Collaborators, StatusReporter, SystemController};

use crate::error::CliError;

/// Directory overrides accepted by `build`, `list` and `key`.
#[derive(Debug, Clone, Default, Args)]
pub struct PathArgs {
    /// Working directory for downloads and build output (overrides paths.base_dir)
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Directory scanned for bundle archives (overrides paths.app_dir)
    #[arg(long, value_name = "DIR")]
    pub app_dir: Option<PathBuf>,
}

impl PathArgs {
    /// Apply the overrides on top of the loaded config file.
    ///
    /// CLI values win over config values when given.
    pub fn apply(&self, config: &ConfigFile) -> ConfigFile {
        let mut config = config.clone();
        if let Some(dir) = &self.base_dir {
            config.paths.base_dir = dir.clone();
        }
        if let Some(dir) = &self.app_dir {
            config.paths.app_dir = dir.clone();
        }
        config
    }
}

/// Scan the bundle catalog without building a controller.
pub fn scan_catalog(config: &PipelineConfig) -> BundleCatalog {
    BundleCatalog::scan(&ZipExtractor::default(), &config.app_dir, &config.extra_dir())
}

/// Build a controller wired to the real collaborators and the on-disk
/// credential store.
pub fn open_controller(
    config: PipelineConfig,
    status: StatusReporter,
) -> Result<SystemController, CliError> {
    let collaborators = Collaborators::system(&config)?;
    let credentials = CredentialStore::load_default()?;
    Ok(SystemController::new(config, collaborators, credentials, status))
}
