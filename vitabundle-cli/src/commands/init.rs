//! Init command - write config.ini and create the working directories.

use std::fs;
use std::path::Path;

use vitabundle::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file keeps its values; missing keys get their defaults.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    let config = init_config(&path)?;

    for dir in [&config.paths.base_dir, &config.paths.app_dir] {
        fs::create_dir_all(dir).map_err(|e| {
            CliError::Config(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }

    println!("Configuration file: {}", path.display());
    println!();
    println!("Put bundle archives (.zip) in:");
    println!("  {}", config.paths.app_dir.display());
    println!("Build output goes to:");
    println!("  {}", config.paths.base_dir.display());
    println!();
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

/// Load `path` (defaults when absent) and write it back complete.
///
/// A file that cannot be read or holds an invalid value is left untouched.
pub fn init_config(path: &Path) -> Result<ConfigFile, CliError> {
    let config = ConfigFile::load_from(path)?;
    config.save_to(path)?;
    Ok(config)
}
