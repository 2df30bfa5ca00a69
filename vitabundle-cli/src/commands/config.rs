//! Config command - read and change `config.ini` settings.

use clap::Subcommand;
use vitabundle::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting as section.key (e.g. pipeline.trim_app)
        key: String,
    },

    /// Change one setting
    Set {
        /// Setting as section.key (e.g. paths.base_dir)
        key: String,

        /// New value
        value: String,
    },

    /// Print every setting
    List,

    /// Print the location of config.ini
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let config = ConfigFile::load().unwrap_or_default();
            println!("{}", show_value(&parse_key(&key)?.get(&config)));
            Ok(())
        }
        ConfigCommands::Set { key, value } => set(&key, &value),
        ConfigCommands::List => {
            let config = ConfigFile::load().unwrap_or_default();
            print!("{}", render_settings(&config));
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "unknown key '{}', see 'vitabundle config list'",
            key
        ))
    })
}

fn set(key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    config_key.set(&mut config, value)?;
    config.save()?;

    println!("{} = {}", config_key.name(), show_value(&config_key.get(&config)));
    Ok(())
}

fn show_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Settings grouped under `[section]` headers, in key order.
pub fn render_settings(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut section = "";

    for key in ConfigKey::all() {
        if key.section() != section {
            if !section.is_empty() {
                out.push('\n');
            }
            section = key.section();
            out.push_str(&format!("[{}]\n", section));
        }
        out.push_str(&format!("  {} = {}\n", key.key_name(), show_value(&key.get(config))));
    }
    out
}
