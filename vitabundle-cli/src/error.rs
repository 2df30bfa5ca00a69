//! CLI error type.

use std::fmt;
use std::process;

use vitabundle::config::ConfigError;
use vitabundle::manager::ManagerError;

/// Errors surfaced to the user by a command.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be read, written or validated.
    Config(String),
    /// A library operation failed.
    Manager(ManagerError),
    /// The async runtime could not be started.
    Runtime(String),
    /// The interactive prompt failed.
    Prompt(String),
    /// Bundle selection named nothing usable.
    Selection(String),
}

impl CliError {
    /// Exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }

    /// Print the error and terminate the process.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        process::exit(self.exit_code());
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "configuration: {}", msg),
            CliError::Manager(e) => write!(f, "{}", e),
            CliError::Runtime(msg) => write!(f, "runtime: {}", msg),
            CliError::Prompt(msg) => write!(f, "prompt: {}", msg),
            CliError::Selection(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Manager(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ManagerError> for CliError {
    fn from(e: ManagerError) -> Self {
        CliError::Manager(e)
    }
}
