//! vitabundle CLI - command-line front-end to the vitabundle library.

mod commands;
mod error;
mod ui;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use vitabundle::config::ConfigFile;
use vitabundle::logging::init_logging;

use commands::build::BuildArgs;
use commands::config::ConfigCommands;
use commands::key::KeyArgs;
use commands::list::ListArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "vitabundle", version = vitabundle::VERSION, about, long_about = None)]
struct Cli {
    /// Log debug detail from vitabundle
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download, unpack and seal the primary bundle plus any selected extras
    Build(BuildArgs),

    /// List the bundles available for selection
    List(ListArgs),

    /// Resolve the backup key for an account
    Key(KeyArgs),

    /// View or change settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Write the default configuration file
    Init,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config(command) => return commands::config::run(command),
        Commands::Init => return commands::init::run(),
        command => command,
    };

    let config = ConfigFile::load()?;
    let _guard = start_logging(&config, cli.verbose);

    match command {
        Commands::List(args) => commands::list::run(args, &config),
        Commands::Build(args) => block_on(commands::build::run(args, &config)),
        Commands::Key(args) => block_on(commands::key::run(args, &config)),
        Commands::Config(_) | Commands::Init => Ok(()),
    }
}

/// Logging is best effort; a failure is reported and the command goes on.
fn start_logging(config: &ConfigFile, verbose: bool) -> Option<WorkerGuard> {
    match init_logging(&config.logging.directory, verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    }
}

fn block_on<F>(future: F) -> Result<(), CliError>
where
    F: std::future::Future<Output = Result<(), CliError>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    runtime.block_on(future)
}
