//! Key command - resolve and print the backup key for an account.

use clap::Args;
use console::style;
use vitabundle::config::ConfigFile;
use vitabundle::pipeline::{StatusEvent, StatusReporter};

use super::common::{open_controller, PathArgs};
use crate::error::CliError;

/// Arguments for `vitabundle key`.
#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Account id, as shown by the Content Manager host
    #[arg(long, visible_alias = "aid")]
    pub account: String,

    #[command(flatten)]
    pub paths: PathArgs,
}

/// Run the key command.
pub async fn run(args: KeyArgs, config: &ConfigFile) -> Result<(), CliError> {
    let config = args.paths.apply(config);
    println!("Launch Content Manager on PS Vita and connect to computer.");

    let (status, mut rx) = StatusReporter::channel();
    let mut controller = open_controller(config.to_pipeline_config(), status)?;
    let result = controller.resolve_backup_key(&args.account).await;
    drop(controller);

    while let Some(event) = rx.recv().await {
        if let StatusEvent::Text(text) = event {
            eprintln!("{} {}", style("::").cyan().bold(), text);
        }
    }

    let key = result?;
    println!("{}", key);
    Ok(())
}
