//! Build command - run the whole pipeline.

use clap::Args;
use console::style;
use tracing::{info, warn};
use vitabundle::config::ConfigFile;
use vitabundle::credentials::BACKUP_KEY_LEN;
use vitabundle::manager::BundleId;
use vitabundle::pipeline::{StatusReporter, SystemController};

use super::common::{open_controller, PathArgs};
use crate::error::CliError;
use crate::ui::{select_bundles, StatusView};

/// Arguments for `vitabundle build`.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Account id used to look up the backup key
    #[arg(long, visible_alias = "aid", required_unless_present = "key")]
    pub account: Option<String>,

    /// Backup key to seal with, skipping the lookup
    #[arg(long, value_name = "HEX")]
    pub key: Option<String>,

    /// Extra bundle ids to include, in build order
    #[arg(long = "select", value_name = "ID", num_args = 1..)]
    pub select: Vec<BundleId>,

    /// Pick extra bundles from a menu
    #[arg(long, short, conflicts_with = "select")]
    pub interactive: bool,

    /// Keep the primary bundle's unused resources
    #[arg(long)]
    pub no_trim: bool,

    #[command(flatten)]
    pub paths: PathArgs,
}

/// Check a key given on the command line.
pub fn validate_key(key: &str) -> Result<&str, CliError> {
    let key = key.trim();
    if key.len() == BACKUP_KEY_LEN && key.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(key)
    } else {
        Err(CliError::Selection(format!(
            "backup key must be {} hexadecimal characters",
            BACKUP_KEY_LEN
        )))
    }
}

/// Run the build command.
pub async fn run(args: BuildArgs, config: &ConfigFile) -> Result<(), CliError> {
    let config = args.paths.apply(config);
    let pipeline = config.to_pipeline_config();
    let pipeline = if args.no_trim {
        pipeline.with_trim_app(false)
    } else {
        pipeline
    };

    let (status, rx) = StatusReporter::channel();
    let view = StatusView::new();
    let renderer = tokio::spawn(view.clone().follow(rx));

    let mut controller = open_controller(pipeline, status)?;

    // Prompt before any status is rendered so the menu owns the terminal.
    let primary = controller.config().primary_id.clone();
    let selected = if args.interactive {
        select_bundles(controller.catalog(), &primary)?
    } else {
        args.select.clone()
    };
    for id in &selected {
        if !controller.select_bundle(id, true) {
            warn!(bundle_id = %id, "Unknown bundle");
            eprintln!(
                "{} {} is not in the bundle catalog, skipping",
                style("warning:").yellow().bold(),
                id
            );
        }
    }

    info!(selected = controller.selection().len(), "Starting build");
    let result = match use_backup_key(&mut controller, &args).await {
        Ok(()) => controller.run().await.map_err(CliError::from),
        Err(e) => Err(e),
    };
    let output = controller.config().base_dir.clone();
    drop(controller);
    // The renderer ends once the controller's reporter is dropped.
    let _ = renderer.await;

    match result {
        Ok(()) => {
            view.finish();
            println!();
            println!("Output: {}", style(output.display()).green());
            Ok(())
        }
        Err(e) => {
            view.abandon();
            Err(e)
        }
    }
}

/// Set the key given on the command line, or resolve it for the account.
async fn use_backup_key(controller: &mut SystemController, args: &BuildArgs) -> Result<(), CliError> {
    match (&args.key, &args.account) {
        (Some(key), _) => {
            controller.set_backup_key(validate_key(key)?);
            Ok(())
        }
        (None, Some(account)) => {
            controller.resolve_backup_key(account).await?;
            Ok(())
        }
        (None, None) => Err(CliError::Selection(
            "an account id or a backup key is required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_hex() {
        let key = "a1".repeat(32);
        assert_eq!(validate_key(&key).unwrap(), key);
        assert_eq!(validate_key(&format!(" {} ", key)).unwrap(), key);
    }

    #[test]
    fn test_validate_key_rejects_short_or_non_hex() {
        assert!(validate_key("abcd").is_err());
        assert!(validate_key(&"zz".repeat(32)).is_err());
    }
}
