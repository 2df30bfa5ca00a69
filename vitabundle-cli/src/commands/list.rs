//! List command - show the bundle catalog.

use clap::Args;
use console::style;
use vitabundle::config::ConfigFile;
use vitabundle::manager::BundleCatalog;

use super::common::{scan_catalog, PathArgs};
use crate::error::CliError;

/// Arguments for `vitabundle list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show the archive each bundle comes from
    #[arg(long, short)]
    pub long: bool,

    #[command(flatten)]
    pub paths: PathArgs,
}

/// Run the list command.
pub fn run(args: ListArgs, config: &ConfigFile) -> Result<(), CliError> {
    let config = args.paths.apply(config);
    let pipeline = config.to_pipeline_config();
    let catalog = scan_catalog(&pipeline);

    if catalog.is_empty() {
        println!("No bundles found in {}", pipeline.app_dir.display());
        return Ok(());
    }

    for line in catalog_lines(&catalog, args.long) {
        println!("{}", line);
    }
    println!();
    println!("{} bundle(s)", catalog.len());
    Ok(())
}

/// One line per catalog entry, in identifier order.
pub fn catalog_lines(catalog: &BundleCatalog, long: bool) -> Vec<String> {
    catalog
        .iter()
        .map(|bundle| {
            let mut line = format!(
                "{}  {}",
                style(&bundle.bundle_id).cyan(),
                bundle.display_name
            );
            if long {
                line.push_str(&format!("\n    {}", bundle.archive_path.display()));
            }
            line
        })
        .collect()
}
