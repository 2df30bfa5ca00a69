//! Interactive bundle selection.

use dialoguer::console::Term;
use dialoguer::MultiSelect;
use vitabundle::manager::{BundleCatalog, BundleDescriptor, BundleId};

use crate::error::CliError;

/// Menu label for a catalog entry.
pub fn menu_label(descriptor: &BundleDescriptor) -> String {
    if descriptor.display_name == descriptor.bundle_id.as_str() {
        descriptor.bundle_id.to_string()
    } else {
        format!("{} - {}", descriptor.display_name, descriptor.bundle_id)
    }
}

/// Let the user tick bundles to add to the build.
///
/// The primary bundle is always built and is left out of the menu. Returns
/// the chosen identifiers in menu order; cancelling selects nothing.
pub fn select_bundles(catalog: &BundleCatalog, primary: &BundleId) -> Result<Vec<BundleId>, CliError> {
    let choices: Vec<&BundleDescriptor> = catalog
        .iter()
        .filter(|descriptor| &descriptor.bundle_id != primary)
        .collect();
    if choices.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<String> = choices.iter().map(|d| menu_label(d)).collect();

    let selection = MultiSelect::new()
        .with_prompt("Select bundles to add\n↑↓ to move, SPACE to select/deselect, ENTER to confirm, ESC/q to cancel")
        .items(&items)
        .interact_on_opt(&Term::stderr())
        .map_err(|e| CliError::Prompt(e.to_string()))?;

    Ok(selection
        .unwrap_or_default()
        .into_iter()
        .filter_map(|idx| choices.get(idx).map(|d| d.bundle_id.clone()))
        .collect())
}
