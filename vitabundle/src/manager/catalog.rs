//! Discovery of selectable extra bundles.
//!
//! A bundle is a zip archive laid out like a Content Manager backup:
//!
//! ```text
//! app/                      directory record
//! appmeta/                  directory record
//! PCSE00001/                exactly one title id directory
//! PCSE00001/sce_sys/param.sfo
//! ```
//!
//! Archives that do not match are skipped without raising an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, info, warn};

use super::bundle::{BundleDescriptor, BundleId};
use super::error::{ManagerError, ManagerResult};
use super::sfo::SfoReader;
use super::traits::ArchiveExtractor;

/// Descriptor path below the title id directory.
const DESCRIPTOR_PATH: &str = "sce_sys/param.sfo";

/// Descriptor key holding the display name.
const TITLE_KEY: &str = "TITLE";

/// Bundles found on disk, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    bundles: BTreeMap<BundleId, BundleDescriptor>,
}

impl BundleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from the bundle directory and the `extra` directory.
    ///
    /// Stale extraction leftovers in `extra_dir` are removed before it is
    /// scanned. A bundle found in `extra_dir` replaces one with the same
    /// identifier from `app_dir`.
    pub fn scan<X: ArchiveExtractor>(extractor: &X, app_dir: &Path, extra_dir: &Path) -> Self {
        let mut catalog = Self::new();
        catalog.scan_dir(extractor, app_dir);

        if extra_dir.is_dir() {
            let removed = remove_stale_dirs(extra_dir);
            if removed > 0 {
                debug!(removed, dir = %extra_dir.display(), "Removed old unzipped directories");
            }
            catalog.scan_dir(extractor, extra_dir);
        }

        info!(bundles = catalog.len(), "Bundle catalog ready");
        catalog
    }

    /// Add every valid bundle archive directly inside `dir`, in name order.
    pub fn scan_dir<X: ArchiveExtractor>(&mut self, extractor: &X, dir: &Path) {
        for path in zip_files(dir) {
            match validate_bundle(extractor, &path) {
                Ok(descriptor) => self.insert(descriptor),
                Err(e) => debug!(error = %e, "Skipping archive"),
            }
        }
    }

    /// Insert a descriptor; an existing one with the same identifier is replaced.
    pub fn insert(&mut self, descriptor: BundleDescriptor) {
        if let Some(previous) = self
            .bundles
            .insert(descriptor.bundle_id.clone(), descriptor.clone())
        {
            warn!(
                bundle_id = %descriptor.bundle_id,
                replaced = %previous.archive_path.display(),
                by = %descriptor.archive_path.display(),
                "Duplicate bundle id, keeping the later archive"
            );
        }
    }

    /// Look up a bundle.
    pub fn get(&self, id: &BundleId) -> Option<&BundleDescriptor> {
        self.bundles.get(id)
    }

    /// Whether a bundle with this identifier is known.
    pub fn contains(&self, id: &BundleId) -> bool {
        self.bundles.contains_key(id)
    }

    /// Bundles in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &BundleDescriptor> {
        self.bundles.values()
    }

    /// Number of bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// Check the structure of a candidate archive and read its display name.
///
/// # Errors
///
/// Returns `ManagerError::InvalidBundle` when a marker or the descriptor is
/// missing, or the archive error when it cannot be opened at all.
pub fn validate_bundle<X: ArchiveExtractor>(
    extractor: &X,
    archive: &Path,
) -> ManagerResult<BundleDescriptor> {
    let invalid = |reason: &str| ManagerError::InvalidBundle {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut has_app = false;
    let mut has_appmeta = false;
    let mut title_id: Option<BundleId> = None;

    for entry in extractor.list_entries(archive)? {
        let entry = entry?;
        if !entry.is_dir {
            continue;
        }
        match entry.name.as_str() {
            "app/" => has_app = true,
            "appmeta/" => has_appmeta = true,
            name => {
                if let Some(id) = BundleId::from_dir_entry(name) {
                    match &title_id {
                        Some(existing) if *existing != id => {
                            return Err(invalid("more than one title id directory"));
                        }
                        _ => title_id = Some(id),
                    }
                }
            }
        }
    }

    if !has_app {
        return Err(invalid("missing app/ directory"));
    }
    if !has_appmeta {
        return Err(invalid("missing appmeta/ directory"));
    }
    let bundle_id = title_id.ok_or_else(|| invalid("missing title id directory"))?;

    let descriptor_path = format!("{}/{}", bundle_id, DESCRIPTOR_PATH);
    let data = extractor
        .read_entry(archive, &descriptor_path)?
        .ok_or_else(|| invalid("missing param.sfo"))?;

    let display_name = match SfoReader::load(&data) {
        Ok(reader) => reader.value(TITLE_KEY, bundle_id.as_str()),
        Err(e) => {
            debug!(error = %e, archive = %archive.display(), "Unreadable descriptor, using title id");
            bundle_id.to_string()
        }
    };

    Ok(BundleDescriptor {
        archive_path: archive.to_path_buf(),
        bundle_id,
        display_name,
    })
}

/// Zip files directly inside `dir`, sorted by file name.
fn zip_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/*.zip", Pattern::escape(&dir.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files: Vec<PathBuf> = match glob::glob_with(&pattern, options) {
        Ok(paths) => paths.flatten().filter(|p| p.is_file()).collect(),
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "Cannot scan for bundles");
            return Vec::new();
        }
    };
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// Remove every subdirectory of `dir`, returning how many were removed.
///
/// Files (the bundle archives themselves) are left alone.
pub fn remove_stale_dirs(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(error = %e, dir = %path.display(), "Cannot remove stale directory"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::extractor::test_support::{write_zip, Fixture};
    use crate::manager::extractor::ZipExtractor;
    use crate::manager::sfo::build_sfo;
    use tempfile::TempDir;

    fn write_bundle(path: &Path, id: &str, title: &str) {
        let sfo = build_sfo(&[("TITLE", title)]);
        let sfo_path = format!("{}/sce_sys/param.sfo", id);
        let id_dir = format!("{}/", id);
        write_zip(
            path,
            &[
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::Dir(&id_dir),
                Fixture::File(&sfo_path, &sfo),
            ],
        );
    }

    #[test]
    fn test_single_valid_bundle() {
        let temp = TempDir::new().unwrap();
        write_bundle(&temp.path().join("game.zip"), "PCSE00001", "Some Game");

        let catalog =
            BundleCatalog::scan(&ZipExtractor::new(), temp.path(), &temp.path().join("none"));

        assert_eq!(catalog.len(), 1);
        let bundle = catalog.iter().next().unwrap();
        assert_eq!(bundle.bundle_id.as_str(), "PCSE00001");
        assert_eq!(bundle.display_name, "Some Game");
        assert_eq!(bundle.archive_path, temp.path().join("game.zip"));
    }

    #[test]
    fn test_each_missing_marker_excludes_bundle() {
        let sfo = build_sfo(&[("TITLE", "Some Game")]);
        let cases: Vec<Vec<Fixture<'_>>> = vec![
            vec![
                Fixture::Dir("appmeta/"),
                Fixture::Dir("PCSE00001/"),
                Fixture::File("PCSE00001/sce_sys/param.sfo", &sfo),
            ],
            vec![
                Fixture::Dir("app/"),
                Fixture::Dir("PCSE00001/"),
                Fixture::File("PCSE00001/sce_sys/param.sfo", &sfo),
            ],
            vec![
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::File("PCSE00001/sce_sys/param.sfo", &sfo),
            ],
            vec![
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::Dir("PCSE00001/"),
            ],
        ];

        for (i, entries) in cases.iter().enumerate() {
            let temp = TempDir::new().unwrap();
            write_zip(&temp.path().join("game.zip"), entries);
            let catalog =
                BundleCatalog::scan(&ZipExtractor::new(), temp.path(), &temp.path().join("none"));
            assert!(catalog.is_empty(), "case {} should be rejected", i);
        }
    }

    #[test]
    fn test_unparseable_descriptor_falls_back_to_id() {
        let temp = TempDir::new().unwrap();
        write_zip(
            &temp.path().join("game.zip"),
            &[
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::Dir("PCSE00002/"),
                Fixture::File("PCSE00002/sce_sys/param.sfo", b"garbage"),
            ],
        );

        let descriptor =
            validate_bundle(&ZipExtractor::new(), &temp.path().join("game.zip")).unwrap();
        assert_eq!(descriptor.display_name, "PCSE00002");
    }

    #[test]
    fn test_oversized_descriptor_excludes_bundle() {
        let temp = TempDir::new().unwrap();
        let huge = vec![0u8; crate::manager::MAX_ENTRY_READ + 1];
        write_zip(
            &temp.path().join("huge.zip"),
            &[
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::Dir("PCSE00005/"),
                Fixture::File("PCSE00005/sce_sys/param.sfo", &huge),
            ],
        );
        write_bundle(&temp.path().join("ok.zip"), "PCSE00006", "Fine");

        let result = validate_bundle(&ZipExtractor::new(), &temp.path().join("huge.zip"));
        assert!(matches!(result, Err(ManagerError::ExtractionFailed { .. })));

        let catalog =
            BundleCatalog::scan(&ZipExtractor::new(), temp.path(), &temp.path().join("none"));
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains(&BundleId::parse("PCSE00005").unwrap()));
    }

    #[test]
    fn test_two_title_dirs_rejected() {
        let temp = TempDir::new().unwrap();
        let sfo = build_sfo(&[("TITLE", "Two")]);
        write_zip(
            &temp.path().join("two.zip"),
            &[
                Fixture::Dir("app/"),
                Fixture::Dir("appmeta/"),
                Fixture::Dir("PCSE00001/"),
                Fixture::Dir("PCSE00002/"),
                Fixture::File("PCSE00001/sce_sys/param.sfo", &sfo),
            ],
        );

        let result = validate_bundle(&ZipExtractor::new(), &temp.path().join("two.zip"));
        assert!(matches!(result, Err(ManagerError::InvalidBundle { .. })));
    }

    #[test]
    fn test_non_zip_and_corrupt_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), b"hello").unwrap();
        fs::write(temp.path().join("broken.zip"), b"not a zip").unwrap();
        write_bundle(&temp.path().join("good.zip"), "PCSE00003", "Good");

        let catalog =
            BundleCatalog::scan(&ZipExtractor::new(), temp.path(), &temp.path().join("none"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_extra_dir_cleanup_and_last_writer_wins() {
        let temp = TempDir::new().unwrap();
        let app_dir = temp.path().join("bundles");
        let extra_dir = temp.path().join("extra");
        fs::create_dir_all(&app_dir).unwrap();
        fs::create_dir_all(extra_dir.join("app/leftover")).unwrap();

        write_bundle(&app_dir.join("a.zip"), "PCSE00001", "From app dir");
        write_bundle(&extra_dir.join("b.zip"), "PCSE00001", "From extra dir");
        write_bundle(&extra_dir.join("c.zip"), "PCSE00004", "Other");

        let catalog = BundleCatalog::scan(&ZipExtractor::new(), &app_dir, &extra_dir);

        assert!(!extra_dir.join("app").exists());
        assert!(extra_dir.join("b.zip").exists());
        assert_eq!(catalog.len(), 2);
        let id = BundleId::parse("PCSE00001").unwrap();
        assert_eq!(catalog.get(&id).unwrap().display_name, "From extra dir");
    }

    #[test]
    fn test_name_order_within_directory() {
        let temp = TempDir::new().unwrap();
        write_bundle(&temp.path().join("b.zip"), "PCSE00001", "From b");
        write_bundle(&temp.path().join("a.zip"), "PCSE00001", "From a");

        let catalog =
            BundleCatalog::scan(&ZipExtractor::new(), temp.path(), &temp.path().join("none"));
        let id = BundleId::parse("PCSE00001").unwrap();
        assert_eq!(catalog.get(&id).unwrap().display_name, "From b");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let catalog = BundleCatalog::scan(
            &ZipExtractor::new(),
            Path::new("/nonexistent/bundles"),
            Path::new("/nonexistent/extra"),
        );
        assert!(catalog.is_empty());
    }
}
