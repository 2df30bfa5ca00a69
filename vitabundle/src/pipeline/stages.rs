//! Blocking bodies of the pipeline stages.
//!
//! Each function here runs as one unit on the worker pool. Everything a
//! stage changes on disk happens inside its unit, so the controller only
//! ever sees finished work.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::layout::{sealed_output, Layout, PRUNE_DIRS, SEAL_DIRS, SEAL_PERCENTS};
use super::queue::UnpackJob;
use super::status::StatusReporter;
use crate::manager::download::{verify_checksum, DownloadTarget};
use crate::manager::{
    ArchiveExtractor, BundleId, ContainerSealer, Fetcher, ManagerError, ManagerResult,
    PackageDecryptor,
};

/// Result of the cache check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The prebuilt primary archive is valid.
    FullArchive(PathBuf),
    /// The demo package is valid and can be decrypted.
    DemoPackage(PathBuf),
    /// Nothing usable is cached; the demo package has to be fetched.
    Download(DownloadTarget),
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Hash `path` and compare against `expected`, reporting progress.
///
/// A missing or unreadable file does not verify.
pub fn verify_file(path: &Path, expected: &str, status: &StatusReporter) -> bool {
    if !path.is_file() {
        return false;
    }

    status.text(format!("Verifying {}", file_name(path)));
    status.reset();
    let ok = verify_checksum(path, expected, &|done, total| status.progress(done, total));
    if !ok {
        warn!(path = %path.display(), "Checksum mismatch");
        status.text("sha256sum mismatch! Please check your network.");
    }
    ok
}

/// Remove `path`, retrying up to `attempts` times with `backoff` between tries.
///
/// A file that is already gone counts as removed.
///
/// # Errors
///
/// Returns `ManagerError::FileRemovalFailed` once every attempt has failed.
pub fn remove_with_retry(path: &Path, attempts: u32, backoff: Duration) -> ManagerResult<()> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), attempt, "Removed stale file");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "Cannot remove stale file");
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }
    Err(ManagerError::FileRemovalFailed {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Decide where the build starts from.
///
/// A valid prebuilt archive wins. Otherwise it is removed and the demo
/// package gets the same verify-or-remove treatment.
pub fn check_cache(
    full_archive: &DownloadTarget,
    demo_package: &DownloadTarget,
    layout: &Layout,
    attempts: u32,
    backoff: Duration,
    status: &StatusReporter,
) -> ManagerResult<CacheOutcome> {
    let full_path = layout.cached(&full_archive.local_filename);
    if full_path.exists() {
        if verify_file(&full_path, &full_archive.expected_digest_hex, status) {
            info!(path = %full_path.display(), "Using cached prebuilt archive");
            return Ok(CacheOutcome::FullArchive(full_path));
        }
        info!(path = %full_path.display(), "Removing old file");
        remove_with_retry(&full_path, attempts, backoff)?;
    }

    let demo_path = layout.cached(&demo_package.local_filename);
    if demo_path.exists() {
        if verify_file(&demo_path, &demo_package.expected_digest_hex, status) {
            info!(path = %demo_path.display(), "Using cached demo package");
            return Ok(CacheOutcome::DemoPackage(demo_path));
        }
        info!(path = %demo_path.display(), "Removing old file");
        remove_with_retry(&demo_path, attempts, backoff)?;
    }

    Ok(CacheOutcome::Download(demo_package.clone()))
}

/// Download `target` into the base directory.
pub fn download<F: Fetcher>(
    fetcher: &F,
    target: &DownloadTarget,
    layout: &Layout,
    status: &StatusReporter,
) -> ManagerResult<PathBuf> {
    let dest = layout.cached(&target.local_filename);
    fs::create_dir_all(layout.base_dir()).map_err(|e| ManagerError::CreateDirFailed {
        path: layout.base_dir().to_path_buf(),
        source: e,
    })?;

    info!(url = %target.url, "Start downloading");
    status.text(format!("Downloading {}", target.local_filename));
    status.reset();
    let bytes = fetcher.fetch(&target.url, &dest, &|done, total| {
        status.progress(done, total)
    })?;
    debug!(bytes, dest = %dest.display(), "Download finished");
    Ok(dest)
}

/// Check a fresh download against its published digest.
///
/// # Errors
///
/// Returns `ManagerError::DigestMismatch`; the file is left in place and is
/// cleaned up by the next cache check.
pub fn verify_download(
    path: &Path,
    target: &DownloadTarget,
    status: &StatusReporter,
) -> ManagerResult<PathBuf> {
    if verify_file(path, &target.expected_digest_hex, status) {
        Ok(path.to_path_buf())
    } else {
        Err(ManagerError::DigestMismatch {
            filename: target.local_filename.clone(),
            expected: target.expected_digest_hex.clone(),
        })
    }
}

/// Decrypt the demo package into a fresh primary tree and rename its app.
pub fn decrypt_primary<D: PackageDecryptor>(
    decryptor: &D,
    package: &Path,
    layout: &Layout,
    status: &StatusReporter,
) -> ManagerResult<()> {
    info!(package = %package.display(), "Unpacking demo package");
    status.text(format!("Unpacking {}", file_name(package)));
    status.reset();

    let root = layout.primary_root();
    match fs::remove_dir_all(&root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ManagerError::WriteFailed { path: root, source: e }),
    }
    fs::create_dir_all(&root).map_err(|e| ManagerError::CreateDirFailed {
        path: root.clone(),
        source: e,
    })?;

    decryptor.decrypt(package, &root)?;

    let decrypted = layout.decrypted_app_dir();
    if !decrypted.is_dir() {
        return Err(ManagerError::DecryptFailed {
            path: package.to_path_buf(),
            reason: format!("{} missing after unpacking", decrypted.display()),
        });
    }
    let renamed = layout.renamed_app_dir();
    fs::rename(&decrypted, &renamed).map_err(|e| ManagerError::WriteFailed {
        path: renamed,
        source: e,
    })?;

    status.percent(100);
    Ok(())
}

/// Extract one queued job.
///
/// The primary bundle also gets its license file copied into place.
pub fn extract_job<X: ArchiveExtractor>(
    extractor: &X,
    job: &UnpackJob,
    layout: &Layout,
    status: &StatusReporter,
) -> ManagerResult<BundleId> {
    status.reset();
    info!(archive = %job.archive_path.display(), bundle_id = %job.bundle_id, "Decompressing");
    status.text(format!("Decompressing {}", job.archive_path.display()));

    let dest = layout.extract_dir(&job.bundle_id);
    let entries = extractor.extract_all(&job.archive_path, dest, &|done, total| {
        status.progress(done, total)
    })?;
    debug!(entries, dest = %dest.display(), "Extracted");

    if layout.is_primary(&job.bundle_id) {
        copy_license(layout)?;
    }

    status.percent(100);
    Ok(job.bundle_id.clone())
}

/// Copy the package license of the renamed primary app, if there is one.
fn copy_license(layout: &Layout) -> ManagerResult<()> {
    let source = layout.license_source();
    if !source.is_file() {
        debug!(path = %source.display(), "No license to copy");
        return Ok(());
    }

    let dest = layout.license_dest();
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::copy(&source, &dest).map_err(|e| ManagerError::WriteFailed {
        path: dest.clone(),
        source: e,
    })?;
    debug!(dest = %dest.display(), "Copied license");
    Ok(())
}

/// Remove the large resource directories of the primary app.
///
/// Returns how many directories were removed.
pub fn prune_primary(layout: &Layout, status: &StatusReporter) -> usize {
    info!("Trimming package");
    status.text("Trimming package");

    let app_dir = layout.renamed_app_dir();
    let mut removed = 0;
    for relative in PRUNE_DIRS {
        let dir = app_dir.join(relative);
        if !dir.is_dir() {
            continue;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => removed += 1,
            Err(e) => warn!(dir = %dir.display(), error = %e, "Cannot trim directory"),
        }
    }
    debug!(removed, "Done trimming");
    removed
}

/// Seal every present subdirectory of the bundle, deleting each plaintext
/// directory right after it is sealed.
///
/// Returns the number of subdirectories sealed.
pub fn seal_bundle<S: ContainerSealer>(
    sealer: &S,
    bundle_id: &BundleId,
    key: &str,
    trim_app: bool,
    layout: &Layout,
    status: &StatusReporter,
) -> ManagerResult<usize> {
    if trim_app && layout.is_primary(bundle_id) {
        prune_primary(layout, status);
    }

    let work_dir = layout.seal_dir(bundle_id);
    info!(bundle_id = %bundle_id, work_dir = %work_dir.display(), "Creating sealed containers");
    status.text(format!("Creating sealed containers for {}", bundle_id));
    status.reset();

    let mut sealed = 0;
    for (subdir, percent) in SEAL_DIRS.iter().zip(SEAL_PERCENTS) {
        status.percent(percent);

        let plaintext = work_dir.join(subdir);
        if !plaintext.is_dir() {
            debug!(bundle_id = %bundle_id, subdir, "Nothing to seal");
            continue;
        }

        sealer.seal(
            &work_dir,
            subdir,
            &sealed_output(bundle_id, subdir),
            key,
            subdir,
        )?;
        fs::remove_dir_all(&plaintext).map_err(|e| ManagerError::WriteFailed {
            path: plaintext.clone(),
            source: e,
        })?;
        sealed += 1;
    }
    status.percent(SEAL_PERCENTS[SEAL_DIRS.len()]);

    Ok(sealed)
}
