//! Configuration for the build pipeline.

use std::path::PathBuf;
use std::time::Duration;

use super::bundle::BundleId;
use super::download::{DownloadTarget, DEFAULT_TIMEOUT_SECS};
use super::external::{DEFAULT_PKG2ZIP, DEFAULT_PSVIMG_CREATE};

/// File name of the prebuilt primary archive looked for in the base directory.
pub const FULL_ARCHIVE_FILE: &str = "h-encore-full.zip";

/// Published SHA-256 of the prebuilt primary archive.
pub const FULL_ARCHIVE_SHA256: &str =
    "3ea59bdf6e7d8f5aa96cabd4f0577fcf78822970f463680b0758a5aaa332452d";

/// Source of the demo package the primary bundle is built from.
pub const DEMO_PACKAGE_URL: &str = "http://ares.dl.playstation.net/cdn/JP0741/PCSG90096_00/xGMrXOkORxWRyqzLMihZPqsXAbAXLzvAdJFqtPJLAZTgOcqJobxQAhLNbgiFydVlcmVOrpZKklOYxizQCRpiLfjeROuWivGXfwgkq.pkg";

/// Local file name of the demo package.
pub const DEMO_PACKAGE_FILE: &str = "BitterSmile.pkg";

/// Published SHA-256 of the demo package.
pub const DEMO_PACKAGE_SHA256: &str =
    "280a734a0b40eedac2b3aad36d506cd4ab1a38cd069407e514387a49d81b9302";

/// Identifier of the primary bundle.
pub const PRIMARY_BUNDLE_ID: &str = "PCSG90096";

/// Default number of attempts to remove a stale cached file.
pub const DEFAULT_REMOVAL_ATTEMPTS: u32 = 5;

/// Default pause between removal attempts.
pub const DEFAULT_REMOVAL_BACKOFF: Duration = Duration::from_secs(2);

/// Configuration for the build pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the cached artifacts and the primary tree.
    ///
    /// Queued bundles go to the sibling `extra` directory.
    pub base_dir: PathBuf,

    /// Directory scanned for user-supplied bundle archives.
    pub app_dir: PathBuf,

    /// The primary bundle archive unpacked on top of the decrypted demo.
    pub primary_bundle: PathBuf,

    /// Whether large resource directories are pruned before sealing.
    pub trim_app: bool,

    /// Prebuilt primary archive (cache only, never downloaded).
    pub full_archive: DownloadTarget,

    /// Demo package, downloaded when not cached.
    pub demo_package: DownloadTarget,

    /// Identifier of the primary bundle.
    pub primary_id: BundleId,

    /// Attempts made to remove a stale cached file.
    pub removal_attempts: u32,

    /// Pause between removal attempts.
    pub removal_backoff: Duration,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Decrypt tool.
    pub pkg2zip: PathBuf,

    /// Sealing tool.
    pub psvimg_create: PathBuf,
}

/// The fixed primary identifier.
pub fn primary_bundle_id() -> BundleId {
    BundleId(PRIMARY_BUNDLE_ID.to_string())
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base_dir = PathBuf::from("APP");
        let app_dir = PathBuf::from(".");
        Self {
            primary_bundle: app_dir.join("h-encore.zip"),
            base_dir,
            app_dir,
            trim_app: true,
            full_archive: DownloadTarget::new("", FULL_ARCHIVE_FILE, FULL_ARCHIVE_SHA256),
            demo_package: DownloadTarget::new(
                DEMO_PACKAGE_URL,
                DEMO_PACKAGE_FILE,
                DEMO_PACKAGE_SHA256,
            ),
            primary_id: primary_bundle_id(),
            removal_attempts: DEFAULT_REMOVAL_ATTEMPTS,
            removal_backoff: DEFAULT_REMOVAL_BACKOFF,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pkg2zip: PathBuf::from(DEFAULT_PKG2ZIP),
            psvimg_create: PathBuf::from(DEFAULT_PSVIMG_CREATE),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration rooted at `base_dir`.
    ///
    /// The bundle directory defaults to the parent of `base_dir`.
    pub fn new(base_dir: PathBuf) -> Self {
        let app_dir = base_dir
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            primary_bundle: app_dir.join("h-encore.zip"),
            base_dir,
            app_dir,
            ..Default::default()
        }
    }

    /// Set the bundle directory.
    ///
    /// The primary bundle path follows unless it was set explicitly.
    pub fn with_app_dir(mut self, path: PathBuf) -> Self {
        if self.primary_bundle == self.app_dir.join("h-encore.zip") {
            self.primary_bundle = path.join("h-encore.zip");
        }
        self.app_dir = path;
        self
    }

    /// Set the primary bundle archive.
    pub fn with_primary_bundle(mut self, path: PathBuf) -> Self {
        self.primary_bundle = path;
        self
    }

    /// Enable or disable resource pruning.
    pub fn with_trim_app(mut self, trim: bool) -> Self {
        self.trim_app = trim;
        self
    }

    /// Set the demo package source.
    pub fn with_demo_package(mut self, target: DownloadTarget) -> Self {
        self.demo_package = target;
        self
    }

    /// Set the prebuilt primary archive.
    pub fn with_full_archive(mut self, target: DownloadTarget) -> Self {
        self.full_archive = target;
        self
    }

    /// Set the removal retry policy.
    pub fn with_removal_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.removal_attempts = attempts.max(1);
        self.removal_backoff = backoff;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the external tool paths.
    pub fn with_tools(mut self, pkg2zip: PathBuf, psvimg_create: PathBuf) -> Self {
        self.pkg2zip = pkg2zip;
        self.psvimg_create = psvimg_create;
        self
    }

    /// Directory queued bundles are extracted into.
    pub fn extra_dir(&self) -> PathBuf {
        match self.base_dir.parent() {
            Some(parent) => parent.join("extra"),
            None => PathBuf::from("extra"),
        }
    }
}
