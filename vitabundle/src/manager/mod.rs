//! Bundle acquisition: catalog, download, verification, unpacking and sealing.
//!
//! # Overview
//!
//! Everything the pipeline controller calls into lives here. Each blocking
//! collaborator sits behind a trait in [`traits`]:
//!
//! ```text
//! Fetcher            HttpDownloader      (reqwest, blocking)
//! ArchiveExtractor   ZipExtractor        (zip)
//! PackageDecryptor   CommandDecryptor    (pkg2zip)
//! ContainerSealer    CommandSealer       (psvimg-create)
//! ```
//!
//! The [`BundleCatalog`] scans bundle directories with an `ArchiveExtractor`
//! and reads display names from the embedded `param.sfo` with [`SfoReader`].

mod bundle;
mod catalog;
mod config;
pub mod download;
mod error;
mod external;
mod extractor;
mod sfo;
pub mod traits;

pub use bundle::{BundleDescriptor, BundleId, BUNDLE_ID_LEN};
pub use catalog::{remove_stale_dirs, validate_bundle, BundleCatalog};
pub use config::{
    primary_bundle_id, PipelineConfig, DEFAULT_REMOVAL_ATTEMPTS, DEFAULT_REMOVAL_BACKOFF,
    DEMO_PACKAGE_FILE, DEMO_PACKAGE_SHA256, DEMO_PACKAGE_URL, FULL_ARCHIVE_FILE,
    FULL_ARCHIVE_SHA256, PRIMARY_BUNDLE_ID,
};
pub use download::{DownloadTarget, HttpDownloader};
pub use error::{ManagerError, ManagerResult};
pub use external::{CommandDecryptor, CommandSealer};
pub use extractor::{ZipEntries, ZipExtractor, MAX_ENTRY_READ};
pub use sfo::{SfoError, SfoReader, SfoValue};
pub use traits::{
    ArchiveEntry, ArchiveExtractor, ContainerSealer, Fetcher, PackageDecryptor, ProgressCallback,
};

#[cfg(test)]
pub(crate) use extractor::test_support;
