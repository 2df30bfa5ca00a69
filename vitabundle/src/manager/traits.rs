//! Collaborator interfaces used by the build pipeline.
//!
//! Each external routine sits behind a narrow trait so the controller can be
//! driven by test doubles and the concrete tools can be swapped independently.

use std::path::Path;

use super::error::ManagerResult;

/// Byte-level progress callback: `(bytes_done, bytes_total)`.
///
/// `bytes_total` is 0 when the size is not known up front.
pub type ProgressCallback<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Fetches remote resources.
pub trait Fetcher: Send + Sync + 'static {
    /// Download `url` into `dest`, truncating any existing content.
    ///
    /// Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path, progress: ProgressCallback<'_>) -> ManagerResult<u64>;

    /// GET `url` and return the full response body as text.
    fn fetch_text(&self, url: &str) -> ManagerResult<String>;
}

/// Single entry of an archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive, `/`-separated.
    pub name: String,
    /// Whether the entry is a directory record.
    pub is_dir: bool,
}

/// Reads and unpacks container archives.
pub trait ArchiveExtractor: Send + Sync + 'static {
    /// Lazy iterator over the entries of an opened archive.
    type Entries: Iterator<Item = ManagerResult<ArchiveEntry>>;

    /// Open `archive` and enumerate its entries.
    fn list_entries(&self, archive: &Path) -> ManagerResult<Self::Entries>;

    /// Extract every entry of `archive` below `dest_dir`.
    ///
    /// `progress` receives `(entries_done, entries_total)`. Returns the
    /// number of entries processed.
    fn extract_all(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: ProgressCallback<'_>,
    ) -> ManagerResult<usize>;

    /// Read a single entry by exact path, `None` if it does not exist.
    fn read_entry(&self, archive: &Path, entry: &str) -> ManagerResult<Option<Vec<u8>>>;
}

/// Decrypts a protected package and unpacks its content.
pub trait PackageDecryptor: Send + Sync + 'static {
    /// Unpack `package` into `dest_dir`.
    ///
    /// The content lands as `dest_dir/app/<bundle id>/…`.
    fn decrypt(&self, package: &Path, dest_dir: &Path) -> ManagerResult<()>;
}

/// Produces sealed, device-consumable containers from plaintext directories.
pub trait ContainerSealer: Send + Sync + 'static {
    /// Seal `work_dir/plaintext_dir` into `work_dir/output_path`.
    ///
    /// Both paths are relative to `work_dir`, which the sealer uses as its
    /// working directory.
    fn seal(
        &self,
        work_dir: &Path,
        plaintext_dir: &str,
        output_path: &str,
        key: &str,
        label: &str,
    ) -> ManagerResult<()>;
}
