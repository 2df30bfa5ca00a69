//! Zip archive access for bundle validation and unpacking.
//!
//! This module handles:
//! - Lazy enumeration of archive entries
//! - Reading single entries into memory (structural checks)
//! - Full extraction below a destination directory

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::error::{ManagerError, ManagerResult};
use super::traits::{ArchiveEntry, ArchiveExtractor, ProgressCallback};

type ZipReader = ZipArchive<BufReader<File>>;

/// Largest entry `read_entry` loads into memory.
pub const MAX_ENTRY_READ: usize = 1024 * 1024;

/// Zip-based archive extractor.
#[derive(Debug, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    /// Create a new zip extractor.
    pub fn new() -> Self {
        Self
    }

    fn open(archive: &Path) -> ManagerResult<ZipReader> {
        let file = File::open(archive).map_err(|e| ManagerError::ExtractionFailed {
            path: archive.to_path_buf(),
            reason: format!("cannot open archive: {}", e),
        })?;

        ZipArchive::new(BufReader::new(file)).map_err(|e| ManagerError::ExtractionFailed {
            path: archive.to_path_buf(),
            reason: format!("not a readable zip archive: {}", e),
        })
    }
}

/// Entries of an opened archive, yielded one at a time.
///
/// Holds the archive open; once exhausted the archive has to be reopened to
/// enumerate again.
pub struct ZipEntries {
    archive: ZipReader,
    path: std::path::PathBuf,
    next: usize,
}

impl Iterator for ZipEntries {
    type Item = ManagerResult<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.archive.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let entry = self
            .archive
            .by_index_raw(index)
            .map(|file| ArchiveEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
            })
            .map_err(|e| ManagerError::ExtractionFailed {
                path: self.path.clone(),
                reason: format!("entry {}: {}", index, e),
            });
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.archive.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ArchiveExtractor for ZipExtractor {
    type Entries = ZipEntries;

    fn list_entries(&self, archive: &Path) -> ManagerResult<ZipEntries> {
        Ok(ZipEntries {
            archive: Self::open(archive)?,
            path: archive.to_path_buf(),
            next: 0,
        })
    }

    fn extract_all(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: ProgressCallback<'_>,
    ) -> ManagerResult<usize> {
        let mut zip = Self::open(archive)?;
        let total = zip.len();
        let failed = |reason: String| ManagerError::ExtractionFailed {
            path: archive.to_path_buf(),
            reason,
        };

        fs::create_dir_all(dest_dir)
            .map_err(|e| failed(format!("cannot create {}: {}", dest_dir.display(), e)))?;

        for index in 0..total {
            progress(index as u64, total as u64);

            let mut entry = zip
                .by_index(index)
                .map_err(|e| failed(format!("entry {}: {}", index, e)))?;
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| failed(format!("unsafe entry path {}", entry.name())))?;
            let out_path = dest_dir.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)
                    .map_err(|e| failed(format!("cannot create {}: {}", out_path.display(), e)))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| failed(format!("cannot create {}: {}", parent.display(), e)))?;
            }
            let mut out_file = File::create(&out_path)
                .map_err(|e| failed(format!("cannot write {}: {}", out_path.display(), e)))?;
            io::copy(&mut entry, &mut out_file)
                .map_err(|e| failed(format!("entry {}: {}", entry.name(), e)))?;
            debug!(entry = entry.name(), "Extracted");
        }

        progress(total as u64, total as u64);
        Ok(total)
    }

    fn read_entry(&self, archive: &Path, entry: &str) -> ManagerResult<Option<Vec<u8>>> {
        let mut zip = Self::open(archive)?;
        let mut file = match zip.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(ManagerError::ExtractionFailed {
                    path: archive.to_path_buf(),
                    reason: format!("entry {}: {}", entry, e),
                })
            }
        };

        // The header's size claim is not trusted; read at most one byte past the limit.
        let mut data = Vec::new();
        file.by_ref()
            .take(MAX_ENTRY_READ as u64 + 1)
            .read_to_end(&mut data)
            .map_err(|e| ManagerError::ExtractionFailed {
                path: archive.to_path_buf(),
                reason: format!("entry {}: {}", entry, e),
            })?;
        if data.len() > MAX_ENTRY_READ {
            return Err(ManagerError::ExtractionFailed {
                path: archive.to_path_buf(),
                reason: format!("entry {} is larger than {} bytes", entry, MAX_ENTRY_READ),
            });
        }
        Ok(Some(data))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for building zip fixtures in tests.

    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// An entry to put into a fixture archive.
    pub enum Fixture<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8]),
    }

    /// Write a zip archive at `path` with the given entries, in order.
    pub fn write_zip(path: &Path, entries: &[Fixture<'_>]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for entry in entries {
            match entry {
                Fixture::Dir(name) => zip.add_directory(*name, options).unwrap(),
                Fixture::File(name, data) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(data).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }
}
