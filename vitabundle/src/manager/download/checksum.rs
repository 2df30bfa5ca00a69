//! SHA-256 checksum calculation for file verification.
//!
//! Cached artifacts and fresh downloads are both gated on their published
//! digest. Files are hashed in fixed-size chunks so multi-gigabyte packages
//! never need to fit in memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::manager::error::{ManagerError, ManagerResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the SHA-256 checksum of a file.
///
/// `progress` is called after every chunk with `(bytes_read, file_size)`.
///
/// # Returns
///
/// The lowercase hexadecimal SHA-256 hash of the file contents.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn calculate_file_checksum(path: &Path, progress: &dyn Fn(u64, u64)) -> ManagerResult<String> {
    let read_failed = |e| ManagerError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_failed)?;
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_read_total = 0u64;

    progress(0, file_size);
    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_failed)?;
        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        bytes_read_total += bytes_read as u64;
        progress(bytes_read_total, file_size);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}

/// Verify that a file matches an expected checksum.
///
/// Returns `false` both when the digest differs and when the file cannot be
/// opened or read. Callers that need to tell those apart check for the file
/// first.
pub fn verify_checksum(path: &Path, expected: &str, progress: &dyn Fn(u64, u64)) -> bool {
    debug!(path = %path.display(), "Verifying sha256sum");
    match calculate_file_checksum(path, progress) {
        Ok(actual) if digests_match(&actual, expected) => {
            debug!(path = %path.display(), "sha256sum correct");
            true
        }
        Ok(actual) => {
            warn!(path = %path.display(), expected, actual = %actual, "sha256sum mismatch");
            false
        }
        Err(e) => {
            warn!(error = %e, "Could not checksum file");
            false
        }
    }
}
