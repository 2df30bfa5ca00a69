//! HTTP download and digest verification.
//!
//! - Single file downloads and text GETs (`http`)
//! - SHA-256 checksum verification (`checksum`)
//!
//! Retrying is the controller's business; nothing here retries on its own.

mod checksum;
mod http;

pub use checksum::{calculate_file_checksum, digests_match, verify_checksum};
pub use http::{HttpDownloader, DEFAULT_TIMEOUT_SECS};

/// A remote artifact together with where it lands and what it must hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Source URL.
    pub url: String,
    /// File name below the base directory.
    pub local_filename: String,
    /// Published SHA-256 digest, hex encoded.
    pub expected_digest_hex: String,
}

impl DownloadTarget {
    /// Create a new download target.
    pub fn new(
        url: impl Into<String>,
        local_filename: impl Into<String>,
        expected_digest_hex: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            local_filename: local_filename.into(),
            expected_digest_hex: expected_digest_hex.into(),
        }
    }
}
