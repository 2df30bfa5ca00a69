//! HTTP-based file downloader.
//!
//! This module provides the core HTTP download functionality:
//! - Streaming downloads to a truncated destination file
//! - Progress callbacks for UI updates
//! - Small text GETs (backup key lookup)

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::traits::{Fetcher, ProgressCallback};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// HTTP-based fetcher.
///
/// Implements the `Fetcher` trait with a blocking client; callers run it on
/// a worker thread.
#[derive(Debug)]
pub struct HttpDownloader {
    client: Client,
    pub(crate) timeout: Duration,
}

impl HttpDownloader {
    /// Create a new HTTP downloader with default settings.
    pub fn new() -> ManagerResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new HTTP downloader with custom timeout.
    pub fn with_timeout(timeout: Duration) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ManagerError::InvalidConfig(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Map a request error to a manager error for `url`.
    fn request_error(&self, url: &str, e: reqwest::Error) -> ManagerError {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", self.timeout.as_secs())
        } else {
            e.to_string()
        };
        ManagerError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
    }

    /// Stream the response body of `url` into `dest`.
    fn stream_download(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressCallback<'_>,
    ) -> ManagerResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = File::create(dest).map_err(|e| ManagerError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        progress(0, total_size);
        loop {
            let bytes_read =
                response
                    .read(&mut buffer)
                    .map_err(|e| ManagerError::DownloadFailed {
                        url: url.to_string(),
                        reason: format!("Read error: {}", e),
                    })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| ManagerError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            downloaded += bytes_read as u64;
            progress(downloaded, total_size);
        }

        writer.flush().map_err(|e| ManagerError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(downloaded)
    }
}

impl Fetcher for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path, progress: ProgressCallback<'_>) -> ManagerResult<u64> {
        info!(url, dest = %dest.display(), "Start downloading");
        let bytes = self.stream_download(url, dest, progress)?;
        debug!(bytes, "Download finished");
        Ok(bytes)
    }

    fn fetch_text(&self, url: &str) -> ManagerResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        response.text().map_err(|e| self.request_error(url, e))
    }
}
