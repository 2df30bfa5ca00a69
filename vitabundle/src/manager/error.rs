//! Error types for bundle acquisition and the build pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur while acquiring, unpacking and sealing bundles.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Content digest of a file does not match the published one.
    #[error("sha256 mismatch for {filename}: expected {expected}")]
    DigestMismatch { filename: String, expected: String },

    /// Download of a remote resource failed.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A stale file could not be removed within the retry budget.
    #[error("failed to remove {} after {attempts} attempts", path.display())]
    FileRemovalFailed { path: PathBuf, attempts: u32 },

    /// Archive extraction failed.
    #[error("failed to extract {}: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    /// The external decrypt-and-unpack routine failed.
    #[error("failed to unpack {}: {reason}", path.display())]
    DecryptFailed { path: PathBuf, reason: String },

    /// The external sealing routine failed.
    #[error("failed to seal {dir} for {bundle_id}: {reason}")]
    SealFailed {
        bundle_id: String,
        dir: String,
        reason: String,
    },

    /// A candidate archive is not a well-formed bundle.
    ///
    /// Never escalated: the catalog drops the candidate and carries on.
    #[error("{} is not a valid bundle: {reason}", path.display())]
    InvalidBundle { path: PathBuf, reason: String },

    /// The backup key for an account could not be obtained.
    #[error("cannot get backup key for account {account_id}: {reason}")]
    CredentialFetchFailed { account_id: String, reason: String },

    /// The pipeline was started before a backup key was resolved.
    #[error("no backup key available, resolve one for the account first")]
    MissingBackupKey,

    /// A completion event arrived in a state that does not expect it.
    #[error("unexpected {event} while {state}")]
    IllegalTransition {
        state: PipelineState,
        event: &'static str,
    },

    /// A unit of work was submitted while another one is still running.
    #[error("a pipeline stage is already running")]
    WorkerBusy,

    /// The worker dropped its completion event.
    #[error("pipeline worker stopped without reporting: {0}")]
    WorkerLost(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
