//! Backup key lookup and persistence.
//!
//! Sealing needs the per-account backup key. Keys are cached in
//! `credentials.ini` under `[BackupKeys]` and otherwise fetched from
//! `cma.henkaku.xyz`, whose response page carries the key right after a
//! `</b>: ` marker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::debug;

use crate::config::config_directory;
use crate::manager::{ManagerError, ManagerResult};

/// Length of a backup key in characters.
pub const BACKUP_KEY_LEN: usize = 64;

/// File name of the credential store.
pub const CREDENTIALS_FILE: &str = "credentials.ini";

const SECTION: &str = "BackupKeys";
const KEY_MARKER: &str = "</b>: ";

/// URL of the backup key lookup for `account_id`.
pub fn backup_key_url(account_id: &str) -> String {
    format!("http://cma.henkaku.xyz/?aid={}", account_id)
}

/// Extract the backup key from a lookup response.
///
/// # Errors
///
/// Returns `ManagerError::CredentialFetchFailed` when the marker is missing
/// or fewer than 64 characters follow it.
pub fn parse_backup_key(account_id: &str, body: &str) -> ManagerResult<String> {
    let failed = |reason: &str| ManagerError::CredentialFetchFailed {
        account_id: account_id.to_string(),
        reason: reason.to_string(),
    };

    let start = body
        .find(KEY_MARKER)
        .ok_or_else(|| failed("no key in lookup response"))?
        + KEY_MARKER.len();

    let key: String = body[start..].chars().take(BACKUP_KEY_LEN).collect();
    if key.chars().count() < BACKUP_KEY_LEN {
        return Err(failed("key in lookup response is truncated"));
    }
    Ok(key)
}

/// Default location of the credential store.
pub fn credentials_file_path() -> PathBuf {
    config_directory().join(CREDENTIALS_FILE)
}

/// Persistent account id to backup key mapping.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    ini: Ini,
}

impl CredentialStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            ini: Ini::new(),
        }
    }

    /// Load the store at `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::ReadFailed` or `ManagerError::InvalidConfig`
    /// when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> ManagerResult<Self> {
        let ini = match Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(ini::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ini::new(),
            Err(ini::Error::Io(e)) => {
                return Err(ManagerError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            Err(ini::Error::Parse(e)) => {
                return Err(ManagerError::InvalidConfig(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            ini,
        })
    }

    /// Load the store from its default location.
    pub fn load_default() -> ManagerResult<Self> {
        Self::load(&credentials_file_path())
    }

    /// Where the store is saved, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached key for `account_id`.
    pub fn get(&self, account_id: &str) -> Option<String> {
        self.ini
            .section(Some(SECTION))
            .and_then(|section| section.get(account_id))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Cache a key for `account_id`.
    pub fn set(&mut self, account_id: &str, key: &str) {
        self.ini.with_section(Some(SECTION)).set(account_id, key);
    }

    /// Write the store back to disk.
    pub fn save(&self) -> ManagerResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.ini
            .write_to_file(path)
            .map_err(|e| ManagerError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!(path = %path.display(), "Saved credentials");
        Ok(())
    }
}
