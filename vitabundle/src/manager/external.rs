//! Adapters for the external package tools.
//!
//! Decrypting the demo package and sealing output directories are done by
//! `pkg2zip` and `psvimg-create`. Both run as child processes with an
//! explicit working directory; the process cwd is never changed.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use super::error::{ManagerError, ManagerResult};
use super::traits::{ContainerSealer, PackageDecryptor};

/// Default name of the package decrypt tool.
pub const DEFAULT_PKG2ZIP: &str = "pkg2zip";

/// Default name of the sealing tool.
pub const DEFAULT_PSVIMG_CREATE: &str = "psvimg-create";

/// Failure reason for a finished child process.
fn describe_failure(tool: &Path, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} exited with {}", tool.display(), output.status)
    } else {
        format!("{} exited with {}: {}", tool.display(), output.status, stderr)
    }
}

/// Decrypts packages with `pkg2zip -x`.
#[derive(Debug, Clone)]
pub struct CommandDecryptor {
    program: PathBuf,
}

impl CommandDecryptor {
    /// Create a decryptor that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The tool that will be run.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for CommandDecryptor {
    fn default() -> Self {
        Self::new(DEFAULT_PKG2ZIP)
    }
}

impl PackageDecryptor for CommandDecryptor {
    fn decrypt(&self, package: &Path, dest_dir: &Path) -> ManagerResult<()> {
        let failed = |reason: String| ManagerError::DecryptFailed {
            path: package.to_path_buf(),
            reason,
        };

        debug!(tool = %self.program.display(), package = %package.display(), "Running decryptor");
        let output = Command::new(&self.program)
            .arg("-x")
            .arg(package)
            .current_dir(dest_dir)
            .output()
            .map_err(|e| failed(format!("cannot run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(failed(describe_failure(&self.program, &output)));
        }
        Ok(())
    }
}

/// Seals directories with `psvimg-create`.
#[derive(Debug, Clone)]
pub struct CommandSealer {
    program: PathBuf,
}

impl CommandSealer {
    /// Create a sealer that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The tool that will be run.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for CommandSealer {
    fn default() -> Self {
        Self::new(DEFAULT_PSVIMG_CREATE)
    }
}

impl ContainerSealer for CommandSealer {
    fn seal(
        &self,
        work_dir: &Path,
        plaintext_dir: &str,
        output_path: &str,
        key: &str,
        label: &str,
    ) -> ManagerResult<()> {
        let failed = |reason: String| ManagerError::SealFailed {
            bundle_id: output_path
                .split('/')
                .next()
                .unwrap_or(output_path)
                .to_string(),
            dir: plaintext_dir.to_string(),
            reason,
        };

        debug!(
            tool = %self.program.display(),
            work_dir = %work_dir.display(),
            plaintext_dir,
            output_path,
            "Running sealer"
        );
        let output = Command::new(&self.program)
            .args(["-n", label, "-K", key, plaintext_dir, output_path])
            .current_dir(work_dir)
            .output()
            .map_err(|e| failed(format!("cannot run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(failed(describe_failure(&self.program, &output)));
        }
        Ok(())
    }
}
