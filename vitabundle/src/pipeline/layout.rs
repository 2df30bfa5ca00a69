//! On-disk layout of the build.
//!
//! ```text
//! <base>/h-encore-full.zip               prebuilt primary archive (cache)
//! <base>/BitterSmile.pkg                 demo package (cache)
//! <base>/h-encore/{app,appmeta,license,savedata}
//! <base>/h-encore/PCSG90096/<subdir>     sealed primary output
//! <base>/../extra/{app,appmeta,…}        queued bundles, one at a time
//! <base>/../extra/<id>/<subdir>          sealed queued output
//! ```

use std::path::{Path, PathBuf};

use crate::manager::{BundleId, PipelineConfig};

/// Name of the primary content tree below the base directory.
pub const PRIMARY_TREE: &str = "h-encore";

/// Subdirectories sealed for every bundle, in order.
pub const SEAL_DIRS: [&str; 4] = ["app", "appmeta", "license", "savedata"];

/// Percent reported before sealing each of [`SEAL_DIRS`], then after the last.
pub const SEAL_PERCENTS: [u8; 5] = [0, 90, 93, 96, 99];

/// Resource directories removed from the primary app when trimming.
pub const PRUNE_DIRS: [&str; 8] = [
    "resource/movie",
    "resource/sound",
    "resource/text/01",
    "resource/image/bg",
    "resource/image/ev",
    "resource/image/icon",
    "resource/image/stitle",
    "resource/image/tachie",
];

/// License file name the primary bundle expects.
const LICENSE_FILE: &str = "6488b73b912a753a492e2714e9b38bc7.rif";

/// Resolved paths for one build.
#[derive(Debug, Clone)]
pub struct Layout {
    base_dir: PathBuf,
    extra_dir: PathBuf,
    primary_id: BundleId,
}

impl Layout {
    /// Resolve the layout for `config`.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            extra_dir: config.extra_dir(),
            primary_id: config.primary_id.clone(),
        }
    }

    /// Base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Shared tree for queued bundles.
    pub fn extra_dir(&self) -> &Path {
        &self.extra_dir
    }

    /// A cached artifact below the base directory.
    pub fn cached(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// The primary content tree.
    pub fn primary_root(&self) -> PathBuf {
        self.base_dir.join(PRIMARY_TREE)
    }

    /// Whether `id` is the primary bundle.
    pub fn is_primary(&self, id: &BundleId) -> bool {
        *id == self.primary_id
    }

    /// Where an archive for `id` is extracted.
    ///
    /// The primary archive carries its own `h-encore/` prefix.
    pub fn extract_dir(&self, id: &BundleId) -> &Path {
        if self.is_primary(id) {
            &self.base_dir
        } else {
            &self.extra_dir
        }
    }

    /// Working directory the sealer runs in for `id`.
    pub fn seal_dir(&self, id: &BundleId) -> PathBuf {
        if self.is_primary(id) {
            self.primary_root()
        } else {
            self.extra_dir.clone()
        }
    }

    /// Directory name the decrypted app is renamed to.
    pub fn renamed_app_name(&self) -> String {
        format!("ux0_temp_game_{0}_app_{0}", self.primary_id)
    }

    /// Decrypted app directory as the decryptor leaves it.
    pub fn decrypted_app_dir(&self) -> PathBuf {
        self.primary_root()
            .join("app")
            .join(self.primary_id.as_str())
    }

    /// Decrypted app directory after renaming.
    pub fn renamed_app_dir(&self) -> PathBuf {
        self.primary_root()
            .join("app")
            .join(self.renamed_app_name())
    }

    /// Source of the license copy.
    pub fn license_source(&self) -> PathBuf {
        self.renamed_app_dir()
            .join("sce_sys")
            .join("package")
            .join("temp.bin")
    }

    /// Destination of the license copy.
    pub fn license_dest(&self) -> PathBuf {
        self.primary_root()
            .join("license")
            .join(format!("ux0_temp_game_{0}_license_app_{0}", self.primary_id))
            .join(LICENSE_FILE)
    }
}

/// Sealed output path for `subdir` of `id`, relative to the seal directory.
pub fn sealed_output(id: &BundleId, subdir: &str) -> String {
    format!("{}/{}", id, subdir)
}
