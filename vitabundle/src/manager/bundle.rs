//! Bundle identity types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Length of a bundle (title) identifier such as `PCSG90096`.
pub const BUNDLE_ID_LEN: usize = 9;

/// Fixed-length bundle identifier.
///
/// Nine characters, none of them a path separator. Identifiers order
/// lexically, which is also the order catalog listings use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleId(pub(super) String);

impl BundleId {
    /// Parse an identifier, returning `None` for anything that is not a
    /// nine-character token.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.chars().count() == BUNDLE_ID_LEN
            && !s.contains(|c: char| c == '/' || c == '\\')
            && !s.chars().any(char::is_whitespace);
        valid.then(|| Self(s.to_string()))
    }

    /// Identifier from a top-level archive directory entry (`"PCSE00001/"`).
    pub fn from_dir_entry(name: &str) -> Option<Self> {
        let stem = name.strip_suffix('/')?;
        Self::parse(stem)
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BundleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("'{}' is not a {}-character bundle id", s, BUNDLE_ID_LEN))
    }
}

/// A validated bundle archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    /// Location of the zip archive.
    pub archive_path: PathBuf,
    /// Identifier of the application inside.
    pub bundle_id: BundleId,
    /// Human-readable title from the descriptor.
    pub display_name: String,
}
