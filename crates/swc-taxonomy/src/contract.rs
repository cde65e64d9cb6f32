//! Contract identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Opaque identifier for one contract: the filename stem of its `.sol`
/// source (`C1` for `C1.sol`). Borrowed everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractRef(String);

impl ContractRef {
    pub fn new(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    /// Derive the identifier from a source path, if it names a `.sol` file.
    pub fn from_source_path(path: &Path) -> Option<Self> {
        if path.extension()? != "sol" {
            return None;
        }
        Some(Self(path.file_stem()?.to_string_lossy().into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
