//! Service configuration.

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;
use crate::keys::KeySet;

/// Environment variable naming the NAND root directory.
pub const NAND_ROOT_VAR: &str = "ESKIT_NAND_ROOT";
/// Environment variable naming the key file.
pub const KEYS_FILE_VAR: &str = "ESKIT_KEYS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory the emulated NAND is rooted at.
    pub nand_root: PathBuf,
    /// Optional key file, see [`KeySet::load_keys`].
    pub keys_file: Option<PathBuf>,
}

impl Config {
    pub fn new(nand_root: impl Into<PathBuf>) -> Self {
        Self {
            nand_root: nand_root.into(),
            keys_file: None,
        }
    }

    pub fn with_keys_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.keys_file = Some(path.into());
        self
    }

    /// Build a configuration from `ESKIT_NAND_ROOT` and `ESKIT_KEYS`.
    ///
    /// The NAND root defaults to `./nand` when unset.
    pub fn from_env() -> Self {
        let nand_root = env::var_os(NAND_ROOT_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("nand"));
        let keys_file = env::var_os(KEYS_FILE_VAR).map(PathBuf::from);
        Self {
            nand_root,
            keys_file,
        }
    }

    pub fn nand_root(&self) -> &Path {
        &self.nand_root
    }

    /// Default keys, overridden by the key file if one is configured.
    pub fn load_keys(&self) -> Result<KeySet> {
        let mut keys = KeySet::new();
        if let Some(path) = &self.keys_file {
            debug!("loading keys from {}", path.display());
            keys.load_keys(File::open(path)?)?;
        }
        Ok(keys)
    }
}
