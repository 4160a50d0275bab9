//! Shared content map (`/shared1/content.map`).
//!
//! ## Entry (0x1C bytes)
//! ```text
//! [0x00] Id    (8 ASCII hex chars, names /shared1/<id>.app)
//! [0x08] SHA-1 (0x14)
//! ```
//!
//! The map is append-only: entries are never removed, because any number of
//! installed titles may reference the same shared content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;

use tracing::debug;

use super::paths::NandPaths;
use crate::Result;
use crate::crypto::Sha1Hash;

const ENTRY_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: [u8; 8],
    sha1: Sha1Hash,
}

/// In-memory view of the shared content map.
#[derive(Debug)]
pub struct SharedContentMap {
    paths: NandPaths,
    entries: Vec<Entry>,
}

impl SharedContentMap {
    /// Load the map from the NAND. A missing map file is an empty map.
    pub fn load(paths: &NandPaths) -> Result<Self> {
        let mut raw = Vec::new();
        match File::open(paths.shared_map()) {
            Ok(mut file) => {
                file.read_to_end(&mut raw)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // A trailing partial entry is ignored.
        let entries = raw
            .chunks_exact(ENTRY_SIZE)
            .map(|chunk| {
                let mut entry = Entry {
                    id: [0; 8],
                    sha1: [0; 20],
                };
                entry.id.copy_from_slice(&chunk[..8]);
                entry.sha1.copy_from_slice(&chunk[8..]);
                entry
            })
            .collect();

        Ok(Self {
            paths: paths.clone(),
            entries,
        })
    }

    /// Path of the shared content with the given digest, if it is mapped.
    pub fn path_for(&self, sha1: &Sha1Hash) -> Option<PathBuf> {
        self.entries
            .iter()
            .find(|e| &e.sha1 == sha1)
            .map(|e| self.paths.shared_content(&String::from_utf8_lossy(&e.id)))
    }

    /// Map `sha1` to a shared content path, appending a new entry if needed.
    ///
    /// Idempotent: an already-mapped digest returns its existing path and the
    /// map file is left untouched.
    pub fn add(&mut self, sha1: &Sha1Hash) -> Result<PathBuf> {
        if let Some(path) = self.path_for(sha1) {
            return Ok(path);
        }

        let id = format!("{:08x}", self.entries.len());
        let mut entry = Entry {
            id: [0; 8],
            sha1: *sha1,
        };
        entry.id.copy_from_slice(id.as_bytes());

        let map_path = self.paths.shared_map();
        if let Some(parent) = map_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&map_path)?;
        let mut raw = [0u8; ENTRY_SIZE];
        raw[..8].copy_from_slice(&entry.id);
        raw[8..].copy_from_slice(&entry.sha1);
        file.write_all(&raw)?;

        self.entries.push(entry);
        debug!(id = %id, "added shared content map entry");
        Ok(self.paths.shared_content(&id))
    }

    /// All mapped digests, in insertion order.
    pub fn hashes(&self) -> Vec<Sha1Hash> {
        self.entries.iter().map(|e| e.sha1).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Count of `/shared1/<8 hex>.app` files actually present.
pub(crate) fn count_shared_files(paths: &NandPaths) -> io::Result<usize> {
    let dir = match fs::read_dir(paths.shared_dir()) {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut count = 0;
    for entry in dir {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_file() && name.len() == 12 && name.ends_with(".app") {
            count += 1;
        }
    }
    Ok(count)
}
