//! Title UID index (`/sys/uid.sys`).
//!
//! ## Entry (0x0C bytes)
//! ```text
//! [0x00] TitleId (u64 BE)
//! [0x08] Uid     (u32 BE)
//! ```
//!
//! UIDs start at 0x1000 and are handed out in increasing order. An empty
//! index is seeded with the system menu.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};

use tracing::{error, info};

use super::paths::NandPaths;
use crate::Result;

/// Title id of the system menu.
pub const TITLE_ID_SYSMENU: u64 = 0x0000_0001_0000_0002;
/// First UID handed out.
pub const FIRST_UID: u32 = 0x1000;

const ENTRY_SIZE: usize = 12;

#[derive(Debug)]
pub struct UidSys {
    paths: NandPaths,
    entries: BTreeMap<u32, u64>,
}

impl UidSys {
    /// Load the index, seeding the system menu if it is empty.
    pub fn load(paths: &NandPaths) -> Result<Self> {
        let mut raw = Vec::new();
        match File::open(paths.uid_sys()) {
            Ok(mut file) => {
                file.read_to_end(&mut raw)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut entries = BTreeMap::new();
        for chunk in raw.chunks_exact(ENTRY_SIZE) {
            let title_id = u64::from_be_bytes(chunk[..8].try_into().unwrap_or_default());
            let uid = u32::from_be_bytes(chunk[8..].try_into().unwrap_or_default());
            if title_id == 0 && uid == 0 {
                break;
            }
            entries.insert(uid, title_id);
        }

        let mut uid_sys = Self {
            paths: paths.clone(),
            entries,
        };
        if uid_sys.entries.is_empty() {
            uid_sys.get_or_insert(TITLE_ID_SYSMENU)?;
        }
        Ok(uid_sys)
    }

    /// UID of `title_id`, if registered.
    pub fn uid_for_title(&self, title_id: u64) -> Option<u32> {
        self.entries
            .iter()
            .find(|&(_, &tid)| tid == title_id)
            .map(|(&uid, _)| uid)
    }

    pub fn next_uid(&self) -> u32 {
        self.entries
            .keys()
            .next_back()
            .map_or(FIRST_UID, |last| last + 1)
    }

    /// Register `title_id`, returning its (possibly existing) UID.
    pub fn get_or_insert(&mut self, title_id: u64) -> Result<u32> {
        if let Some(uid) = self.uid_for_title(title_id) {
            info!("title {title_id:016x} already exists in uid.sys");
            return Ok(uid);
        }

        let uid = self.next_uid();
        let path = self.paths.uid_sys();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut raw = [0u8; ENTRY_SIZE];
        raw[..8].copy_from_slice(&title_id.to_be_bytes());
        raw[8..].copy_from_slice(&uid.to_be_bytes());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(&raw));
        if let Err(e) = written {
            error!("failed to write to {}: {e}", path.display());
            return Err(e.into());
        }

        self.entries.insert(uid, title_id);
        Ok(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_system_menu_and_allocates_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NandPaths::new(dir.path());

        let mut uid_sys = UidSys::load(&paths).unwrap();
        assert_eq!(uid_sys.uid_for_title(TITLE_ID_SYSMENU), Some(FIRST_UID));
        let uid = uid_sys.get_or_insert(0x0001_0001_4142_4344).unwrap();
        assert_eq!(uid, FIRST_UID + 1);
        assert_eq!(uid_sys.get_or_insert(0x0001_0001_4142_4344).unwrap(), uid);

        let reloaded = UidSys::load(&paths).unwrap();
        assert_eq!(reloaded.uid_for_title(0x0001_0001_4142_4344), Some(uid));
        assert_eq!(reloaded.next_uid(), FIRST_UID + 2);
    }
}
