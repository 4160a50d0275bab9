//! Deterministic NAND path derivation.
//!
//! ```text
//! <root>/ticket/<hi>/<lo>.tik
//! <root>/title/<hi>/<lo>/content/title.tmd
//! <root>/title/<hi>/<lo>/content/<cid>.app
//! <root>/title/<hi>/<lo>/data/
//! <root>/import/<hi>/<lo>/content/<cid>.app
//! <root>/shared1/content.map
//! <root>/shared1/<n>.app
//! <root>/sys/uid.sys
//! ```
//!
//! `<hi>` / `<lo>` are the high and low 32 bits of the title id and `<cid>`
//! the content id, all as 8-digit lowercase hex.

use std::path::PathBuf;

use crate::utils::split_title_id;

/// Path builder rooted at an emulated NAND directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NandPaths {
    root: PathBuf,
}

impl NandPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn titles_dir(&self) -> PathBuf {
        self.root.join("title")
    }

    pub fn imports_dir(&self) -> PathBuf {
        self.root.join("import")
    }

    pub fn tickets_dir(&self) -> PathBuf {
        self.root.join("ticket")
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root.join("shared1")
    }

    pub fn shared_map(&self) -> PathBuf {
        self.shared_dir().join("content.map")
    }

    /// Shared content file for the map entry named `id` (8 hex chars).
    pub fn shared_content(&self, id: &str) -> PathBuf {
        self.shared_dir().join(format!("{id}.app"))
    }

    pub fn uid_sys(&self) -> PathBuf {
        self.root.join("sys").join("uid.sys")
    }

    pub fn ticket(&self, title_id: u64) -> PathBuf {
        let (hi, lo) = split_title_id(title_id);
        self.tickets_dir()
            .join(format!("{hi:08x}"))
            .join(format!("{lo:08x}.tik"))
    }

    pub fn title_dir(&self, title_id: u64) -> PathBuf {
        let (hi, lo) = split_title_id(title_id);
        self.titles_dir()
            .join(format!("{hi:08x}"))
            .join(format!("{lo:08x}"))
    }

    pub fn title_content_dir(&self, title_id: u64) -> PathBuf {
        self.title_dir(title_id).join("content")
    }

    pub fn title_data_dir(&self, title_id: u64) -> PathBuf {
        self.title_dir(title_id).join("data")
    }

    pub fn tmd(&self, title_id: u64) -> PathBuf {
        self.title_content_dir(title_id).join("title.tmd")
    }

    /// Final location of a private content.
    pub fn title_content(&self, title_id: u64, content_id: u32) -> PathBuf {
        self.title_content_dir(title_id)
            .join(format!("{content_id:08x}.app"))
    }

    /// Staging area for one title import.
    pub fn import_dir(&self, title_id: u64) -> PathBuf {
        let (hi, lo) = split_title_id(title_id);
        self.imports_dir()
            .join(format!("{hi:08x}"))
            .join(format!("{lo:08x}"))
    }

    pub fn import_tmd(&self, title_id: u64) -> PathBuf {
        self.import_dir(title_id).join("content").join("title.tmd")
    }

    /// Staged plaintext for one content.
    pub fn import_content(&self, title_id: u64, content_id: u32) -> PathBuf {
        self.import_dir(title_id)
            .join("content")
            .join(format!("{content_id:08x}.app"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn title_paths_split_the_id() {
        let paths = NandPaths::new("/nand");
        let tid = 0x0001_0001_5241_4141;
        assert_eq!(
            paths.title_content(tid, 0x2a),
            Path::new("/nand/title/00010001/52414141/content/0000002a.app")
        );
        assert_eq!(
            paths.ticket(tid),
            Path::new("/nand/ticket/00010001/52414141.tik")
        );
        assert_eq!(
            paths.import_content(tid, 1),
            Path::new("/nand/import/00010001/52414141/content/00000001.app")
        );
        assert_eq!(
            paths.tmd(tid),
            Path::new("/nand/title/00010001/52414141/content/title.tmd")
        );
    }
}
