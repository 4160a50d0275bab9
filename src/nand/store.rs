//! Physical placement of tickets, TMDs and content on the emulated NAND.
//!
//! Nothing here keeps transactional state; the import and export sessions
//! drive the store one step at a time.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::content_map::{SharedContentMap, count_shared_files};
use super::paths::NandPaths;
use super::uid_sys::UidSys;
use crate::crypto::Sha1Hash;
use crate::formats::ticket::Ticket;
use crate::formats::tmd::{Content, Tmd};
use crate::utils::{parse_id_component, split_title_id};
use crate::{Error, Result};

/// High half shared by all system titles.
pub const SYSTEM_TITLE_TYPE: u32 = 0x0000_0001;
/// System titles at or below this low half (boot2, system menu, BC, MIOS...)
/// can never be deleted.
pub const LAST_PROTECTED_SYSTEM_TITLE: u32 = 0x101;

/// Whether `title_id` may be deleted.
pub fn can_delete_title(title_id: u64) -> bool {
    let (hi, lo) = split_title_id(title_id);
    hi != SYSTEM_TITLE_TYPE || lo > LAST_PROTECTED_SYSTEM_TITLE
}

/// Content store rooted at one NAND directory.
#[derive(Debug, Clone)]
pub struct NandStore {
    paths: NandPaths,
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Write `data` to `path`, creating parent directories.
fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    create_parent(path)?;
    fs::write(path, data)
}

impl NandStore {
    pub fn new(paths: NandPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &NandPaths {
        &self.paths
    }

    // --- tickets -----------------------------------------------------------

    /// Persist a ticket, replacing any earlier ticket for the same title.
    pub fn write_ticket(&self, ticket: &Ticket) -> Result<()> {
        let path = self.paths.ticket(ticket.title_id());
        write_file(&path, ticket.as_bytes()).inspect_err(|e| {
            error!("failed to write ticket {}: {e}", path.display());
        })?;
        Ok(())
    }

    /// Installed ticket for `title_id`. Unreadable or malformed tickets count
    /// as absent.
    pub fn find_ticket(&self, title_id: u64) -> Result<Option<Ticket>> {
        let Some(bytes) = read_optional(&self.paths.ticket(title_id))? else {
            return Ok(None);
        };
        match Ticket::parse(bytes) {
            Ok(ticket) => Ok(Some(ticket)),
            Err(e) => {
                warn!("ignoring installed ticket for {title_id:016x}: {e}");
                Ok(None)
            }
        }
    }

    pub fn delete_ticket(&self, title_id: u64) -> Result<()> {
        match fs::remove_file(self.paths.ticket(title_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::Parameter("no ticket installed for title"))
            }
            Err(e) => Err(e.into()),
        }
    }

    // --- TMDs --------------------------------------------------------------

    fn load_tmd(path: &Path) -> Result<Option<Tmd>> {
        let Some(bytes) = read_optional(path)? else {
            return Ok(None);
        };
        match Tmd::parse(bytes) {
            Ok(tmd) => Ok(Some(tmd)),
            Err(e) => {
                warn!("ignoring invalid TMD {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    pub fn find_installed_tmd(&self, title_id: u64) -> Result<Option<Tmd>> {
        Self::load_tmd(&self.paths.tmd(title_id))
    }

    /// Write the TMD into the import area, then move it into the title
    /// directory.
    pub fn write_title_tmd(&self, tmd: &Tmd) -> Result<()> {
        let staged = self.paths.import_tmd(tmd.title_id);
        let dest = self.paths.tmd(tmd.title_id);
        write_file(&staged, tmd.as_bytes())?;
        create_parent(&dest)?;
        fs::rename(&staged, &dest).inspect_err(|e| {
            error!("failed to move {} to {}: {e}", staged.display(), dest.display());
        })?;
        fs::create_dir_all(self.paths.title_data_dir(tmd.title_id))?;
        Ok(())
    }

    // --- title index -------------------------------------------------------

    pub fn register_title(&self, title_id: u64) -> Result<u32> {
        UidSys::load(&self.paths)?.get_or_insert(title_id)
    }

    // --- import staging ----------------------------------------------------

    /// Stage decrypted content for `content_id` in the import area.
    pub fn write_import_content(&self, title_id: u64, content_id: u32, data: &[u8]) -> Result<()> {
        let path = self.paths.import_content(title_id, content_id);
        write_file(&path, data).inspect_err(|e| {
            error!("failed to write to {}: {e}", path.display());
        })?;
        Ok(())
    }

    pub fn import_content_exists(&self, title_id: u64, content_id: u32) -> bool {
        self.paths.import_content(title_id, content_id).is_file()
    }

    /// Final destination for a content record. Shared content is mapped into
    /// the shared pool (first writer wins).
    pub fn placement_path(&self, title_id: u64, content: &Content) -> Result<PathBuf> {
        if content.is_shared() {
            SharedContentMap::load(&self.paths)?.add(&content.sha1)
        } else {
            Ok(self.paths.title_content(title_id, content.id))
        }
    }

    /// Move staged content to `dest`.
    pub fn move_import_content(&self, title_id: u64, content_id: u32, dest: &Path) -> Result<()> {
        let source = self.paths.import_content(title_id, content_id);
        create_parent(dest)?;
        fs::rename(&source, dest).inspect_err(|e| {
            error!("failed to rename {} to {}: {e}", source.display(), dest.display());
        })?;
        Ok(())
    }

    /// Best-effort cleanup after a failed or cancelled import.
    ///
    /// Deletes `placed` (private content already moved into the title) in
    /// reverse order, then the whole import directory.
    pub fn abort_import(&self, title_id: u64, placed: &[PathBuf]) {
        for path in placed.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                warn!("failed to roll back {}: {e}", path.display());
            }
        }
        let import_dir = self.paths.import_dir(title_id);
        match fs::remove_dir_all(&import_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", import_dir.display()),
        }
    }

    // --- installed content -------------------------------------------------

    /// Where an installed content lives, if it is present.
    pub fn content_path(&self, title_id: u64, content: &Content) -> Result<Option<PathBuf>> {
        let path = if content.is_shared() {
            match SharedContentMap::load(&self.paths)?.path_for(&content.sha1) {
                Some(path) => path,
                None => return Ok(None),
            }
        } else {
            self.paths.title_content(title_id, content.id)
        };
        Ok(path.is_file().then_some(path))
    }

    /// Open an installed content for reading.
    pub fn open_content(&self, title_id: u64, content: &Content) -> Result<File> {
        let path = self
            .content_path(title_id, content)?
            .ok_or(Error::NotFound("content is not installed"))?;
        Ok(File::open(path)?)
    }

    /// Contents of `tmd` that are physically present.
    pub fn stored_contents(&self, tmd: &Tmd) -> Result<Vec<Content>> {
        let shared = SharedContentMap::load(&self.paths)?;
        Ok(tmd
            .contents
            .iter()
            .filter(|content| {
                if content.is_shared() {
                    shared.path_for(&content.sha1).is_some_and(|p| p.is_file())
                } else {
                    self.paths.title_content(tmd.title_id, content.id).is_file()
                }
            })
            .copied()
            .collect())
    }

    pub fn shared_contents(&self) -> Result<Vec<Sha1Hash>> {
        Ok(SharedContentMap::load(&self.paths)?.hashes())
    }

    pub fn shared_content_file_count(&self) -> Result<usize> {
        Ok(count_shared_files(&self.paths)?)
    }

    // --- deletion ----------------------------------------------------------

    /// Logically remove a title: delete its private content files.
    ///
    /// Shared content and the TMD stay in place. Fails if the title has no
    /// valid installed TMD.
    pub fn remove_title_contents(&self, title_id: u64) -> Result<()> {
        let tmd = self
            .find_installed_tmd(title_id)?
            .ok_or(Error::NotFound("title is not installed"))?;
        info!("removing contents of {title_id:016x}");
        for content in tmd.contents.iter().filter(|c| !c.is_shared()) {
            let path = self.paths.title_content(title_id, content.id);
            match fs::remove_file(&path) {
                Ok(()) => debug!("deleted {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Delete an installed title and its whole directory.
    pub fn delete_title(&self, title_id: u64) -> Result<()> {
        if !can_delete_title(title_id) {
            return Err(Error::Parameter("system title cannot be deleted"));
        }
        let title_dir = self.paths.title_dir(title_id);
        if !title_dir.is_dir() {
            return Err(Error::NotFound("title directory does not exist"));
        }
        self.remove_title_contents(title_id)?;
        fs::remove_dir_all(&title_dir).map_err(|e| {
            error!("failed to delete title directory {}: {e}", title_dir.display());
            Error::Remove(e)
        })
    }

    // --- listing -----------------------------------------------------------

    /// Titles with a directory under `/title`.
    pub fn installed_titles(&self) -> Result<Vec<u64>> {
        scan_title_tree(&self.paths.titles_dir(), false)
    }

    /// Titles with a directory under `/import`.
    pub fn title_imports(&self) -> Result<Vec<u64>> {
        scan_title_tree(&self.paths.imports_dir(), false)
    }

    /// Titles with a ticket under `/ticket`.
    pub fn titles_with_tickets(&self) -> Result<Vec<u64>> {
        scan_title_tree(&self.paths.tickets_dir(), true)
    }
}

/// Walk a `<hi>/<lo>` tree. With `tickets`, the leaves are `<lo>.tik` files
/// instead of directories.
fn scan_title_tree(root: &Path, tickets: bool) -> Result<Vec<u64>> {
    let types = match fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} is not a directory", root.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut title_ids = Vec::new();
    for title_type in types {
        let title_type = title_type?;
        if !title_type.file_type()?.is_dir() {
            continue;
        }
        let Some(hi) = parse_id_component(&title_type.file_name().to_string_lossy()) else {
            continue;
        };
        for leaf in fs::read_dir(title_type.path())? {
            let leaf = leaf?;
            let name = leaf.file_name();
            let name = name.to_string_lossy();
            let is_dir = leaf.file_type()?.is_dir();
            let lo = if tickets {
                match name.strip_suffix(".tik") {
                    Some(stem) if !is_dir => parse_id_component(stem),
                    _ => None,
                }
            } else if is_dir {
                parse_id_component(&name)
            } else {
                None
            };
            if let Some(lo) = lo {
                title_ids.push(((hi as u64) << 32) | lo as u64);
            }
        }
    }
    title_ids.sort_unstable();
    Ok(title_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_system_titles() {
        assert!(!can_delete_title(0x0000_0001_0000_0002));
        assert!(!can_delete_title(0x0000_0001_0000_0101));
        assert!(can_delete_title(0x0000_0001_0000_0102));
        assert!(can_delete_title(0x0001_0001_0000_0002));
    }

    #[test]
    fn scans_only_hex_components() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NandPaths::new(dir.path());
        fs::create_dir_all(paths.title_dir(0x0001_0001_4142_4344)).unwrap();
        fs::create_dir_all(paths.titles_dir().join("notahex!").join("00000001")).unwrap();
        write_file(&paths.ticket(0x0001_0000_0000_0007), b"x").unwrap();
        write_file(&paths.tickets_dir().join("00010000").join("junk.tik"), b"x").unwrap();

        let store = NandStore::new(paths);
        assert_eq!(store.installed_titles().unwrap(), vec![0x0001_0001_4142_4344]);
        assert_eq!(store.titles_with_tickets().unwrap(), vec![0x0001_0000_0000_0007]);
        assert!(store.title_imports().unwrap().is_empty());
    }

    #[test]
    fn missing_ticket_delete_is_a_parameter_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = NandStore::new(NandPaths::new(dir.path()));
        assert!(matches!(store.delete_ticket(1), Err(Error::Parameter(_))));
    }
}
