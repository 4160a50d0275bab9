//! The ES content-management service.
//!
//! [`Es`] owns the key material, the NAND store and the two transactional
//! sessions. Every operation is a plain method returning [`Result`]; the
//! command layer in [`crate::ipc`] turns those into reply codes.

use tracing::{info, warn};

use crate::config::Config;
use crate::crypto::Sha1Hash;
use crate::error::AuthError;
use crate::formats::ticket::Ticket;
use crate::formats::tmd::Tmd;
use crate::keys::KeySet;
use crate::nand::{NandPaths, NandStore};
use crate::session::{ExportSession, ImportSession};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Es {
    keys: KeySet,
    store: NandStore,
    import: ImportSession,
    export: ExportSession,
}

impl Es {
    pub fn new(keys: KeySet, store: NandStore) -> Self {
        Self {
            keys,
            store,
            import: ImportSession::new(),
            export: ExportSession::new(),
        }
    }

    /// Open the service described by `config`, loading its key file.
    pub fn open(config: &Config) -> Result<Self> {
        let keys = config.load_keys()?;
        let store = NandStore::new(NandPaths::new(config.nand_root()));
        info!("ES rooted at {}", config.nand_root().display());
        Ok(Self::new(keys, store))
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn store(&self) -> &NandStore {
        &self.store
    }

    pub fn import_session(&self) -> &ImportSession {
        &self.import
    }

    pub fn export_session(&self) -> &ExportSession {
        &self.export
    }

    // --- tickets -----------------------------------------------------------

    /// Validate, unpersonalise if needed, and persist a ticket.
    pub fn add_ticket(&mut self, bytes: Vec<u8>) -> Result<()> {
        let mut ticket = Ticket::parse(bytes)?;

        let ticket_device_id = ticket.device_id();
        let device_id = self.keys.device_id;
        if ticket_device_id != 0 {
            if ticket_device_id != device_id {
                warn!("device id mismatch: ticket {ticket_device_id:08x}, device {device_id:08x}");
                return Err(AuthError::DeviceIdMismatch {
                    ticket: ticket_device_id,
                    device: device_id,
                }
                .into());
            }
            let secret = self.keys.ticket_secret().inspect_err(|e| {
                warn!(
                    "add_ticket: failed to unpersonalise ticket for {:016x} (ret = {})",
                    ticket.title_id(),
                    e.code()
                );
            })?;
            ticket.unpersonalise(&secret)?;
        }

        self.store.write_ticket(&ticket)?;
        info!("add_ticket: imported ticket for title {:016x}", ticket.title_id());
        Ok(())
    }

    pub fn find_ticket(&self, title_id: u64) -> Result<Option<Ticket>> {
        self.store.find_ticket(title_id)
    }

    pub fn delete_ticket(&mut self, title_id: u64) -> Result<()> {
        info!("delete_ticket: {title_id:016x}");
        self.store.delete_ticket(title_id)
    }

    // --- import ------------------------------------------------------------

    pub fn add_tmd(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.import.add_tmd(&self.store, bytes)
    }

    /// Same staging as [`Es::add_tmd`]; the extra certificate vectors of the
    /// command are accepted and ignored.
    pub fn add_title_start(&mut self, bytes: Vec<u8>) -> Result<()> {
        info!("add_title_start");
        self.import.add_tmd(&self.store, bytes)
    }

    pub fn add_content_start(&mut self, title_id: u64, content_id: u32) -> Result<u32> {
        self.import.add_content_start(title_id, content_id)
    }

    pub fn add_content_data(&mut self, content_fd: u32, data: &[u8]) -> Result<()> {
        self.import.add_content_data(content_fd, data)
    }

    pub fn add_content_finish(&mut self, content_fd: u32) -> Result<()> {
        self.import
            .add_content_finish(&self.store, &self.keys, content_fd)
    }

    pub fn add_title_finish(&mut self) -> Result<()> {
        self.import.add_title_finish(&self.store)
    }

    pub fn add_title_cancel(&mut self) -> Result<()> {
        self.import.add_title_cancel(&self.store)
    }

    // --- deletion ----------------------------------------------------------

    pub fn delete_title(&mut self, title_id: u64) -> Result<()> {
        info!("delete_title: {title_id:016x}");
        self.store.delete_title(title_id)
    }

    /// Delete the private contents of an installed title, keeping its TMD.
    pub fn delete_title_content(&mut self, title_id: u64) -> Result<()> {
        info!("delete_title_content: {title_id:016x}");
        self.store
            .remove_title_contents(title_id)
            .map_err(|e| match e {
                Error::NotFound(_) => Error::Parameter("title is not installed"),
                e => e,
            })
    }

    // --- export ------------------------------------------------------------

    pub fn export_title_init(&mut self, title_id: u64, tmd_out: &mut [u8]) -> Result<()> {
        self.export
            .init(&self.store, &self.keys, title_id, tmd_out)
    }

    pub fn export_content_begin(&mut self, title_id: u64, content_id: u32) -> Result<u32> {
        self.export.content_begin(&self.store, title_id, content_id)
    }

    pub fn export_content_data(&mut self, handle: u32, out: &mut [u8]) -> Result<usize> {
        self.export.content_data(handle, out)
    }

    pub fn export_content_end(&mut self, handle: u32) -> Result<()> {
        self.export.content_end(handle)
    }

    pub fn export_title_done(&mut self) -> Result<()> {
        self.export.done()
    }

    // --- queries -----------------------------------------------------------

    pub fn device_id(&self) -> u32 {
        self.keys.device_id
    }

    pub fn installed_titles(&self) -> Result<Vec<u64>> {
        self.store.installed_titles()
    }

    pub fn title_imports(&self) -> Result<Vec<u64>> {
        self.store.title_imports()
    }

    pub fn titles_with_tickets(&self) -> Result<Vec<u64>> {
        self.store.titles_with_tickets()
    }

    pub fn installed_tmd(&self, title_id: u64) -> Result<Tmd> {
        self.store
            .find_installed_tmd(title_id)?
            .ok_or(Error::NotFound("title is not installed"))
    }

    /// Ids of the contents of `title_id` that are physically present.
    pub fn stored_contents(&self, title_id: u64) -> Result<Vec<u32>> {
        let tmd = self.installed_tmd(title_id)?;
        Ok(self
            .store
            .stored_contents(&tmd)?
            .iter()
            .map(|c| c.id)
            .collect())
    }

    pub fn shared_contents(&self) -> Result<Vec<Sha1Hash>> {
        self.store.shared_contents()
    }
}
