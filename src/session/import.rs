//! Title import transaction.
//!
//! ```text
//! Idle --add_tmd--> Staged --add_content_start--> ContentOpen
//!                     ^                               |
//!                     +------add_content_finish-------+
//! Staged --add_title_finish--> Idle
//! Staged --add_title_cancel--> Idle
//! ```
//!
//! Only one content can be open at a time; the content handle returned by
//! [`ImportSession::add_content_start`] is always [`CONTENT_FD`].

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::crypto::{content_iv, decrypt_cbc_in_place, sha1};
use crate::error::AuthError;
use crate::formats::tmd::Tmd;
use crate::keys::KeySet;
use crate::nand::NandStore;
use crate::{Error, Result};

/// Placeholder content handle.
pub const CONTENT_FD: u32 = 0;

/// Observable state of the import transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Staged,
    ContentOpen,
}

#[derive(Debug)]
struct OpenContent {
    id: u32,
    buffer: Vec<u8>,
}

/// The single in-flight import.
#[derive(Debug, Default)]
pub struct ImportSession {
    tmd: Option<Tmd>,
    content: Option<OpenContent>,
}

impl ImportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ImportState {
        match (&self.tmd, &self.content) {
            (None, _) => ImportState::Idle,
            (Some(_), None) => ImportState::Staged,
            (Some(_), Some(_)) => ImportState::ContentOpen,
        }
    }

    /// The staged TMD, if any.
    pub fn staged_tmd(&self) -> Option<&Tmd> {
        self.tmd.as_ref()
    }

    /// Id of the content currently being received.
    pub fn open_content_id(&self) -> Option<u32> {
        self.content.as_ref().map(|c| c.id)
    }

    /// Stage a TMD, replacing whatever was staged before.
    ///
    /// A malformed TMD leaves nothing staged. If the title cannot be
    /// registered in the UID index, the previous stage is kept.
    pub fn add_tmd(&mut self, store: &NandStore, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        let tmd = match Tmd::parse(bytes) {
            Ok(tmd) => tmd,
            Err(e) => {
                error!("invalid TMD while adding title (size = {size})");
                self.tmd = None;
                return Err(e);
            }
        };
        store.register_title(tmd.title_id)?;
        info!(
            "staged TMD for {:016x} ({} contents)",
            tmd.title_id,
            tmd.contents.len()
        );
        self.tmd = Some(tmd);
        Ok(())
    }

    /// Open `content_id` for writing.
    pub fn add_content_start(&mut self, title_id: u64, content_id: u32) -> Result<u32> {
        let Some(tmd) = &self.tmd else {
            return Err(Error::State("no TMD staged"));
        };
        if let Some(open) = &self.content {
            error!(
                "trying to add content {content_id:08x} while content {:08x} is still open",
                open.id
            );
            return Err(Error::State("another content is already open"));
        }
        if title_id != tmd.title_id {
            warn!(
                "add_content_start: title id {title_id:016x} != TMD title id {:016x}, ignoring",
                tmd.title_id
            );
        }

        info!("add_content_start: title id {title_id:016x}, content id {content_id:08x}");
        self.content = Some(OpenContent {
            id: content_id,
            buffer: Vec::new(),
        });
        Ok(CONTENT_FD)
    }

    /// Append encrypted bytes to the open content.
    pub fn add_content_data(&mut self, content_fd: u32, data: &[u8]) -> Result<()> {
        let open = self
            .content
            .as_mut()
            .ok_or(Error::State("no content open"))?;
        debug!("add_content_data: content fd {content_fd:08x}, size {}", data.len());
        open.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Decrypt, verify and stage the open content.
    ///
    /// On any failure the content stays open with everything received so
    /// far, so more data can be appended before finishing again.
    pub fn add_content_finish(
        &mut self,
        store: &NandStore,
        keys: &KeySet,
        content_fd: u32,
    ) -> Result<()> {
        let (Some(tmd), Some(open)) = (&self.tmd, &mut self.content) else {
            return Err(Error::State("no content open"));
        };
        info!("add_content_finish: content fd {content_fd:08x}");

        let ticket = store
            .find_ticket(tmd.title_id)?
            .ok_or(AuthError::NoTicketInstalled)?;
        let title_key = ticket.title_key(keys)?;
        let content = *tmd
            .find_content_by_id(open.id)
            .ok_or(Error::InvalidTmd("content id is not listed in the TMD"))?;

        let mut iv = content_iv(content.index);
        let mut plaintext = open.buffer.clone();
        if let Err(e) = decrypt_cbc_in_place(&title_key, &mut iv, &mut plaintext) {
            error!("add_content_finish: failed to decrypt content {:08x}", content.id);
            return Err(e);
        }

        let size = content.size as usize;
        if plaintext.len() < size || sha1(&plaintext[..size]) != content.sha1 {
            error!("add_content_finish: hash for content {:08x} doesn't match", content.id);
            return Err(AuthError::HashMismatch.into());
        }

        store.write_import_content(tmd.title_id, content.id, &plaintext[..size])?;
        self.content = None;
        Ok(())
    }

    /// Move every staged content into its final place and install the TMD.
    ///
    /// If any move fails, private content placed so far is deleted along with
    /// the import directory. Shared content is never rolled back.
    pub fn add_title_finish(&mut self, store: &NandStore) -> Result<()> {
        let Some(tmd) = &self.tmd else {
            return Err(Error::State("no TMD staged"));
        };
        if self.content.is_some() {
            return Err(Error::State("a content is still open"));
        }
        let title_id = tmd.title_id;

        let mut placed: Vec<PathBuf> = Vec::new();
        for content in &tmd.contents {
            // Not every declared content has to be transferred.
            if !store.import_content_exists(title_id, content.id) {
                continue;
            }

            let placement = store
                .placement_path(title_id, content)
                .and_then(|dest| {
                    store.move_import_content(title_id, content.id, &dest)?;
                    Ok(dest)
                });
            match placement {
                Ok(dest) if !content.is_shared() => placed.push(dest),
                Ok(_) => {}
                Err(e) => {
                    error!("add_title_finish: failed to place content {:08x}: {e}", content.id);
                    store.abort_import(title_id, &placed);
                    return Err(e);
                }
            }
        }

        if let Err(e) = store.write_title_tmd(tmd) {
            error!("add_title_finish: failed to install TMD for {title_id:016x}: {e}");
            return Err(e);
        }

        info!("add_title_finish: installed {title_id:016x}");
        self.tmd = None;
        Ok(())
    }

    /// Abandon the import and delete everything staged for it.
    pub fn add_title_cancel(&mut self, store: &NandStore) -> Result<()> {
        let Some(tmd) = self.tmd.take() else {
            return Err(Error::State("no TMD staged"));
        };
        info!("add_title_cancel: {:016x}", tmd.title_id);
        store.abort_import(tmd.title_id, &[]);
        self.content = None;
        Ok(())
    }
}
