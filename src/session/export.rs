//! Title export transaction.
//!
//! An export binds to one title at [`ExportSession::init`]. Any number of
//! content streams may then be open at once, each addressed by the smallest
//! free integer handle and each carrying its own running CBC IV.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, error, info, warn};

use crate::crypto::{content_iv, encrypt_cbc_in_place};
use crate::error::AuthError;
use crate::formats::tmd::{Content, Tmd};
use crate::keys::KeySet;
use crate::nand::NandStore;
use crate::utils::align_up;
use crate::{Error, Result};

/// Export transfers are padded to this alignment before encryption.
pub const EXPORT_ALIGNMENT: usize = 32;

#[derive(Debug)]
struct ExportContent {
    content: Content,
    position: u64,
    iv: [u8; 16],
    file: File,
}

impl ExportContent {
    fn remaining(&self) -> u64 {
        self.content.size.saturating_sub(self.position)
    }
}

#[derive(Debug)]
struct Bound {
    tmd: Tmd,
    title_key: [u8; 16],
}

/// The single in-flight export.
#[derive(Debug, Default)]
pub struct ExportSession {
    bound: Option<Bound>,
    contents: BTreeMap<u32, ExportContent>,
}

impl ExportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.bound.is_some()
    }

    /// Title the session is bound to.
    pub fn title_id(&self) -> Option<u64> {
        self.bound.as_ref().map(|b| b.tmd.title_id)
    }

    /// Handles currently open, ascending.
    pub fn open_handles(&self) -> Vec<u32> {
        self.contents.keys().copied().collect()
    }

    /// Bind the session to `title_id` and copy its raw TMD into `tmd_out`.
    ///
    /// `tmd_out` must be exactly as long as the installed TMD.
    pub fn init(
        &mut self,
        store: &NandStore,
        keys: &KeySet,
        title_id: u64,
        tmd_out: &mut [u8],
    ) -> Result<()> {
        if self.bound.is_some() {
            return Err(Error::State("an export is already in progress"));
        }

        let tmd = store
            .find_installed_tmd(title_id)?
            .ok_or(Error::NotFound("title is not installed"))?;
        let ticket = match store.find_ticket(title_id)? {
            Some(ticket) if ticket.title_id() == title_id => ticket,
            _ => return Err(AuthError::NoTicketInstalled.into()),
        };
        let title_key = ticket.title_key(keys)?;

        let raw = tmd.as_bytes();
        if tmd_out.len() != raw.len() {
            return Err(Error::Parameter("TMD output buffer size mismatch"));
        }
        tmd_out.copy_from_slice(raw);

        if !self.contents.is_empty() {
            warn!(
                "dropping {} content handles left over from a previous export",
                self.contents.len()
            );
            self.contents.clear();
        }

        info!("export_title_init: {title_id:016x}");
        self.bound = Some(Bound { tmd, title_key });
        Ok(())
    }

    /// Open `content_id` for reading and return its handle.
    pub fn content_begin(
        &mut self,
        store: &NandStore,
        title_id: u64,
        content_id: u32,
    ) -> Result<u32> {
        let bound = match &self.bound {
            Some(bound) if bound.tmd.title_id == title_id => bound,
            _ => {
                error!("export_content_begin: export not in progress for {title_id:016x}");
                return Err(Error::State("export not in progress for title"));
            }
        };

        let content = *bound
            .tmd
            .find_content_by_id(content_id)
            .ok_or(Error::NotFound("content is not listed in the TMD"))?;
        let file = store.open_content(title_id, &content)?;

        let handle = (0..)
            .find(|h| !self.contents.contains_key(h))
            .ok_or(Error::State("no free export handle"))?;
        self.contents.insert(
            handle,
            ExportContent {
                content,
                position: 0,
                iv: content_iv(content.index),
                file,
            },
        );
        info!("export_content_begin: content {content_id:08x} -> handle {handle}");
        Ok(handle)
    }

    /// Read, pad and encrypt the next chunk of `handle` into `out`.
    ///
    /// Returns the number of ciphertext bytes written, which is the read
    /// length rounded up to [`EXPORT_ALIGNMENT`].
    pub fn content_data(&mut self, handle: u32, out: &mut [u8]) -> Result<usize> {
        let Some(bound) = &self.bound else {
            return Err(Error::State("export not in progress"));
        };
        if out.is_empty() {
            return Err(Error::Parameter("empty output buffer"));
        }
        let stream = self
            .contents
            .get_mut(&handle)
            .ok_or(Error::Parameter("unknown export handle"))?;
        if stream.remaining() == 0 {
            return Err(Error::Parameter("content already fully read"));
        }

        let length = stream.remaining().min(out.len() as u64) as usize;
        let padded = align_up(length, EXPORT_ALIGNMENT);
        if padded > out.len() {
            return Err(Error::Parameter("output buffer cannot hold padded chunk"));
        }

        let buffer = &mut out[..padded];
        buffer.fill(0);
        stream.file.seek(SeekFrom::Start(stream.position))?;
        stream
            .file
            .read_exact(&mut buffer[..length])
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => Error::ShortRead,
                _ => Error::Io(e),
            })?;

        let mut iv = stream.iv;
        if let Err(e) = encrypt_cbc_in_place(&bound.title_key, &mut iv, buffer) {
            error!("export_content_data: failed to encrypt handle {handle}");
            return Err(e);
        }
        stream.iv = iv;
        stream.position += length as u64;
        debug!(
            "export_content_data: handle {handle}, {length} bytes ({}/{})",
            stream.position, stream.content.size
        );
        Ok(padded)
    }

    /// Close `handle`. The whole content must have been read.
    pub fn content_end(&mut self, handle: u32) -> Result<()> {
        if self.bound.is_none() {
            return Err(Error::State("export not in progress"));
        }
        let stream = self
            .contents
            .get(&handle)
            .ok_or(Error::Parameter("unknown export handle"))?;
        if stream.position != stream.content.size {
            error!(
                "export_content_end: handle {handle} closed at {}/{}",
                stream.position, stream.content.size
            );
            return Err(Error::Parameter("content not fully exported"));
        }
        self.contents.remove(&handle);
        info!("export_content_end: handle {handle}");
        Ok(())
    }

    pub fn done(&mut self) -> Result<()> {
        let Some(bound) = self.bound.take() else {
            return Err(Error::State("export not in progress"));
        };
        if !self.contents.is_empty() {
            warn!(
                "export_title_done: {} content handles still open",
                self.contents.len()
            );
        }
        info!("export_title_done: {:016x}", bound.tmd.title_id);
        Ok(())
    }
}
