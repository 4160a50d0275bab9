//! ioctlv command layer.
//!
//! A request carries input vectors (read by ES) and I/O vectors (written by
//! ES). Vector counts and sizes are checked before any operation runs, so a
//! malformed request never has side effects. Scalars are big-endian.
//!
//! | Cmd  | Command                | In                      | I/O              | Reply      |
//! |------|------------------------|-------------------------|------------------|------------|
//! | 0x01 | AddTicket              | ticket, 2 x unused      |                  | 0          |
//! | 0x02 | AddTitleStart          | TMD, 3 x unused         |                  | 0          |
//! | 0x03 | AddContentStart        | title id, content id    |                  | content fd |
//! | 0x04 | AddContentData         | content fd, data        |                  | 0          |
//! | 0x05 | AddContentFinish       | content fd              |                  | 0          |
//! | 0x06 | AddTitleFinish         |                         |                  | 0          |
//! | 0x07 | GetDeviceId            |                         | u32              | 0          |
//! | 0x0E | GetTitleCount          |                         | u32              | 0          |
//! | 0x0F | GetTitles              | u32 count               | count x u64      | 0          |
//! | 0x17 | DeleteTitle            | title id                |                  | 0          |
//! | 0x18 | DeleteTicket           | title id                |                  | 0          |
//! | 0x1D | GetTitleContentCount   | title id                | u32              | 0          |
//! | 0x1E | GetTitleContents       | title id, u32 count     | count x u32      | 0          |
//! | 0x22 | DeleteTitleContent     | title id                |                  | 0          |
//! | 0x26 | ExportTitleInit        | title id                | raw TMD          | 0          |
//! | 0x27 | ExportContentBegin     | title id, content id    |                  | handle     |
//! | 0x28 | ExportContentData      | handle                  | ciphertext       | 0          |
//! | 0x29 | ExportContentEnd       | handle                  |                  | 0          |
//! | 0x2A | ExportTitleDone        |                         |                  | 0          |
//! | 0x2B | AddTmd                 | TMD                     |                  | 0          |
//! | 0x2F | AddTitleCancel         |                         |                  | 0          |
//! | 0x32 | GetStoredContentCount  | TMD                     | u32              | 0          |
//! | 0x33 | GetStoredContents      | TMD, u32 count          | count x u32      | 0          |
//! | 0x36 | GetSharedContentCount  |                         | u32              | 0          |
//! | 0x37 | GetSharedContents      | u32 count               | count x SHA-1    | 0          |

use tracing::{debug, warn};

use crate::error::{IPC_SUCCESS, reply_code};
use crate::es::Es;
use crate::formats::tmd::{Content, Tmd};
use crate::{Error, Result};

/// Buffers of one ioctlv request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ioctlv {
    pub in_vectors: Vec<Vec<u8>>,
    pub io_vectors: Vec<Vec<u8>>,
}

impl Ioctlv {
    pub fn new(in_vectors: Vec<Vec<u8>>, io_vectors: Vec<Vec<u8>>) -> Self {
        Self {
            in_vectors,
            io_vectors,
        }
    }

    fn expect_vectors(&self, in_count: usize, io_count: usize) -> Result<()> {
        if self.in_vectors.len() != in_count || self.io_vectors.len() != io_count {
            return Err(Error::Parameter("wrong number of vectors"));
        }
        Ok(())
    }

    fn input(&self, index: usize) -> Result<&[u8]> {
        self.in_vectors
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::Parameter("missing input vector"))
    }

    fn in_u32(&self, index: usize) -> Result<u32> {
        let bytes = self
            .input(index)?
            .try_into()
            .map_err(|_| Error::Parameter("expected a 4-byte input vector"))?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn in_u64(&self, index: usize) -> Result<u64> {
        let bytes = self
            .input(index)?
            .try_into()
            .map_err(|_| Error::Parameter("expected an 8-byte input vector"))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn output(&mut self, index: usize) -> Result<&mut [u8]> {
        self.io_vectors
            .get_mut(index)
            .map(Vec::as_mut_slice)
            .ok_or(Error::Parameter("missing I/O vector"))
    }

    fn expect_output_len(&self, index: usize, len: usize) -> Result<()> {
        match self.io_vectors.get(index) {
            Some(v) if v.len() == len => Ok(()),
            _ => Err(Error::Parameter("I/O vector size mismatch")),
        }
    }

    fn write_u32(&mut self, index: usize, value: u32) -> Result<()> {
        self.expect_output_len(index, 4)?;
        self.output(index)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Write `items` of `width` bytes each, as many as fit.
    fn write_list<T>(
        &mut self,
        index: usize,
        width: usize,
        items: &[T],
        encode: impl Fn(&T, &mut [u8]),
    ) -> Result<()> {
        let out = self.output(index)?;
        for (item, slot) in items.iter().zip(out.chunks_exact_mut(width)) {
            encode(item, slot);
        }
        Ok(())
    }
}

/// ES ioctlv command numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EsCommand {
    AddTicket = 0x01,
    AddTitleStart = 0x02,
    AddContentStart = 0x03,
    AddContentData = 0x04,
    AddContentFinish = 0x05,
    AddTitleFinish = 0x06,
    GetDeviceId = 0x07,
    GetTitleCount = 0x0E,
    GetTitles = 0x0F,
    DeleteTitle = 0x17,
    DeleteTicket = 0x18,
    GetTitleContentCount = 0x1D,
    GetTitleContents = 0x1E,
    DeleteTitleContent = 0x22,
    ExportTitleInit = 0x26,
    ExportContentBegin = 0x27,
    ExportContentData = 0x28,
    ExportContentEnd = 0x29,
    ExportTitleDone = 0x2A,
    AddTmd = 0x2B,
    AddTitleCancel = 0x2F,
    GetStoredContentCount = 0x32,
    GetStoredContents = 0x33,
    GetSharedContentCount = 0x36,
    GetSharedContents = 0x37,
}

impl TryFrom<u32> for EsCommand {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        use EsCommand::*;
        Ok(match value {
            0x01 => AddTicket,
            0x02 => AddTitleStart,
            0x03 => AddContentStart,
            0x04 => AddContentData,
            0x05 => AddContentFinish,
            0x06 => AddTitleFinish,
            0x07 => GetDeviceId,
            0x0E => GetTitleCount,
            0x0F => GetTitles,
            0x17 => DeleteTitle,
            0x18 => DeleteTicket,
            0x1D => GetTitleContentCount,
            0x1E => GetTitleContents,
            0x22 => DeleteTitleContent,
            0x26 => ExportTitleInit,
            0x27 => ExportContentBegin,
            0x28 => ExportContentData,
            0x29 => ExportContentEnd,
            0x2A => ExportTitleDone,
            0x2B => AddTmd,
            0x2F => AddTitleCancel,
            0x32 => GetStoredContentCount,
            0x33 => GetStoredContents,
            0x36 => GetSharedContentCount,
            0x37 => GetSharedContents,
            _ => return Err(Error::Parameter("unknown ES command")),
        })
    }
}

fn reply(result: Result<()>) -> Result<i32> {
    result.map(|()| IPC_SUCCESS)
}

fn handle_reply(handle: u32) -> Result<i32> {
    i32::try_from(handle).map_err(|_| Error::State("handle out of range"))
}

impl Es {
    /// Run one ioctlv request and return the reply code.
    ///
    /// I/O vectors are zeroed before the command runs.
    pub fn ioctlv(&mut self, command: u32, request: &mut Ioctlv) -> i32 {
        let Ok(command) = EsCommand::try_from(command) else {
            warn!("unimplemented ES ioctlv {command:#x}");
            return Error::Parameter("unknown ES command").code();
        };
        debug!(?command, "ioctlv");
        for io in &mut request.io_vectors {
            io.fill(0);
        }
        let code = reply_code(self.dispatch(command, request));
        if code < 0 {
            debug!(?command, code, "ioctlv failed");
        }
        code
    }

    fn dispatch(&mut self, command: EsCommand, req: &mut Ioctlv) -> Result<i32> {
        match command {
            EsCommand::AddTicket => {
                req.expect_vectors(3, 0)?;
                reply(self.add_ticket(req.input(0)?.to_vec()))
            }
            EsCommand::AddTitleStart => {
                req.expect_vectors(4, 0)?;
                reply(self.add_title_start(req.input(0)?.to_vec()))
            }
            EsCommand::AddTmd => {
                req.expect_vectors(1, 0)?;
                reply(self.add_tmd(req.input(0)?.to_vec()))
            }
            EsCommand::AddContentStart => {
                req.expect_vectors(2, 0)?;
                let title_id = req.in_u64(0)?;
                let content_id = req.in_u32(1)?;
                handle_reply(self.add_content_start(title_id, content_id)?)
            }
            EsCommand::AddContentData => {
                req.expect_vectors(2, 0)?;
                let content_fd = req.in_u32(0)?;
                reply(self.add_content_data(content_fd, req.input(1)?))
            }
            EsCommand::AddContentFinish => {
                req.expect_vectors(1, 0)?;
                let content_fd = req.in_u32(0)?;
                reply(self.add_content_finish(content_fd))
            }
            EsCommand::AddTitleFinish => {
                req.expect_vectors(0, 0)?;
                reply(self.add_title_finish())
            }
            EsCommand::AddTitleCancel => {
                req.expect_vectors(0, 0)?;
                reply(self.add_title_cancel())
            }
            EsCommand::DeleteTitle => {
                req.expect_vectors(1, 0)?;
                let title_id = req.in_u64(0)?;
                reply(self.delete_title(title_id))
            }
            EsCommand::DeleteTicket => {
                req.expect_vectors(1, 0)?;
                let title_id = req.in_u64(0)?;
                reply(self.delete_ticket(title_id))
            }
            EsCommand::DeleteTitleContent => {
                req.expect_vectors(1, 0)?;
                let title_id = req.in_u64(0)?;
                reply(self.delete_title_content(title_id))
            }
            EsCommand::ExportTitleInit => {
                req.expect_vectors(1, 1)?;
                let title_id = req.in_u64(0)?;
                reply(self.export_title_init(title_id, req.output(0)?))
            }
            EsCommand::ExportContentBegin => {
                req.expect_vectors(2, 0)?;
                let title_id = req.in_u64(0)?;
                let content_id = req.in_u32(1)?;
                handle_reply(self.export_content_begin(title_id, content_id)?)
            }
            EsCommand::ExportContentData => {
                req.expect_vectors(1, 1)?;
                let handle = req.in_u32(0)?;
                let out = req.output(0)?;
                if out.is_empty() {
                    return Err(Error::Parameter("empty output buffer"));
                }
                self.export_content_data(handle, out).map(|_| IPC_SUCCESS)
            }
            EsCommand::ExportContentEnd => {
                req.expect_vectors(1, 0)?;
                let handle = req.in_u32(0)?;
                reply(self.export_content_end(handle))
            }
            EsCommand::ExportTitleDone => {
                req.expect_vectors(0, 0)?;
                reply(self.export_title_done())
            }
            EsCommand::GetDeviceId => {
                req.expect_vectors(0, 1)?;
                req.write_u32(0, self.device_id())?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetTitleCount => {
                req.expect_vectors(0, 1)?;
                req.expect_output_len(0, 4)?;
                let count = self.installed_titles()?.len() as u32;
                req.write_u32(0, count)?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetTitles => {
                req.expect_vectors(1, 1)?;
                let max_count = req.in_u32(0)? as usize;
                req.expect_output_len(0, max_count * 8)?;
                let titles = self.installed_titles()?;
                req.write_list(0, 8, &titles, |tid, slot| {
                    slot.copy_from_slice(&tid.to_be_bytes())
                })?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetTitleContentCount => {
                req.expect_vectors(1, 1)?;
                let title_id = req.in_u64(0)?;
                req.expect_output_len(0, 4)?;
                let count = self.stored_contents(title_id)?.len() as u32;
                req.write_u32(0, count)?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetTitleContents => {
                req.expect_vectors(2, 1)?;
                let title_id = req.in_u64(0)?;
                let max_count = req.in_u32(1)? as usize;
                req.expect_output_len(0, max_count * 4)?;
                let ids = self.stored_contents(title_id)?;
                req.write_list(0, 4, &ids, |id, slot| {
                    slot.copy_from_slice(&id.to_be_bytes())
                })?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetStoredContentCount => {
                req.expect_vectors(1, 1)?;
                req.expect_output_len(0, 4)?;
                let tmd = Tmd::parse(req.input(0)?.to_vec())?;
                let count = self.store().stored_contents(&tmd)?.len() as u32;
                req.write_u32(0, count)?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetStoredContents => {
                req.expect_vectors(2, 1)?;
                let max_count = req.in_u32(1)? as usize;
                req.expect_output_len(0, max_count * 4)?;
                let tmd = Tmd::parse(req.input(0)?.to_vec())?;
                let contents = self.store().stored_contents(&tmd)?;
                req.write_list(0, 4, &contents, |c: &Content, slot| {
                    slot.copy_from_slice(&c.id.to_be_bytes())
                })?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetSharedContentCount => {
                req.expect_vectors(0, 1)?;
                req.expect_output_len(0, 4)?;
                let count = self.shared_contents()?.len() as u32;
                req.write_u32(0, count)?;
                Ok(IPC_SUCCESS)
            }
            EsCommand::GetSharedContents => {
                req.expect_vectors(1, 1)?;
                let max_count = req.in_u32(0)? as usize;
                req.expect_output_len(0, max_count * 20)?;
                let hashes = self.shared_contents()?;
                req.write_list(0, 20, &hashes, |sha1, slot| slot.copy_from_slice(sha1))?;
                Ok(IPC_SUCCESS)
            }
        }
    }
}
