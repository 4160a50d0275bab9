//! TMD (Title Metadata) - manifest of a title's contents.
//!
//! ## Header Layout
//! ```text
//! [0x000] SignatureType    (u32 BE)
//! [0x004] RSA-2048 sig     (0x100)
//! [0x104] Fill             (0x3C)
//! [0x140] Issuer           (0x40)
//! [0x180] TmdVersion / CA CRL / signer CRL (3 x u8, 1 pad)
//! [0x184] IosId            (u64)
//! [0x18C] TitleId          (u64)
//! [0x194] TitleType        (u32)
//! [0x198] GroupId          (u16)
//! [0x19A] Zero             (u16)
//! [0x19C] Region           (u16)
//! [0x19E] Ratings / reserved / IPC mask (0x3A)
//! [0x1D8] AccessRights     (u32)
//! [0x1DC] TitleVersion     (u16)
//! [0x1DE] NumContents      (u16)
//! [0x1E0] BootIndex        (u16)
//! [0x1E2] Fill             (u16)
//! [0x1E4] ContentRecords   (NumContents x 0x24)
//! ```
//!
//! ## Content Record (0x24 bytes)
//! ```text
//! [0x00] ContentId  (u32)
//! [0x04] Index      (u16)  only source of the content IV
//! [0x06] Type       (u16)  bit 0x8000 = shared content
//! [0x08] Size       (u64)
//! [0x10] SHA-1      (0x14) over the decrypted content
//! ```

use std::io::{Cursor, Seek, SeekFrom};

use crate::crypto::Sha1Hash;
use crate::utils::{be_u16, be_u32, be_u64, bytesa};
use crate::{Error, Result};

/// Size of the fixed TMD header.
pub const TMD_HEADER_SIZE: usize = 0x1E4;
/// Size of one content record.
pub const CONTENT_RECORD_SIZE: usize = 0x24;

const IOS_ID: u64 = 0x184;
const NUM_CONTENTS: usize = 0x1DE;

/// Content type bit marking a content as shared between titles.
pub const CONTENT_TYPE_SHARED: u16 = 0x8000;

/// One content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Content {
    pub id: u32,
    /// Position in the title; only this value feeds the content IV.
    pub index: u16,
    pub content_type: u16,
    /// Decrypted size in bytes.
    pub size: u64,
    /// SHA-1 of the decrypted content.
    pub sha1: Sha1Hash,
}

impl Content {
    /// Whether the content lives in the shared pool instead of the title.
    pub fn is_shared(&self) -> bool {
        self.content_type & CONTENT_TYPE_SHARED != 0
    }
}

/// Parsed TMD.
///
/// The raw bytes are retained verbatim; they are what gets written to the
/// NAND and handed back to export callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tmd {
    bytes: Vec<u8>,
    pub ios_id: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    pub title_version: u16,
    pub boot_index: u16,
    /// Content records in declaration order.
    pub contents: Vec<Content>,
}

impl Tmd {
    /// Parse a TMD from its raw bytes.
    ///
    /// Fails with [`Error::InvalidTmd`] if the buffer cannot hold the header
    /// and every declared content record.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < TMD_HEADER_SIZE {
            return Err(Error::InvalidTmd("too small for header"));
        }
        let num_contents = u16::from_be_bytes([bytes[NUM_CONTENTS], bytes[NUM_CONTENTS + 1]]);
        if bytes.len() < TMD_HEADER_SIZE + num_contents as usize * CONTENT_RECORD_SIZE {
            return Err(Error::InvalidTmd("too small for content records"));
        }

        let mut r = Cursor::new(&bytes);
        r.seek(SeekFrom::Start(IOS_ID))?;
        let ios_id = be_u64(&mut r)?;
        let title_id = be_u64(&mut r)?;
        let title_type = be_u32(&mut r)?;
        let group_id = be_u16(&mut r)?;

        r.seek(SeekFrom::Start(0x1DC))?;
        let title_version = be_u16(&mut r)?;
        let _num_contents = be_u16(&mut r)?;
        let boot_index = be_u16(&mut r)?;
        let _fill = be_u16(&mut r)?;

        let mut contents = Vec::with_capacity(num_contents as usize);
        for _ in 0..num_contents {
            let id = be_u32(&mut r)?;
            let index = be_u16(&mut r)?;
            let content_type = be_u16(&mut r)?;
            let size = be_u64(&mut r)?;
            let sha1 = bytesa::<20>(&mut r)?;
            contents.push(Content {
                id,
                index,
                content_type,
                size,
                sha1,
            });
        }

        Ok(Self {
            bytes,
            ios_id,
            title_id,
            title_type,
            group_id,
            title_version,
            boot_index,
            contents,
        })
    }

    /// The TMD exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Look up a content record by content id.
    pub fn find_content_by_id(&self, id: u32) -> Option<&Content> {
        self.contents.iter().find(|c| c.id == id)
    }

    /// Six-character game id (low title id bytes + group id), or the title id
    /// in hex if any of those bytes is unprintable.
    pub fn game_id(&self) -> String {
        let mut id = [0u8; 6];
        id[..4].copy_from_slice(&(self.title_id as u32).to_be_bytes());
        id[4..].copy_from_slice(&self.group_id.to_be_bytes());
        if id.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            String::from_utf8_lossy(&id).into_owned()
        } else {
            format!("{:016x}", self.title_id)
        }
    }
}
