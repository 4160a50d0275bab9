//! Ticket - signed license binding a title id to its title key.
//!
//! ## Layout
//! A ticket file starts with a signature block whose length depends on the
//! signature type, followed by the 0x164-byte ticket body.
//!
//! ```text
//! [0x00] SignatureType   (u32 BE)  0x10000 RSA-4096 -> body at 0x240
//!                                  0x10001 RSA-2048 -> body at 0x140
//!                                  0x10002 ECDSA    -> body at 0x080
//! ```
//!
//! ## Body (offsets relative to the body start)
//! ```text
//! [0x000] Issuer              (0x40)
//! [0x040] ServerPublicKey     (0x3C)  ECDH peer key for personalised tickets
//! [0x07C] Version / CA CRL / signer CRL (3 x u8)
//! [0x07F] TitleKey            (0x10)  wrapped with the common key
//! [0x090] TicketId            (u64)
//! [0x098] DeviceId            (u32)   0 = not bound to a console
//! [0x09C] TitleId             (u64)
//! [0x0A4] AccessMask          (u16)
//! [0x0A6] TicketVersion       (u16)
//! [0x0A8] PermittedTitleId    (u32)
//! [0x0AC] PermittedTitleMask  (u32)
//! [0x0B0] TitleExportAllowed  (u8)
//! [0x0B1] CommonKeyIndex      (u8)
//! [0x0B2] ...                 (content access bits, time limits)
//! ```
//!
//! Signatures are not verified.

use tracing::error;

use crate::crypto::decrypt_cbc;
use crate::keys::KeySet;
use crate::utils::{be_u32_at, be_u64_at};
use crate::{Error, Result};

/// Size of the ticket body that follows the signature block.
pub const TICKET_BODY_SIZE: usize = 0x164;

const TITLE_KEY: usize = 0x7F;
const TICKET_ID: usize = 0x90;
const DEVICE_ID: usize = 0x98;
const TITLE_ID: usize = 0x9C;
const COMMON_KEY_INDEX: usize = 0xB1;

/// Body offset for a signature type, or `None` if the type is unknown.
pub fn signature_block_size(signature_type: u32) -> Option<usize> {
    match signature_type {
        0x10000 => Some(0x240),
        0x10001 => Some(0x140),
        0x10002 => Some(0x80),
        _ => None,
    }
}

/// A structurally valid ticket.
///
/// The raw bytes are kept verbatim so the ticket can be persisted exactly as
/// received (after any unpersonalisation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    bytes: Vec<u8>,
    offset: usize,
}

impl Ticket {
    /// Validate and wrap raw ticket bytes.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        let signature_type =
            be_u32_at(&bytes, 0).ok_or(Error::InvalidTicket("too small for signature type"))?;
        let Some(offset) = signature_block_size(signature_type) else {
            error!("invalid ticket signature type: {signature_type:08x}");
            return Err(Error::InvalidTicket("unknown signature type"));
        };
        if bytes.len() < offset + TICKET_BODY_SIZE {
            return Err(Error::InvalidTicket("too small for ticket body"));
        }
        Ok(Self { bytes, offset })
    }

    /// The ticket exactly as it will be written to the NAND.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn body(&self) -> &[u8] {
        &self.bytes[self.offset..self.offset + TICKET_BODY_SIZE]
    }

    pub fn title_id(&self) -> u64 {
        be_u64_at(self.body(), TITLE_ID).unwrap_or_default()
    }

    pub fn ticket_id(&self) -> u64 {
        be_u64_at(self.body(), TICKET_ID).unwrap_or_default()
    }

    /// Console this ticket is bound to, or 0 if it is not personalised.
    pub fn device_id(&self) -> u32 {
        be_u32_at(self.body(), DEVICE_ID).unwrap_or_default()
    }

    pub fn common_key_index(&self) -> u8 {
        self.body()[COMMON_KEY_INDEX]
    }

    /// The title key field as stored (still wrapped with the common key).
    pub fn encrypted_title_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.body()[TITLE_KEY..TITLE_KEY + 16]);
        key
    }

    /// Unwrap the title key with the common key (IV = title id).
    pub fn title_key(&self, keys: &KeySet) -> Result<[u8; 16]> {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&self.title_id().to_be_bytes());
        let plain = decrypt_cbc(&keys.common_key, &iv, &self.encrypted_title_key())?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&plain);
        Ok(key)
    }

    /// Remove the device-specific layer from the title key.
    ///
    /// The personalised title key is decrypted with the ECDH shared secret
    /// (IV = ticket id) and written back into the raw ticket, leaving a key
    /// that is wrapped only with the common key.
    pub fn unpersonalise(&mut self, shared_secret: &[u8; 16]) -> Result<()> {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&self.ticket_id().to_be_bytes());
        let key = decrypt_cbc(shared_secret, &iv, &self.encrypted_title_key())?;
        let start = self.offset + TITLE_KEY;
        self.bytes[start..start + 16].copy_from_slice(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_cbc;

    fn raw_ticket(title_id: u64, device_id: u32, title_key: [u8; 16]) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x140 + TICKET_BODY_SIZE];
        bytes[..4].copy_from_slice(&0x10001u32.to_be_bytes());
        let body = &mut bytes[0x140..];
        body[TITLE_KEY..TITLE_KEY + 16].copy_from_slice(&title_key);
        body[TICKET_ID..TICKET_ID + 8].copy_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
        body[DEVICE_ID..DEVICE_ID + 4].copy_from_slice(&device_id.to_be_bytes());
        body[TITLE_ID..TITLE_ID + 8].copy_from_slice(&title_id.to_be_bytes());
        bytes
    }

    #[test]
    fn rejects_unknown_signature_and_short_bodies() {
        assert!(Ticket::parse(vec![0, 1]).is_err());
        let mut bytes = raw_ticket(1, 0, [0; 16]);
        bytes[3] = 0x07;
        assert!(matches!(Ticket::parse(bytes), Err(Error::InvalidTicket(_))));
        let mut bytes = raw_ticket(1, 0, [0; 16]);
        bytes.truncate(0x140 + TICKET_BODY_SIZE - 1);
        assert!(Ticket::parse(bytes).is_err());
    }

    #[test]
    fn reads_fields_from_body() {
        let ticket = Ticket::parse(raw_ticket(0x0001_0001_5241_4141, 0x1234, [0; 16])).unwrap();
        assert_eq!(ticket.title_id(), 0x0001_0001_5241_4141);
        assert_eq!(ticket.device_id(), 0x1234);
        assert_eq!(ticket.ticket_id(), 0x1122_3344_5566_7788);
        assert_eq!(ticket.common_key_index(), 0);
    }

    #[test]
    fn title_key_unwraps_with_common_key() {
        let keys = KeySet::new();
        let title_id = 0x0001_0001_5241_4141u64;
        let plain_key = [0x5a; 16];
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&title_id.to_be_bytes());
        let wrapped = encrypt_cbc(&keys.common_key, &iv, &plain_key).unwrap();

        let ticket = Ticket::parse(raw_ticket(title_id, 0, wrapped.try_into().unwrap())).unwrap();
        assert_eq!(ticket.title_key(&keys).unwrap(), plain_key);
    }

    #[test]
    fn unpersonalise_rewrites_the_key_field() {
        let secret = [0x33; 16];
        let inner = [0x77; 16];
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
        let personalised = encrypt_cbc(&secret, &iv, &inner).unwrap();

        let mut ticket = Ticket::parse(raw_ticket(1, 9, personalised.try_into().unwrap())).unwrap();
        ticket.unpersonalise(&secret).unwrap();
        assert_eq!(ticket.encrypted_title_key(), inner);
        assert_eq!(&ticket.as_bytes()[0x140 + TITLE_KEY..0x140 + TITLE_KEY + 16], &inner);
    }
}
