//! Console key material.
//!
//! The ES module needs three secrets to process titles:
//!
//! * **Common key** - shared by every retail console. It wraps the title key
//!   stored in each ticket (IV = title id).
//! * **Device id** - the console's NG id. Tickets carrying a non-zero device
//!   id may only be installed on that console.
//! * **Ticket secret** - the ECDH shared secret between the console's
//!   private key and the ticket server key. It unwraps the personalised
//!   title key of a device-bound ticket (IV = ticket id).
//!
//! This module is a plain data container; the AES work lives in
//! [`crate::crypto`].
//!
//! ## Key file format
//! `name = hex_value`, one entry per line, comments prefixed with `;`.
//!
//! ```text
//! ; console keys
//! device_id     = 0403ac68
//! common_key    = ebe42a225e8593e448d9c5457381aaf7
//! ticket_secret = 00112233445566778899aabbccddeeff
//! ```

use std::io::{BufRead, BufReader, Read};

use tracing::debug;

use crate::error::IOSC_ENOENT;
use crate::{Error, Result};

/// Retail common key.
pub const COMMON_KEY: [u8; 16] = [
    0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7,
];

/// NG id of the default emulated console.
pub const DEFAULT_DEVICE_ID: u32 = 0x0403_AC68;

/// All keys needed to install and export titles.
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Local console id that device-bound tickets are checked against.
    pub device_id: u32,
    /// Key wrapping title keys inside tickets.
    pub common_key: [u8; 16],
    /// Shared secret used to unpersonalise device-bound tickets.
    pub ticket_secret: Option<[u8; 16]>,
}

impl Default for KeySet {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            common_key: COMMON_KEY,
            ticket_secret: None,
        }
    }
}

impl KeySet {
    /// Create a key set with the default console identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load keys from a key-file reader.
    ///
    /// Lines beginning with `;` and blank lines are ignored. Unknown names
    /// and values of the wrong length are skipped so that one file can be
    /// shared with other tools.
    pub fn load_keys<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            match name {
                "device_id" => {
                    if let Some(bytes) = decode_hex_n::<4>(value) {
                        self.device_id = u32::from_be_bytes(bytes);
                    }
                }
                "common_key" => {
                    if let Some(key) = decode_hex_n::<16>(value) {
                        self.common_key = key;
                    }
                }
                "ticket_secret" => {
                    if let Some(key) = decode_hex_n::<16>(value) {
                        self.ticket_secret = Some(key);
                    }
                }
                _ => debug!(name, "skipping unknown key"),
            }
        }
        Ok(())
    }

    /// Shared secret for unwrapping a personalised title key.
    ///
    /// Fails with the crypto engine's "no such key" code when the console has
    /// no ticket secret configured.
    pub fn ticket_secret(&self) -> Result<[u8; 16]> {
        self.ticket_secret.ok_or(Error::Unpersonalise(IOSC_ENOENT))
    }
}

fn decode_hex_n<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s.trim(), &mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_known_names_and_skips_the_rest() {
        let text = "; comment\n\
                    device_id = 0000beef\n\
                    sd_key = ab01b9d8e1622b08afbad84dbfc2a55d\n\
                    ticket_secret = 00112233445566778899aabbccddeeff\n\
                    common_key = short\n";
        let mut keys = KeySet::new();
        keys.load_keys(text.as_bytes()).unwrap();
        assert_eq!(keys.device_id, 0xBEEF);
        assert_eq!(keys.common_key, COMMON_KEY);
        assert_eq!(keys.ticket_secret.unwrap()[15], 0xff);
    }

    #[test]
    fn missing_ticket_secret_is_an_iosc_error() {
        let err = KeySet::new().ticket_secret().unwrap_err();
        assert_eq!(err.code(), IOSC_ENOENT);
    }
}
