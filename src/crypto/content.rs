//! AES-128-CBC and SHA-1 helpers for title content.
//!
//! ## Content IV
//! Every content blob is encrypted with the title key under AES-128-CBC.
//! The IV is **not** random and not derived from the content id: it is the
//! content *index* from the TMD record, big-endian, in the first two bytes
//! of an otherwise zero block.
//!
//! ```text
//! index 0x0102 -> IV 01 02 00 00 00 00 00 00 00 00 00 00 00 00 00 00
//! ```
//!
//! ## Padding
//! No padding is applied. Callers hand in whole 16-byte blocks; exports pad
//! to 32 bytes (the IPC alignment) before calling in.
//!
//! ## Chaining
//! [`encrypt_cbc_in_place`] and [`decrypt_cbc_in_place`] advance the IV to
//! the last ciphertext block, so a stream may be processed in several calls
//! and still produce one continuous CBC chain.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};

use crate::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// SHA-1 digest as stored in content records.
pub type Sha1Hash = [u8; 20];

/// IV for the content at `index`.
#[inline]
pub fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0] = (index >> 8) as u8;
    iv[1] = index as u8;
    iv
}

/// Encrypt `buf` in place, advancing `iv` to the last ciphertext block.
pub fn encrypt_cbc_in_place(key: &[u8; 16], iv: &mut [u8; 16], buf: &mut [u8]) -> Result<()> {
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("plaintext is not block aligned"));
    }
    if buf.is_empty() {
        return Ok(());
    }
    let len = buf.len();
    Aes128CbcEnc::new(key.into(), (&*iv).into())
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::Crypto("plaintext is not block aligned"))?;
    iv.copy_from_slice(&buf[len - BLOCK_SIZE..]);
    Ok(())
}

/// Decrypt `buf` in place, advancing `iv` to the last ciphertext block.
pub fn decrypt_cbc_in_place(key: &[u8; 16], iv: &mut [u8; 16], buf: &mut [u8]) -> Result<()> {
    if buf.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("ciphertext is not block aligned"));
    }
    if buf.is_empty() {
        return Ok(());
    }
    let mut next_iv = [0u8; 16];
    next_iv.copy_from_slice(&buf[buf.len() - BLOCK_SIZE..]);
    Aes128CbcDec::new(key.into(), (&*iv).into())
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::Crypto("ciphertext is not block aligned"))?;
    *iv = next_iv;
    Ok(())
}

/// Decrypt `ciphertext` into a new buffer.
pub fn decrypt_cbc(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = *iv;
    let mut out = ciphertext.to_vec();
    decrypt_cbc_in_place(key, &mut iv, &mut out)?;
    Ok(out)
}

/// Encrypt `plaintext` into a new buffer.
pub fn encrypt_cbc(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = *iv;
    let mut out = plaintext.to_vec();
    encrypt_cbc_in_place(key, &mut iv, &mut out)?;
    Ok(out)
}

/// SHA-1 of `data`.
#[inline]
pub fn sha1(data: &[u8]) -> Sha1Hash {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x42; 16];

    #[test]
    fn iv_uses_only_the_index_bytes() {
        let iv = content_iv(0x0102);
        assert_eq!(&iv[..2], &[0x01, 0x02]);
        assert!(iv[2..].iter().all(|&b| b == 0));
        assert_eq!(content_iv(0), [0u8; 16]);
    }

    #[test]
    fn chunked_encryption_matches_one_shot() {
        let plain: Vec<u8> = (0..96u8).collect();
        let whole = encrypt_cbc(&KEY, &content_iv(7), &plain).unwrap();

        let mut iv = content_iv(7);
        let mut first = plain[..32].to_vec();
        let mut second = plain[32..].to_vec();
        encrypt_cbc_in_place(&KEY, &mut iv, &mut first).unwrap();
        encrypt_cbc_in_place(&KEY, &mut iv, &mut second).unwrap();
        first.extend_from_slice(&second);
        assert_eq!(first, whole);

        assert_eq!(decrypt_cbc(&KEY, &content_iv(7), &whole).unwrap(), plain);
    }

    #[test]
    fn rejects_unaligned_input() {
        let mut iv = [0u8; 16];
        let mut buf = [0u8; 17];
        assert!(encrypt_cbc_in_place(&KEY, &mut iv, &mut buf).is_err());
        assert_eq!(iv, [0u8; 16]);
        assert!(decrypt_cbc(&KEY, &iv, &buf[..15]).is_err());
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(
            hex::encode(sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
