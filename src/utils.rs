//! Low-level byte primitives shared by the parsers and the command layer.
//!
//! Every multi-byte field on the target is big-endian. Each reader consumes
//! exactly the bytes it promises or returns an error.

use std::io::Read;

use crate::Result;

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read a big-endian `u64`.
#[inline]
pub(crate) fn be_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Big-endian `u32` at `offset`, if the slice is long enough.
#[inline]
pub(crate) fn be_u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(b.try_into().ok()?))
}

/// Big-endian `u64` at `offset`, if the slice is long enough.
#[inline]
pub(crate) fn be_u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let b = buf.get(offset..offset + 8)?;
    Some(u64::from_be_bytes(b.try_into().ok()?))
}

/// Round `n` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// High and low halves of a title id, as used in every NAND path.
#[inline]
pub fn split_title_id(title_id: u64) -> (u32, u32) {
    ((title_id >> 32) as u32, title_id as u32)
}

/// Parse an 8-character hexadecimal path component.
pub(crate) fn parse_id_component(name: &str) -> Option<u32> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(name, 16).ok()
}
